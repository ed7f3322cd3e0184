//! Incoming HTTP request type.
//!
//! A [`Request`] is also the render context for log templates: every request
//! tag reads from here, never from anywhere else. It lives for exactly one
//! request and is never shared between requests.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use cookie::Cookie;
use http::header::{self, HeaderMap};
use http::request::Parts;
use http::{Extensions, Method, Uri, Version};

use crate::log::Logger;

/// Header carrying the request-correlation identifier.
pub const X_REQUEST_ID: &str = "x-request-id";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An incoming HTTP request with its body fully read.
pub struct Request {
    parts: Parts,
    body: Bytes,
    remote_addr: SocketAddr,
    route: Option<Arc<str>>,
    params: HashMap<String, String>,
    context: HashMap<String, String>,
    request_id: Option<String>,
    logger: Logger,
}

impl Request {
    pub(crate) fn new(parts: Parts, body: Bytes, remote_addr: SocketAddr, logger: Logger) -> Self {
        Self {
            parts,
            body,
            remote_addr,
            route: None,
            params: HashMap::new(),
            context: HashMap::new(),
            request_id: None,
            logger,
        }
    }

    pub(crate) fn set_route(&mut self, route: Arc<str>, params: HashMap<String, String>) {
        self.route = Some(route);
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.parts.extensions }

    /// Case-insensitive header lookup. Values that are not valid visible
    /// ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// The `Host` header, or the URI authority for HTTP/2 requests.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(header::REFERER.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// Protocol name and version as it appears on an HTTP/1 request line.
    pub fn protocol(&self) -> &'static str {
        match self.parts.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "",
        }
    }

    /// The client address as seen through the proxy chain.
    ///
    /// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the peer IP.
    pub fn real_ip(&self) -> Cow<'_, str> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            let first = forwarded.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return Cow::Borrowed(first);
            }
        }
        if let Some(real) = self.header("x-real-ip").map(str::trim).filter(|v| !v.is_empty()) {
            return Cow::Borrowed(real);
        }
        Cow::Owned(self.remote_addr.ip().to_string())
    }

    /// The route pattern that matched this request, e.g. `/users/{id}`.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First query-string value for `name`, percent-decoded.
    pub fn query(&self, name: &str) -> Option<Cow<'_, str>> {
        let query = self.parts.uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Form value for `name`: the urlencoded body first, then the query string.
    pub fn form(&self, name: &str) -> Option<Cow<'_, str>> {
        let is_form = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
        if is_form {
            let found = form_urlencoded::parse(&self.body)
                .find(|(k, _)| k == name)
                .map(|(_, v)| v);
            if found.is_some() {
                return found;
            }
        }
        self.query(name)
    }

    /// Value of the cookie called `name`, searched across every `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }

    /// Reads a value from the per-request context store.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Stores a value for later pipeline stages and `${context:key}` tags.
    ///
    /// Values are strings: stringify numbers and other types before storing.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    /// The correlation ID assigned by [`RequestId`](crate::middleware::RequestId),
    /// falling back to an `X-Request-ID` header sent by the client.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref().or_else(|| self.header(X_REQUEST_ID))
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = Some(id.into());
    }

    /// The application logger scoped to this request.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }
}

#[cfg(test)]
pub(crate) fn test_request(req: http::Request<Bytes>) -> Request {
    let (parts, body) = req.into_parts();
    let addr: SocketAddr = "192.0.2.7:51000".parse().unwrap();
    Request::new(parts, body, addr, Logger::new(std::io::sink()))
}
