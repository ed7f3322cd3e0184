//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. The router also owns the
//! middleware stack and the application [`Logger`]: every request gets its
//! own handle of that logger before the first middleware runs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::handler::{BoxedHandler, Handler};
use crate::log::Logger;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

struct Route {
    pattern: Arc<str>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    layers: Arc<[Arc<dyn Middleware>]>,
    logger: Logger,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            layers: Arc::new([]),
            logger: Logger::default(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { pattern: path.into(), handler: handler.into_boxed_handler() };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Appends a middleware. The first layer added runs first.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(Arc::new(middleware));
        self.layers = layers.into();
        self
    }

    /// Sets the application logger handed to every request.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Runs one request through the middleware stack and its handler.
    ///
    /// Unmatched paths answer `404`, known paths under another method `405`;
    /// both still pass through middleware. A middleware error is logged and
    /// answered with `500`.
    pub async fn handle(
        &self,
        req: http::Request<Bytes>,
        remote_addr: SocketAddr,
    ) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let mut request = Request::new(parts, body, remote_addr, self.logger.clone());

        let endpoint = match self.lookup(request.method(), request.uri().path()) {
            Lookup::Found(route, params) => {
                let handler = Arc::clone(&route.handler);
                request.set_route(Arc::clone(&route.pattern), params);
                handler
            }
            Lookup::WrongMethod => status_handler(StatusCode::METHOD_NOT_ALLOWED),
            Lookup::Missing => status_handler(StatusCode::NOT_FOUND),
        };

        let method = request.method().clone();
        let uri = request.uri().clone();

        match Next::new(Arc::clone(&self.layers), endpoint).run(request).await {
            Ok(response) => response.into_inner(),
            Err(e) => {
                error!(%method, %uri, "request pipeline failed: {e}");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR).into_inner()
            }
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value, params);
        }

        let elsewhere = self.routes.iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok());
        if elsewhere { Lookup::WrongMethod } else { Lookup::Missing }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

enum Lookup<'a> {
    Found(&'a Route, HashMap<String, String>),
    WrongMethod,
    Missing,
}

fn status_handler(code: StatusCode) -> BoxedHandler {
    (move |_req: Request| async move { Response::status(code) }).into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let req = http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
        let res = router.handle(req, addr()).await;
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn describe(req: Request) -> String {
        format!("{} {}", req.route().unwrap_or("-"), req.param("id").unwrap_or("-"))
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let router = Router::new()
            .on(Method::GET, "/users/{id}", describe)
            .on(Method::POST, "/users", describe);

        assert_eq!(call(&router, Method::GET, "/users/42").await, (StatusCode::OK, "/users/{id} 42".into()));
        assert_eq!(call(&router, Method::POST, "/users").await, (StatusCode::OK, "/users -".into()));
        assert_eq!(call(&router, Method::DELETE, "/users").await.0, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(call(&router, Method::GET, "/nope").await.0, StatusCode::NOT_FOUND);
    }

    struct Mark(&'static str);

    impl Middleware for Mark {
        fn call(&self, mut req: Request, next: Next) -> crate::handler::BoxFuture<Result<Response, crate::Error>> {
            let seen = format!("{}{}", req.get("seen").unwrap_or(""), self.0);
            req.set("seen", seen);
            next.run(req)
        }
    }

    struct Fail;

    impl Middleware for Fail {
        fn call(&self, _req: Request, _next: Next) -> crate::handler::BoxFuture<Result<Response, crate::Error>> {
            Box::pin(async { Err::<Response, _>(crate::Error::Config("nope".into())) })
        }
    }

    async fn seen(req: Request) -> String {
        req.get("seen").unwrap_or("").to_owned()
    }

    #[tokio::test]
    async fn layers_run_in_registration_order() {
        let router = Router::new()
            .layer(Mark("a"))
            .layer(Mark("b"))
            .on(Method::GET, "/", seen);
        assert_eq!(call(&router, Method::GET, "/").await, (StatusCode::OK, "ab".into()));
    }

    #[tokio::test]
    async fn middleware_errors_become_500() {
        let router = Router::new().layer(Fail).on(Method::GET, "/", seen);
        assert_eq!(call(&router, Method::GET, "/").await.0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
