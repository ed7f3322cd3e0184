//! Request tags and their resolution.
//!
//! A tag name is classified once per render into a [`Tag`]:
//!
//! - a **fixed** tag reads one field of the request (`method`, `uri`, …);
//! - a **lookup** tag, written `source:key`, reads `key` out of one of the
//!   request's maps (`header:X-Trace`, `query:page`, `cookie:session`, …);
//! - anything else **passes through**: it is written back as `${name}` so the
//!   request logger downstream can resolve it (`${level}`, `${line}`, …).
//!
//! Resolution never fails on missing data. An absent header, cookie, form
//! field or context value renders as nothing. The only errors are sink write
//! errors.

use std::fmt::{self, Write as _};
use std::io::{self, Write};

use chrono::Local;

use crate::request::Request;
use crate::template::{CLOSE, OPEN};

/// Tags bound to a single request or response field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Fixed {
    TimeCustom,
    Id,
    RemoteIp,
    Host,
    Uri,
    Method,
    Path,
    Route,
    Protocol,
    Referer,
    UserAgent,
}

impl Fixed {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "time_custom" => Self::TimeCustom,
            "id"          => Self::Id,
            "remote_ip"   => Self::RemoteIp,
            "host"        => Self::Host,
            "uri"         => Self::Uri,
            "method"      => Self::Method,
            "path"        => Self::Path,
            "route"       => Self::Route,
            "protocol"    => Self::Protocol,
            "referer"     => Self::Referer,
            "user_agent"  => Self::UserAgent,
            _             => return None,
        })
    }
}

/// The per-request map a lookup tag reads from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Source {
    Context,
    Header,
    Query,
    Form,
    Cookie,
}

impl Source {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "context" => Self::Context,
            "header"  => Self::Header,
            "query"   => Self::Query,
            "form"    => Self::Form,
            "cookie"  => Self::Cookie,
            _         => return None,
        })
    }
}

/// A classified tag name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tag<'a> {
    Fixed(Fixed),
    Lookup(Source, &'a str),
    Passthrough(&'a str),
}

impl<'a> Tag<'a> {
    pub fn parse(name: &'a str) -> Self {
        if let Some(fixed) = Fixed::from_name(name) {
            return Self::Fixed(fixed);
        }
        if let Some((prefix, key)) = name.split_once(':') {
            if let Some(source) = Source::from_prefix(prefix) {
                return Self::Lookup(source, key);
            }
        }
        Self::Passthrough(name)
    }
}

/// Writes `${name}` back into the output.
pub fn write_passthrough<W: Write + ?Sized>(out: &mut W, name: &str) -> io::Result<usize> {
    for part in [OPEN, name, CLOSE] {
        out.write_all(part.as_bytes())?;
    }
    Ok(OPEN.len() + name.len() + CLOSE.len())
}

/// Resolves request tags against a [`Request`].
#[derive(Clone, Debug)]
pub struct Resolver {
    time_format: String,
}

impl Resolver {
    /// `time_format` is a `chrono` strftime pattern used by `${time_custom}`.
    pub fn new(time_format: impl Into<String>) -> Self {
        Self { time_format: time_format.into() }
    }

    /// Writes the value of tag `name` for `req` into `out`.
    ///
    /// Returns the number of bytes written; zero is a valid answer.
    pub fn resolve<W: Write + ?Sized>(&self, name: &str, req: &Request, out: &mut W) -> io::Result<usize> {
        match Tag::parse(name) {
            Tag::Fixed(fixed) => self.write_fixed(fixed, req, out),
            Tag::Lookup(source, key) => write_lookup(source, key, req, out),
            Tag::Passthrough(name) => write_passthrough(out, name),
        }
    }

    fn write_fixed<W: Write + ?Sized>(&self, tag: Fixed, req: &Request, out: &mut W) -> io::Result<usize> {
        match tag {
            Fixed::TimeCustom => {
                let mut now = String::with_capacity(32);
                write!(now, "{}", Local::now().format(&self.time_format))
                    .map_err(|fmt::Error| io::Error::other("invalid custom time format"))?;
                write_str(out, &now)
            }
            Fixed::Id => write_str(out, req.request_id().unwrap_or("")),
            Fixed::RemoteIp => write_str(out, &req.real_ip()),
            Fixed::Host => write_str(out, req.host().unwrap_or("")),
            Fixed::Uri => match req.uri().path_and_query() {
                Some(target) => write_str(out, target.as_str()),
                None => write_str(out, &req.uri().to_string()),
            },
            Fixed::Method => write_str(out, req.method().as_str()),
            Fixed::Path => match req.uri().path() {
                "" => write_str(out, "/"),
                path => write_str(out, path),
            },
            Fixed::Route => write_str(out, req.route().unwrap_or("")),
            Fixed::Protocol => write_str(out, req.protocol()),
            Fixed::Referer => write_str(out, req.referer().unwrap_or("")),
            Fixed::UserAgent => write_str(out, req.user_agent().unwrap_or("")),
        }
    }
}

fn write_lookup<W: Write + ?Sized>(source: Source, key: &str, req: &Request, out: &mut W) -> io::Result<usize> {
    match source {
        Source::Context => write_str(out, req.get(key).unwrap_or("")),
        Source::Header => write_str(out, req.header(key).unwrap_or("")),
        Source::Query => write_str(out, req.query(key).as_deref().unwrap_or("")),
        Source::Form => write_str(out, req.form(key).as_deref().unwrap_or("")),
        Source::Cookie => write_str(out, req.cookie(key).as_deref().unwrap_or("")),
    }
}

fn write_str<W: Write + ?Sized>(out: &mut W, s: &str) -> io::Result<usize> {
    out.write_all(s.as_bytes())?;
    Ok(s.len())
}
