//! Request metadata in every application log line.
//!
//! [`AppLogger`] renders a template of request tags once per request and
//! installs the result as the header of that request's [`Logger`](crate::Logger).
//! Whatever the handler logs afterwards carries the request's method, URI,
//! correlation ID, and so on:
//!
//! ```rust,no_run
//! use tagline::middleware::{AppLogger, AppLoggerConfig, RequestId};
//! use tagline::{Method, Request, Router};
//!
//! # fn build() -> Result<Router, tagline::Error> {
//! let app = Router::new()
//!     .layer(RequestId::new())
//!     .layer(AppLogger::with_config(AppLoggerConfig {
//!         format: r#"{"id":"${id}","method":"${method}","uri":"${uri}","level":"${level}"}"#.into(),
//!         ..Default::default()
//!     })?)
//!     .on(Method::GET, "/", |req: Request| async move {
//!         req.logger().info("hello");
//!         "ok"
//!     });
//! # Ok(app)
//! # }
//! ```
//!
//! Request tags are listed in [`tag`](crate::tag). Tags it does not own,
//! `${level}` above, are left in place for the logger to fill in.

use std::io;

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use super::{Middleware, Next};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::pool::BufferPool;
use crate::request::Request;
use crate::response::Response;
use crate::tag::{Resolver, Tag};
use crate::template::{CLOSE, OPEN, Segment, Template};

pub const DEFAULT_FORMAT: &str = concat!(
    r#"{"time":"${time_rfc3339_nano}","id":"${id}","remote_ip":"${remote_ip}","#,
    r#""host":"${host}","method":"${method}","uri":"${uri}","user_agent":"${user_agent}"}"#,
);

/// Used by `${time_custom}`: `2006-01-02 15:04:05.000000`.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Configuration for [`AppLogger`]. Empty fields fall back to the defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppLoggerConfig {
    /// Template of `${tag}` placeholders.
    pub format: String,
    /// `chrono` strftime pattern for `${time_custom}`.
    pub custom_time_format: String,
}

impl Default for AppLoggerConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_owned(),
            custom_time_format: DEFAULT_TIME_FORMAT.to_owned(),
        }
    }
}

/// Middleware that sets each request logger's header from a tag template.
pub struct AppLogger {
    template: Template,
    resolver: Resolver,
    pool: BufferPool,
}

impl AppLogger {
    /// An `AppLogger` with [`DEFAULT_FORMAT`] and [`DEFAULT_TIME_FORMAT`].
    pub fn new() -> Self {
        Self::with_config(AppLoggerConfig::default()).expect("default app logger format is valid")
    }

    /// Compiles `config` into a middleware.
    ///
    /// Fails on a template with an unterminated tag or an invalid time
    /// format; nothing is checked per request.
    pub fn with_config(config: AppLoggerConfig) -> Result<Self, Error> {
        let format = non_empty(config.format, DEFAULT_FORMAT);
        let time_format = non_empty(config.custom_time_format, DEFAULT_TIME_FORMAT);

        if StrftimeItems::new(&time_format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::Config(format!("invalid custom time format `{time_format}`")));
        }

        Ok(Self {
            template: Template::new(&format, OPEN, CLOSE)?,
            resolver: Resolver::new(time_format),
            pool: BufferPool::new(),
        })
    }

    pub fn format(&self) -> &str {
        self.template.source()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Resolves the request tags of the template for `req`.
    ///
    /// Resolved values become text segments of the returned template and
    /// tags left for the logger stay tags, so a request value that looks
    /// like `${tag}` is never read as one. Values are rendered through a
    /// pooled buffer.
    pub fn compose(&self, req: &Request) -> io::Result<Template> {
        let mut buf = self.pool.acquire();
        let mut segments = Vec::with_capacity(self.template.segments().len());

        for segment in self.template.segments() {
            match segment {
                Segment::Tag(name) if matches!(Tag::parse(name), Tag::Passthrough(_)) => {
                    segments.push(Segment::Tag(name.clone()));
                }
                Segment::Tag(name) => {
                    buf.clear();
                    self.resolver.resolve(name, req, &mut *buf)?;
                    segments.push(Segment::Text(String::from_utf8_lossy(&buf).into_owned()));
                }
                Segment::Text(text) => segments.push(Segment::Text(text.clone())),
            }
        }

        Ok(Template::from_segments(segments, OPEN, CLOSE))
    }
}

impl Default for AppLogger {
    fn default() -> Self { Self::new() }
}

impl Middleware for AppLogger {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture<Result<Response, Error>> {
        let header = match self.compose(&req) {
            Ok(header) => header,
            Err(e) => return Box::pin(async move { Err::<Response, Error>(Error::Io(e)) }),
        };

        req.logger_mut().set_header_template(header);
        next.run(req)
    }
}

fn non_empty(value: String, default: &str) -> String {
    if value.is_empty() { default.to_owned() } else { value }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::handler::Handler;
    use crate::request::test_request;
    use crate::template::TemplateError;

    async fn echo_header(req: Request) -> Response {
        Response::text(req.logger().header().to_owned())
    }

    async fn run(logger: &Arc<AppLogger>, req: Request) -> Result<Response, Error> {
        let layer: Arc<dyn Middleware> = logger.clone();
        let stack: Arc<[Arc<dyn Middleware>]> = Arc::new([layer]);
        Next::new(stack, echo_header.into_boxed_handler()).run(req).await
    }

    fn request() -> Request {
        test_request(
            http::Request::builder()
                .method(Method::GET)
                .uri("/items?page=2")
                .header("user-agent", "curl/8.0")
                .body(Bytes::new())
                .unwrap(),
        )
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let logger = AppLogger::with_config(AppLoggerConfig {
            format: String::new(),
            custom_time_format: String::new(),
        })
        .unwrap();
        assert_eq!(logger.format(), DEFAULT_FORMAT);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: AppLoggerConfig =
            serde_json::from_str(r#"{"format":"${method} ${uri}"}"#).unwrap();
        assert_eq!(config.format, "${method} ${uri}");
        assert_eq!(config.custom_time_format, DEFAULT_TIME_FORMAT);
    }

    #[test]
    fn rejects_unterminated_tag() {
        let err = AppLogger::with_config(AppLoggerConfig {
            format: "${method".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Template(TemplateError::Unterminated { offset: 0 })));
    }

    #[test]
    fn rejects_invalid_time_format() {
        let err = AppLogger::with_config(AppLoggerConfig {
            custom_time_format: "%H:%M:%S%.5f".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn sets_logger_header_before_handler() {
        let logger = Arc::new(
            AppLogger::with_config(AppLoggerConfig {
                format: "${method} ${uri} ${query:page} ${user_agent} ${level}".into(),
                ..Default::default()
            })
            .unwrap(),
        );

        let res = run(&logger, request()).await.unwrap();
        assert_eq!(res.body(), b"GET /items?page=2 2 curl/8.0 ${level}");
    }

    #[tokio::test]
    async fn buffers_return_to_the_pool() {
        let logger = Arc::new(AppLogger::new());
        for _ in 0..10 {
            run(&logger, request()).await.unwrap();
        }
        assert_eq!(logger.pool().idle(), 1);
    }

    #[test]
    fn request_values_stay_literal() {
        let logger = Arc::new(
            AppLogger::with_config(AppLoggerConfig {
                format: "ua=${user_agent} ${level}".into(),
                ..Default::default()
            })
            .unwrap(),
        );
        let req = test_request(
            http::Request::builder()
                .uri("/")
                .header("user-agent", "a${b ${prefix}")
                .body(Bytes::new())
                .unwrap(),
        );

        let header = logger.compose(&req).unwrap();
        assert_eq!(
            header.segments(),
            [Segment::Text("ua=a${b ${prefix} ".into()), Segment::Tag("level".into())]
        );
    }

    #[tokio::test]
    async fn render_failure_skips_the_handler() {
        let logger = Arc::new(AppLogger {
            template: Template::new("${method} ${time_custom}", OPEN, CLOSE).unwrap(),
            resolver: Resolver::new("%H:%M:%S%.5f"),
            pool: BufferPool::new(),
        });

        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let endpoint = (move |_req: Request| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Response::text("handled")
            }
        })
        .into_boxed_handler();

        let layer: Arc<dyn Middleware> = logger.clone();
        let stack: Arc<[Arc<dyn Middleware>]> = Arc::new([layer]);
        let err = Next::new(stack, endpoint).run(request()).await.err().unwrap();

        assert!(matches!(err, Error::Io(_)));
        assert!(!reached.load(Ordering::SeqCst));
        assert_eq!(logger.pool().idle(), 1);
    }
}
