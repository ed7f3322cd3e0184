//! # tagline
//!
//! A minimal HTTP framework for Rust services behind a reverse proxy, with
//! request metadata stamped onto every application log line.
//!
//! ## The contract
//!
//! The proxy terminates TLS, limits rates and body sizes, and deals with
//! slow clients. tagline routes requests, runs middleware, and gives every
//! request its own [`Logger`] handle.
//!
//! The [`AppLogger`](middleware::AppLogger) middleware renders a template of
//! `${tag}` placeholders against the request and installs it as that
//! logger's header. Tags it does not know, such as `${level}`, are left for
//! the logger to fill in, so one template mixes both:
//!
//! ```text
//! {"time":"2024-05-01T10:00:00+02:00","id":"8b1f…","method":"GET","uri":"/","level":"INFO","message":"hello"}
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tagline::middleware::{AppLogger, RequestId};
//! use tagline::{Method, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tagline::Error> {
//!     let app = Router::new()
//!         .layer(RequestId::new())
//!         .layer(AppLogger::new())
//!         .on(Method::GET, "/users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     req.logger().info(format_args!("looking up user {id}"));
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod log;
pub mod middleware;
pub mod pool;
pub mod tag;
pub mod template;

pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler};
pub use http::{Method, StatusCode};
pub use log::{Level, Logger};
pub use request::{Request, X_REQUEST_ID};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
