//! Middleware layer.
//!
//! Middleware wraps every request on a [`Router`](crate::Router), matched or
//! not, and is the place for cross-cutting concerns. Layers run in the order
//! they were registered: the first one added sees the request first and the
//! response last.
//!
//! Built-in middleware:
//! - [`RequestId`] — assigns a correlation ID and echoes it in `X-Request-ID`
//! - [`AppLogger`] — renders request metadata into the request logger's header
//!
//! A middleware either hands the request on with [`Next::run`] or stops the
//! pipeline by returning an [`Error`]. Errors reach the router, which logs
//! them and answers `500 Internal Server Error`.

mod app_logger;
mod request_id;

use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use app_logger::{AppLogger, AppLoggerConfig, DEFAULT_FORMAT, DEFAULT_TIME_FORMAT};
pub use request_id::RequestId;

/// A pipeline stage wrapping everything registered after it.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture<Result<Response, Error>>;
}

/// The rest of the pipeline: remaining middleware, then the route handler.
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(stack: Arc<[Arc<dyn Middleware>]>, endpoint: BoxedHandler) -> Self {
        Self { stack, index: 0, endpoint }
    }

    /// Passes `req` to the next stage.
    pub fn run(mut self, req: Request) -> BoxFuture<Result<Response, Error>> {
        match self.stack.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer.call(req, self)
            }
            None => {
                let fut = self.endpoint.call(req);
                Box::pin(async move { Ok::<_, Error>(fut.await) })
            }
        }
    }
}
