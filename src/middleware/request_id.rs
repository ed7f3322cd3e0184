//! Request correlation IDs.

use std::sync::Arc;

use http::HeaderValue;
use uuid::Uuid;

use super::{Middleware, Next};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::{Request, X_REQUEST_ID};
use crate::response::Response;

type Generator = Arc<dyn Fn() -> String + Send + Sync>;
type OnId = Arc<dyn Fn(&mut Request, &str) + Send + Sync>;

/// Assigns every request an ID and returns it in `X-Request-ID`.
///
/// An ID sent by the client or an upstream proxy is kept; otherwise a UUID v4
/// is generated. Register it before [`AppLogger`](super::AppLogger) so
/// `${id}` has something to render.
#[derive(Clone)]
pub struct RequestId {
    generator: Generator,
    on_id: Option<OnId>,
}

impl RequestId {
    pub fn new() -> Self {
        Self {
            generator: Arc::new(|| Uuid::new_v4().to_string()),
            on_id: None,
        }
    }

    /// Replaces the UUID generator.
    pub fn generator(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generator = Arc::new(f);
        self
    }

    /// Runs `f` with every assigned ID, e.g. to copy it into the context store.
    pub fn on_id(mut self, f: impl Fn(&mut Request, &str) + Send + Sync + 'static) -> Self {
        self.on_id = Some(Arc::new(f));
        self
    }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestId {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture<Result<Response, Error>> {
        let id = match req.header(X_REQUEST_ID).filter(|v| !v.is_empty()) {
            Some(incoming) => incoming.to_owned(),
            None => (self.generator)(),
        };
        if let Some(hook) = &self.on_id {
            hook(&mut req, &id);
        }
        req.set_request_id(id.clone());

        let fut = next.run(req);
        Box::pin(async move {
            let mut res = fut.await?;
            if let Ok(value) = HeaderValue::from_str(&id) {
                res.headers_mut().insert(X_REQUEST_ID, value);
            }
            Ok(res)
        })
    }
}
