//! Request logging middleware.
//!
//! Emits one `debug` event per incoming request with its id, method and
//! URL. Never stops the pipeline.

use courier_core::Request;
use http::header::USER_AGENT;
use tracing::{debug, trace};

use crate::middleware::{BoxFuture, Flow, Middleware};

/// Middleware that logs every incoming request.
///
/// # Example
///
/// ```
/// use courier_middleware::{MiddlewareChain, RequestLogger};
///
/// let mut chain = MiddlewareChain::new();
/// chain.push(RequestLogger::new().with_headers());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger {
    headers: bool,
}

impl RequestLogger {
    /// Creates a logger that records the request line only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also dumps the request headers at `trace` level.
    #[must_use]
    pub fn with_headers(mut self) -> Self {
        self.headers = true;
        self
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    fn handle(&self, request: Request) -> BoxFuture<'static, Flow> {
        let headers = self.headers;
        Box::pin(async move {
            debug!(
                request_id = %request.id(),
                method = %request.method(),
                url = request.url(),
                user_agent = request.header(USER_AGENT.as_str()).unwrap_or("-"),
                "incoming request"
            );
            if headers {
                for (name, value) in request.headers() {
                    trace!(request_id = %request.id(), header = %name, value = ?value, "request header");
                }
            }
            Flow::Continue
        })
    }
}
