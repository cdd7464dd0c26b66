//! Core middleware trait and types.
//!
//! Middleware runs on every request before routing. Each stage sees the
//! [`Request`] (and through it the paired response) and decides whether the
//! pipeline continues.
//!
//! # Example
//!
//! ```
//! use courier_core::Request;
//! use courier_middleware::{BoxFuture, Flow, Middleware};
//!
//! struct RequireJson;
//!
//! impl Middleware for RequireJson {
//!     fn name(&self) -> &'static str {
//!         "require_json"
//!     }
//!
//!     fn handle(&self, request: Request) -> BoxFuture<'static, Flow> {
//!         Box::pin(async move {
//!             if request.accepts(&["application/json"]).is_some() {
//!                 Flow::Continue
//!             } else {
//!                 Flow::Stop
//!             }
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;

use courier_core::Request;

pub use courier_core::BoxFuture;

/// Whether the pipeline goes on after a middleware stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Run the next stage, then routing.
    #[default]
    Continue,
    /// Skip the remaining stages and routing.
    Stop,
}

impl Flow {
    /// Returns true for [`Flow::Stop`].
    #[must_use]
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl From<()> for Flow {
    fn from((): ()) -> Self {
        Self::Continue
    }
}

/// `false` stops the pipeline, `true` continues it.
impl From<bool> for Flow {
    fn from(proceed: bool) -> Self {
        if proceed {
            Self::Continue
        } else {
            Self::Stop
        }
    }
}

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage that sends the response ends the pipeline whatever it returns
/// - Stages run in registration order, one at a time per request
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and in [`ChainOutcome`](crate::ChainOutcome).
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn handle(&self, request: Request) -> BoxFuture<'static, Flow>;
}

/// A middleware built from an async function.
///
/// The function may resolve to `()`, `bool` or [`Flow`].
///
/// # Example
///
/// ```
/// use courier_core::Request;
/// use courier_middleware::FnMiddleware;
///
/// let tag = FnMiddleware::new("tag", |req: Request| async move {
///     req.set_parameter("tagged", "yes");
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F, Fut, R> Middleware for FnMiddleware<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Flow>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, request: Request) -> BoxFuture<'static, Flow> {
        let fut = (self.func)(request);
        Box::pin(async move { fut.await.into() })
    }
}
