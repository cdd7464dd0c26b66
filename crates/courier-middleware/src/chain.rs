//! Ordered middleware chain.
//!
//! Stages run in the order they were pushed. The chain stops at the first
//! stage that returns [`Flow::Stop`] or that leaves the response sent.

use std::fmt;
use std::sync::Arc;

use courier_core::Request;
use tracing::debug;

use crate::middleware::{Flow, Middleware};

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// How a run of the chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every stage continued; routing should follow.
    Completed,
    /// A stage returned [`Flow::Stop`] without sending.
    Stopped {
        /// Name of the stopping stage.
        by: &'static str,
    },
    /// A stage sent the response.
    Responded {
        /// Name of the stage that sent.
        by: &'static str,
    },
}

impl ChainOutcome {
    /// Returns true if routing should follow.
    #[must_use]
    pub const fn should_route(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// The middleware chain.
///
/// # Example
///
/// ```
/// use courier_core::Request;
/// use courier_middleware::{FnMiddleware, MiddlewareChain};
///
/// let mut chain = MiddlewareChain::new();
/// chain.push(FnMiddleware::new("first", |_req: Request| async {}));
/// chain.push(FnMiddleware::new("second", |_req: Request| async { true }));
///
/// assert_eq!(chain.names(), vec!["first", "second"]);
/// ```
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    stages: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn push<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    pub fn push_shared(&mut self, middleware: BoxedMiddleware) -> &mut Self {
        self.stages.push(middleware);
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs the stages against `request`.
    pub async fn run(&self, request: &Request) -> ChainOutcome {
        for stage in &self.stages {
            let flow = stage.handle(request.clone()).await;

            if request.response().is_sent() {
                debug!(middleware = stage.name(), request_id = %request.id(), "middleware sent the response");
                return ChainOutcome::Responded { by: stage.name() };
            }
            if flow == Flow::Stop {
                debug!(middleware = stage.name(), request_id = %request.id(), "middleware stopped the pipeline");
                return ChainOutcome::Stopped { by: stage.name() };
            }
        }
        ChainOutcome::Completed
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain").field("stages", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;
    use courier_core::fixtures::MockRequest;
    use http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(name: &'static str, hits: &Arc<AtomicUsize>) -> impl Middleware {
        let hits = Arc::clone(hits);
        FnMiddleware::new(name, move |_req: Request| {
            hits.fetch_add(1, Ordering::SeqCst);
            async {}
        })
    }

    #[tokio::test]
    async fn test_empty_chain_completes() {
        let chain = MiddlewareChain::new();
        let (request, _probe) = MockRequest::new(Method::GET, "/").build();

        assert!(chain.is_empty());
        assert_eq!(chain.run(&request).await, ChainOutcome::Completed);
    }

    #[tokio::test]
    async fn test_runs_in_registration_order() {
        let mut chain = MiddlewareChain::new();
        chain
            .push(FnMiddleware::new("one", |req: Request| async move {
                req.set_parameter("order", "1");
            }))
            .push(FnMiddleware::new("two", |req: Request| async move {
                let prev = req.parameter("order").unwrap_or_default();
                req.set_parameter("order", format!("{prev}2"));
            }));
        let (request, _probe) = MockRequest::new(Method::GET, "/").build();

        assert_eq!(chain.run(&request).await, ChainOutcome::Completed);
        assert_eq!(request.parameter("order").as_deref(), Some("12"));
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_skips_later_stages() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = MiddlewareChain::new();
        chain
            .push(FnMiddleware::new("gate", |_req: Request| async { false }))
            .push(counting("after", &hits));
        let (request, probe) = MockRequest::new(Method::GET, "/").build();

        let outcome = chain.run(&request).await;
        assert_eq!(outcome, ChainOutcome::Stopped { by: "gate" });
        assert!(!outcome.should_route());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(probe.head_count(), 0);
    }

    #[tokio::test]
    async fn test_sending_stage_ends_chain_even_when_continuing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = MiddlewareChain::new();
        chain
            .push(FnMiddleware::new("early", |req: Request| async move {
                let _ = req.response().status(StatusCode::UNAUTHORIZED).send("nope").await;
                true
            }))
            .push(counting("after", &hits));
        let (request, probe) = MockRequest::new(Method::GET, "/").build();

        assert_eq!(chain.run(&request).await, ChainOutcome::Responded { by: "early" });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(probe.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(probe.body(), "nope");
    }

    #[test]
    fn test_debug_lists_stage_names() {
        let mut chain = MiddlewareChain::new();
        chain.push(FnMiddleware::new("a", |_req: Request| async {}));
        assert_eq!(format!("{chain:?}"), r#"MiddlewareChain { stages: ["a"] }"#);
    }
}
