//! The per-request pipeline: middleware, route resolution, handler, send.
//!
//! Whatever the handler does, the pipeline ends with exactly one response
//! attempt on the stream:
//!
//! | Situation | Result |
//! |---|---|
//! | middleware returned `false` or sent | nothing more is done |
//! | no route, or a method the router does not know | `404` |
//! | handler returned data, response unsent | data is sent |
//! | handler returned data, response already sent | data discarded, `warn` |
//! | handler failed or panicked, response unsent | `500` with the message |
//! | handler failed, response already sent | `error` log only |

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use courier_core::{HandlerError, Payload, Request, Router};
use courier_middleware::{ChainOutcome, MiddlewareChain};
use futures_util::FutureExt;
use http::{Method, StatusCode};
use tokio::sync::broadcast;

const NOTIFICATION_CAPACITY: usize = 256;

/// Broadcast to subscribers whenever a request matches a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatched {
    /// The matched request.
    pub request_id: courier_core::RequestId,
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
}

/// How the pipeline ended for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A middleware stopped the pipeline without sending.
    Stopped {
        /// Name of the middleware.
        by: &'static str,
    },
    /// A middleware sent the response.
    Responded {
        /// Name of the middleware.
        by: &'static str,
    },
    /// No route matched; a `404` was attempted.
    NotFound,
    /// The handler ran to completion.
    Handled,
    /// The handler failed or panicked.
    Failed,
}

/// Owns the frozen router and middleware chain.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    middleware: Arc<MiddlewareChain>,
    notifications: broadcast::Sender<RouteMatched>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("middleware", &self.middleware.names())
            .finish()
    }
}

impl Dispatcher {
    /// Freezes `router` and `middleware` for dispatching.
    #[must_use]
    pub fn new(router: Router, middleware: MiddlewareChain) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            router: Arc::new(router),
            middleware: Arc::new(middleware),
            notifications,
        }
    }

    /// Subscribes to route-matched notifications.
    ///
    /// Slow subscribers miss notifications rather than block dispatch.
    pub fn subscribe(&self) -> broadcast::Receiver<RouteMatched> {
        self.notifications.subscribe()
    }

    /// The router requests are resolved against.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs the pipeline for one request.
    pub async fn dispatch(&self, request: Request) -> DispatchOutcome {
        match self.middleware.run(&request).await {
            ChainOutcome::Completed => {}
            ChainOutcome::Stopped { by } => return DispatchOutcome::Stopped { by },
            ChainOutcome::Responded { by } => return DispatchOutcome::Responded { by },
        }

        let handler = match self.router.resolve(request.method().as_str(), request.path()) {
            Ok(Some(found)) => {
                request.merge_parameters(found.params);
                Arc::clone(found.handler)
            }
            Ok(None) => {
                not_found(&request).await;
                return DispatchOutcome::NotFound;
            }
            Err(err) => {
                tracing::warn!(request_id = %request.id(), error = %err, "request method is not routable");
                not_found(&request).await;
                return DispatchOutcome::NotFound;
            }
        };

        let _ = self.notifications.send(RouteMatched {
            request_id: request.id(),
            method: request.method().clone(),
            path: request.path().to_string(),
        });

        let call = {
            let request = request.clone();
            AssertUnwindSafe(async move { handler(request).await }).catch_unwind()
        };
        let result = match call.await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::msg(panic_message(&*panic))),
        };

        match result {
            Ok(Some(payload)) => deliver(&request, payload).await,
            Ok(None) => DispatchOutcome::Handled,
            Err(err) => {
                fail(&request, &err.message()).await;
                DispatchOutcome::Failed
            }
        }
    }
}

async fn deliver(request: &Request, payload: Payload) -> DispatchOutcome {
    let response = request.response();
    if response.is_sent() {
        tracing::warn!(
            request_id = %request.id(),
            path = request.path(),
            "handler returned data after sending the response, data discarded"
        );
        return DispatchOutcome::Handled;
    }

    match response.send(payload).await {
        Ok(_) => DispatchOutcome::Handled,
        Err(err) if !response.is_sent() => {
            fail(request, &err.to_string()).await;
            DispatchOutcome::Failed
        }
        Err(err) => {
            tracing::debug!(request_id = %request.id(), error = %err, "sending handler data failed");
            DispatchOutcome::Handled
        }
    }
}

async fn fail(request: &Request, message: &str) {
    let response = request.response();
    if response.is_sent() {
        tracing::error!(
            request_id = %request.id(),
            path = request.path(),
            error = message,
            "handler failed after sending the response"
        );
        return;
    }

    tracing::error!(request_id = %request.id(), path = request.path(), error = message, "handler failed");
    if let Err(err) = response.send_status(StatusCode::INTERNAL_SERVER_ERROR, message).await {
        tracing::debug!(request_id = %request.id(), error = %err, "could not send 500");
    }
}

async fn not_found(request: &Request) {
    let message = format!("Path '{}' for method '{}' not found!", request.path(), request.method());
    tracing::debug!(request_id = %request.id(), "{message}");
    if let Err(err) = request.response().send_status(StatusCode::NOT_FOUND, message).await {
        tracing::debug!(request_id = %request.id(), error = %err, "could not send 404");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::fixtures::MockRequest;
    use courier_core::handler_fn;
    use courier_middleware::FnMiddleware;

    fn dispatcher(router: Router) -> Dispatcher {
        Dispatcher::new(router, MiddlewareChain::new())
    }

    #[tokio::test]
    async fn test_returned_data_is_sent() {
        let mut router = Router::new();
        router
            .get("/hello", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("yeah!") }))
            .unwrap();
        let (request, probe) = MockRequest::new(Method::GET, "/hello").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Handled);
        assert_eq!(probe.status(), Some(StatusCode::OK));
        assert_eq!(probe.body(), "yeah!");
    }

    #[tokio::test]
    async fn test_no_route_is_404() {
        let (request, probe) = MockRequest::new(Method::POST, "/missing").build();

        assert_eq!(dispatcher(Router::new()).dispatch(request).await, DispatchOutcome::NotFound);
        assert_eq!(probe.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(probe.body(), "Path '/missing' for method 'POST' not found!");
    }

    #[tokio::test]
    async fn test_unknown_method_is_404() {
        let mut router = Router::new();
        router
            .any("/x", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("never") }))
            .unwrap();
        let (request, probe) = MockRequest::new(Method::TRACE, "/x").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::NotFound);
        assert_eq!(probe.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_head_404_has_no_body() {
        let (request, probe) = MockRequest::new(Method::HEAD, "/missing").build();

        dispatcher(Router::new()).dispatch(request).await;
        assert_eq!(probe.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(probe.body(), "");
        assert!(probe.is_finished());
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let mut router = Router::new();
        router
            .get(
                "/boom",
                handler_fn(|_req: Request| async { Err::<(), _>(HandlerError::msg("database unavailable")) }),
            )
            .unwrap();
        let (request, probe) = MockRequest::new(Method::GET, "/boom").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Failed);
        assert_eq!(probe.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(probe.body(), "database unavailable");
    }

    #[tokio::test]
    async fn test_handler_panic_is_500() {
        let mut router = Router::new();
        router
            .get(
                "/panic",
                handler_fn(|_req: Request| async {
                    if true {
                        panic!("index out of range");
                    }
                    Ok::<_, HandlerError>(())
                }),
            )
            .unwrap();
        let (request, probe) = MockRequest::new(Method::GET, "/panic").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Failed);
        assert_eq!(probe.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(probe.body(), "index out of range");
    }

    #[tokio::test]
    async fn test_failure_after_send_keeps_first_response() {
        let mut router = Router::new();
        router
            .get(
                "/late",
                handler_fn(|req: Request| async move {
                    req.response().status(StatusCode::ACCEPTED).send("accepted").await?;
                    Err::<(), _>(HandlerError::msg("too late"))
                }),
            )
            .unwrap();
        let (request, probe) = MockRequest::new(Method::GET, "/late").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Failed);
        assert_eq!(probe.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(probe.body(), "accepted");
        assert_eq!(probe.head_count(), 1);
    }

    #[tokio::test]
    async fn test_data_after_send_is_discarded() {
        let mut router = Router::new();
        router
            .get(
                "/twice",
                handler_fn(|req: Request| async move {
                    req.response().send("first").await?;
                    Ok::<_, HandlerError>("second")
                }),
            )
            .unwrap();
        let (request, probe) = MockRequest::new(Method::GET, "/twice").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Handled);
        assert_eq!(probe.body(), "first");
        assert_eq!(probe.head_count(), 1);
    }

    #[tokio::test]
    async fn test_head_with_returned_body_is_500_without_body() {
        let mut router = Router::new();
        router
            .head("/doc", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("body") }))
            .unwrap();
        let (request, probe) = MockRequest::new(Method::HEAD, "/doc").build();

        assert_eq!(dispatcher(router).dispatch(request).await, DispatchOutcome::Failed);
        assert_eq!(probe.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(probe.body(), "");
    }

    #[tokio::test]
    async fn test_router_params_override_middleware_params() {
        let mut router = Router::new();
        router
            .get(
                "/users/:id",
                handler_fn(|req: Request| async move {
                    Ok::<_, HandlerError>(format!(
                        "{}/{}",
                        req.parameter("id").unwrap_or_default(),
                        req.parameter("tenant").unwrap_or_default()
                    ))
                }),
            )
            .unwrap();
        let mut chain = MiddlewareChain::new();
        chain.push(FnMiddleware::new("tenant", |req: Request| async move {
            req.set_parameter("tenant", "acme");
            req.set_parameter("id", "from-middleware");
        }));
        let (request, probe) = MockRequest::new(Method::GET, "/users/42").build();

        Dispatcher::new(router, chain).dispatch(request).await;
        assert_eq!(probe.body(), "42/acme");
    }

    #[tokio::test]
    async fn test_stopping_middleware_skips_routing() {
        let mut router = Router::new();
        router
            .get("/", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("handled") }))
            .unwrap();
        let mut chain = MiddlewareChain::new();
        chain.push(FnMiddleware::new("gate", |_req: Request| async { false }));
        let (request, probe) = MockRequest::new(Method::GET, "/").build();

        let outcome = Dispatcher::new(router, chain).dispatch(request).await;
        assert_eq!(outcome, DispatchOutcome::Stopped { by: "gate" });
        assert_eq!(probe.head_count(), 0);
    }

    #[tokio::test]
    async fn test_sending_middleware_prevents_further_sends() {
        let mut router = Router::new();
        router
            .get("/", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("handled") }))
            .unwrap();
        let mut chain = MiddlewareChain::new();
        chain.push(FnMiddleware::new("auth", |req: Request| async move {
            let _ = req.response().send_status(StatusCode::UNAUTHORIZED, "denied").await;
        }));
        let (request, probe) = MockRequest::new(Method::GET, "/").build();

        let outcome = Dispatcher::new(router, chain).dispatch(request).await;
        assert_eq!(outcome, DispatchOutcome::Responded { by: "auth" });
        assert_eq!(probe.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(probe.head_count(), 1);
    }

    #[tokio::test]
    async fn test_route_match_is_broadcast() {
        let mut router = Router::new();
        router
            .post("/orders", handler_fn(|_req: Request| async { Ok::<_, HandlerError>(()) }))
            .unwrap();
        let dispatcher = dispatcher(router);
        let mut notifications = dispatcher.subscribe();
        let (request, _probe) = MockRequest::new(Method::POST, "/orders").build();
        let id = request.id();

        dispatcher.dispatch(request).await;
        let matched = notifications.try_recv().unwrap();
        assert_eq!(matched.request_id, id);
        assert_eq!(matched.method, Method::POST);
        assert_eq!(matched.path, "/orders");
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "handler panicked");
    }
}
