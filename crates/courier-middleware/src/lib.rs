//! # Courier Middleware
//!
//! Middleware runs on every request, in registration order, before the
//! router is consulted.
//!
//! ```text
//! Request → stage 1 → stage 2 → … → Router → Handler
//!              │          │
//!              └─ Stop ───┴──→ pipeline ends (no routing)
//! ```
//!
//! A stage ends the pipeline by returning [`Flow::Stop`] (for function
//! middleware, `false`) or by sending the response itself.
//!
//! ## Example
//!
//! ```
//! use courier_core::Request;
//! use courier_middleware::{ChainOutcome, FnMiddleware, MiddlewareChain, RequestLogger};
//!
//! let mut chain = MiddlewareChain::new();
//! chain
//!     .push(RequestLogger::new())
//!     .push(FnMiddleware::new("api_only", |req: Request| async move {
//!         req.path().starts_with("/api")
//!     }));
//!
//! assert_eq!(chain.names(), vec!["request_logger", "api_only"]);
//! assert!(ChainOutcome::Completed.should_route());
//! ```

#![doc(html_root_url = "https://docs.rs/courier-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod logger;
pub mod middleware;

pub use chain::{BoxedMiddleware, ChainOutcome, MiddlewareChain};
pub use logger::RequestLogger;
pub use middleware::{BoxFuture, Flow, FnMiddleware, Middleware};
