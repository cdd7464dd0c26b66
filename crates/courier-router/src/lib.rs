//! Route resolution for Courier.
//!
//! The router maps a method and a request path to a handler plus the
//! parameters captured from the path. It keeps one insertion-ordered route
//! list per method and resolves first-match-wins.
//!
//! # Features
//!
//! - **Literal routes**: `/status`, matched in full and case-insensitively
//! - **Templates**: `/users/:id`, one capture per `:name` segment
//! - **Custom matchers**: a compiled [`regex::Regex`] or any [`PathMatcher`]
//! - **ANY routes**: copied into every method list when registered
//!
//! # Example
//!
//! ```rust
//! use courier_router::{RouteMethod, Router};
//!
//! let mut router = Router::new();
//! router.get("/users", "listUsers").unwrap();
//! router.get("/users/:id", "getUser").unwrap();
//! router.any("/health", "health").unwrap();
//!
//! let found = router.resolve("get", "/USERS/123").unwrap().unwrap();
//! assert_eq!(*found.handler, "getUser");
//! assert_eq!(found.params.get("id"), Some("123"));
//!
//! assert!(router.resolve_method(RouteMethod::Delete, "/health").is_some());
//! ```

mod error;
mod method;
mod params;
mod pattern;
mod router;

pub use error::RoutingError;
pub use method::RouteMethod;
pub use params::Params;
pub use pattern::{IntoPattern, PathMatcher, RoutePattern, Template};
pub use router::{Route, Router};

/// A resolved route: the handler and the parameters captured from the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, H> {
    /// The matched route's handler.
    pub handler: &'a H,
    /// Parameters captured by the route pattern.
    pub params: Params,
}

impl<'a, H> RouteMatch<'a, H> {
    /// Creates a new route match.
    #[must_use]
    pub fn new(handler: &'a H, params: Params) -> Self {
        Self { handler, params }
    }
}
