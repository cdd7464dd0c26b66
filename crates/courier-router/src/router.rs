//! The route table.
//!
//! This module provides the main [`Router`] struct: one insertion-ordered
//! route list per [`RouteMethod`], resolved first-match-wins.

use std::fmt;

use crate::error::RoutingError;
use crate::method::RouteMethod;
use crate::params::Params;
use crate::pattern::{IntoPattern, RoutePattern};
use crate::RouteMatch;

/// A registered route.
#[derive(Clone)]
pub struct Route<H> {
    method: RouteMethod,
    pattern: RoutePattern,
    handler: H,
}

impl<H> Route<H> {
    /// The method the route was registered under (`Any` for fanned-out routes).
    #[must_use]
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    /// The compiled pattern.
    #[must_use]
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// The route handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn match_path(&self, path: &str) -> Option<Params> {
        self.pattern.match_path(path)
    }
}

impl<H> fmt::Debug for Route<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Resolves a method and path to a handler.
///
/// The router is generic over the handler type so it can hold anything from
/// an operation name in tests to a boxed async function in the server.
///
/// # Example
///
/// ```rust
/// use courier_router::Router;
///
/// let mut router = Router::new();
/// router.get("/users/:id", "getUser").unwrap();
/// router.any("/health", "health").unwrap();
///
/// let found = router.resolve("GET", "/users/7").unwrap().unwrap();
/// assert_eq!(*found.handler, "getUser");
/// assert_eq!(found.params.get("id"), Some("7"));
///
/// assert!(router.resolve("post", "/health").unwrap().is_some());
/// assert!(router.resolve("get", "/missing").unwrap().is_none());
/// assert!(router.resolve("brew", "/health").is_err());
/// ```
///
/// # Ordering
///
/// Routes are tried in registration order within each method and the first
/// match wins. A route registered with [`Router::any`] is copied into every
/// method list at the moment of registration, so it keeps its position
/// relative to the routes registered before and after it.
pub struct Router<H> {
    tables: [Vec<Route<H>>; RouteMethod::COUNT],
    route_count: usize,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> Clone for Router<H> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            route_count: self.route_count,
        }
    }
}

impl<H> fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for method in RouteMethod::ALL {
            map.entry(&method, &self.tables[method.index()].len());
        }
        map.finish()
    }
}

impl<H> Router<H> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| Vec::new()),
            route_count: 0,
        }
    }

    /// Resolves a method token and path.
    ///
    /// Returns `Ok(None)` when no route matches and an error when the method
    /// token is not recognised.
    pub fn resolve(&self, method: &str, path: &str) -> Result<Option<RouteMatch<'_, H>>, RoutingError> {
        let method = method
            .parse::<RouteMethod>()
            .map_err(|_| RoutingError::unknown_method(method))?;
        Ok(self.resolve_method(method, path))
    }

    /// Resolves an already-parsed method and path.
    #[must_use]
    pub fn resolve_method(&self, method: RouteMethod, path: &str) -> Option<RouteMatch<'_, H>> {
        self.tables[method.index()].iter().find_map(|route| {
            route
                .match_path(path)
                .map(|params| RouteMatch::new(&route.handler, params))
        })
    }

    /// Routes registered for `method`, in resolution order.
    #[must_use]
    pub fn routes(&self, method: RouteMethod) -> &[Route<H>] {
        &self.tables[method.index()]
    }

    /// Number of registrations (an `any` registration counts once).
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}

impl<H: Clone> Router<H> {
    /// Registers a route under a method token such as `"get"` or `"ANY"`.
    pub fn register_route<P>(&mut self, method: &str, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        let method = method.parse::<RouteMethod>()?;
        self.route(method, pattern, handler)
    }

    /// Registers a route under a typed method.
    pub fn route<P>(&mut self, method: RouteMethod, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        let route = Route {
            method,
            pattern: pattern.into_pattern()?,
            handler,
        };

        if method == RouteMethod::Any {
            for table in &mut self.tables {
                table.push(route.clone());
            }
        } else {
            self.tables[method.index()].push(route);
        }
        self.route_count += 1;
        Ok(self)
    }

    /// Registers a `DELETE` route.
    pub fn delete<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Delete, pattern, handler)
    }

    /// Registers a `GET` route.
    pub fn get<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Get, pattern, handler)
    }

    /// Registers a `HEAD` route.
    pub fn head<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Head, pattern, handler)
    }

    /// Registers an `OPTIONS` route.
    pub fn options<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Options, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Patch, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Post, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Put, pattern, handler)
    }

    /// Registers a route in every method list.
    pub fn any<P>(&mut self, pattern: P, handler: H) -> Result<&mut Self, RoutingError>
    where
        P: IntoPattern,
    {
        self.route(RouteMethod::Any, pattern, handler)
    }
}
