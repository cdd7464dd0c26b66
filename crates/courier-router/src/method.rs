//! The closed set of methods a route can be registered under.
//!
//! Every method owns one slot in the router's table. [`RouteMethod::Any`] is
//! a registration wildcard: routes added under it are copied into every
//! slot, its own included.

use std::fmt;
use std::str::FromStr;

use http::Method;

use crate::error::RoutingError;

/// A method recognised by the router.
///
/// Parsing is case-insensitive.
///
/// ```rust
/// use courier_router::RouteMethod;
///
/// assert_eq!("get".parse::<RouteMethod>().unwrap(), RouteMethod::Get);
/// assert_eq!("PATCH".parse::<RouteMethod>().unwrap(), RouteMethod::Patch);
/// assert!("trace".parse::<RouteMethod>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// `DELETE`
    Delete,
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `PATCH`
    Patch,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// Registration wildcard covering every method.
    Any,
}

impl RouteMethod {
    /// Every recognised method in table order.
    pub const ALL: [RouteMethod; 8] = [
        RouteMethod::Delete,
        RouteMethod::Get,
        RouteMethod::Head,
        RouteMethod::Options,
        RouteMethod::Patch,
        RouteMethod::Post,
        RouteMethod::Put,
        RouteMethod::Any,
    ];

    /// Number of table slots.
    pub const COUNT: usize = Self::ALL.len();

    /// Slot index of this method in the route table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Delete => 0,
            Self::Get => 1,
            Self::Head => 2,
            Self::Options => 3,
            Self::Patch => 4,
            Self::Post => 5,
            Self::Put => 6,
            Self::Any => 7,
        }
    }

    /// Lowercase token for this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Get => "get",
            Self::Head => "head",
            Self::Options => "options",
            Self::Patch => "patch",
            Self::Post => "post",
            Self::Put => "put",
            Self::Any => "any",
        }
    }

    /// Comma separated list of the valid tokens, used in error messages.
    #[must_use]
    pub fn valid_tokens() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parse_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| token.eq_ignore_ascii_case(m.as_str()))
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteMethod {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_token(s).ok_or_else(|| RoutingError::invalid_method(s))
    }
}

impl TryFrom<&Method> for RouteMethod {
    type Error = RoutingError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        Self::parse_token(method.as_str()).ok_or_else(|| RoutingError::unknown_method(method.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        for token in ["get", "GET", "Get", "gEt"] {
            assert_eq!(token.parse::<RouteMethod>().unwrap(), RouteMethod::Get);
        }
        assert_eq!("any".parse::<RouteMethod>().unwrap(), RouteMethod::Any);
        assert_eq!("Options".parse::<RouteMethod>().unwrap(), RouteMethod::Options);
    }

    #[test]
    fn test_parse_rejects_unknown_tokens() {
        let err = "connect".parse::<RouteMethod>().unwrap_err();
        assert!(matches!(err, RoutingError::InvalidMethod { .. }));
        assert!(err.to_string().contains("delete, get, head, options, patch, post, put, any"));
    }

    #[test]
    fn test_indices_are_dense_and_unique() {
        for (expected, method) in RouteMethod::ALL.iter().enumerate() {
            assert_eq!(method.index(), expected);
        }
    }

    #[test]
    fn test_from_http_method() {
        assert_eq!(RouteMethod::try_from(&Method::HEAD).unwrap(), RouteMethod::Head);
        assert_eq!(RouteMethod::try_from(&Method::DELETE).unwrap(), RouteMethod::Delete);

        let err = RouteMethod::try_from(&Method::TRACE).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownMethod { .. }));
    }
}
