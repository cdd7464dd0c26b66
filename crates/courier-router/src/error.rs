//! Routing errors.

use thiserror::Error;

use crate::method::RouteMethod;

/// Errors raised while registering or resolving routes.
///
/// These indicate caller bugs (a bad method token or a malformed pattern),
/// not a missing route: resolution without a match is `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A route was registered under an unrecognised method.
    #[error("invalid method '{method}', expected one of: {valid}")]
    InvalidMethod {
        /// The rejected token.
        method: String,
        /// The recognised tokens.
        valid: String,
    },

    /// Resolution was requested for an unrecognised method.
    #[error("unknown method '{method}', expected one of: {valid}")]
    UnknownMethod {
        /// The rejected token.
        method: String,
        /// The recognised tokens.
        valid: String,
    },

    /// A route template could not be compiled.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The template as registered.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },
}

impl RoutingError {
    /// Creates a [`RoutingError::InvalidMethod`] for `method`.
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
            valid: RouteMethod::valid_tokens(),
        }
    }

    /// Creates a [`RoutingError::UnknownMethod`] for `method`.
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
            valid: RouteMethod::valid_tokens(),
        }
    }

    /// Creates a [`RoutingError::InvalidPattern`].
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}
