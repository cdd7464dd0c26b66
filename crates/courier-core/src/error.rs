//! Error types for Courier.
//!
//! Three layers of failure meet in a request:
//!
//! | Type | Raised by | Seen by |
//! |---|---|---|
//! | [`StreamError`] | the transport stream | `Response::send`, body reads |
//! | [`ResponseError`] | the one-shot response guard | handlers and middleware |
//! | [`HandlerError`] | caller handler code | the dispatcher, which maps it to `500` |

use std::fmt;
use std::sync::Arc;

use http::Method;
use thiserror::Error;

/// Result type alias for response operations.
pub type ResponseResult<T> = Result<T, ResponseError>;

/// Failures reported by a transport stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream finished or was closed before the operation completed.
    #[error("stream closed")]
    Closed,

    /// The peer (or the local side) reset the stream.
    #[error("stream reset with code {code}")]
    Reset {
        /// HTTP/2 error code carried by the reset.
        code: u32,
    },

    /// The owning session tore the stream down.
    #[error("stream aborted: {reason}")]
    Aborted {
        /// Why the session ended.
        reason: Arc<str>,
    },

    /// The transport failed while writing or reading.
    #[error("transport error: {message}")]
    Transport {
        /// Transport error description.
        message: String,
    },

    /// A piped body source failed mid-stream.
    #[error("body source failed: {message}")]
    Source {
        /// Source error description.
        message: String,
    },
}

impl StreamError {
    /// Creates a [`StreamError::Transport`] from any displayable error.
    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }

    /// Creates a [`StreamError::Source`] from any displayable error.
    pub fn source_failed(err: impl fmt::Display) -> Self {
        Self::Source {
            message: err.to_string(),
        }
    }

    /// Creates a [`StreamError::Aborted`].
    pub fn aborted(reason: impl Into<Arc<str>>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }
}

/// Failures of the one-shot response.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// `send` was called on a response that had already been sent.
    #[error("the response was already sent")]
    AlreadySent,

    /// A payload or stream was attached to a response that cannot carry a body.
    #[error("a {method} response must not carry a body")]
    BodyNotAllowed {
        /// The request method.
        method: Method,
    },

    /// The stream can no longer accept a response.
    #[error("the stream for '{path}' is no longer available")]
    StreamUnavailable {
        /// Path of the request the response belongs to.
        path: String,
    },

    /// A header name or value was rejected.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// The header name as given.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The transport failed while the response was in flight.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ResponseError {
    /// Creates a [`ResponseError::InvalidHeader`].
    pub fn invalid_header(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the failure was caused by the stream going away.
    #[must_use]
    pub fn is_stream_gone(&self) -> bool {
        matches!(self, Self::StreamUnavailable { .. } | Self::Stream(_))
    }
}

/// A failure returned by a route handler.
///
/// Any error type converts into a `HandlerError`, so handlers can use `?`
/// freely. The display text becomes the body of the `500` response.
///
/// ```rust
/// use courier_core::HandlerError;
///
/// fn parse(raw: &str) -> Result<u32, HandlerError> {
///     Ok(raw.parse::<u32>()?)
/// }
///
/// let err = parse("nope").unwrap_err();
/// assert_eq!(err.to_string(), "invalid digit found in string");
/// ```
pub struct HandlerError(anyhow::Error);

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }

    /// The message sent as the `500` body.
    #[must_use]
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Borrows the underlying error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Unwraps the underlying error.
    #[must_use]
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

impl<E> From<E> for HandlerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_from_std_error() {
        let err: HandlerError = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire").into();
        assert_eq!(err.message(), "disk on fire");
    }

    #[test]
    fn test_handler_error_from_response_error() {
        let err: HandlerError = ResponseError::AlreadySent.into();
        assert_eq!(err.to_string(), "the response was already sent");
    }

    #[test]
    fn test_handler_error_msg() {
        let err = HandlerError::msg("boom");
        assert_eq!(err.message(), "boom");
        assert_eq!(format!("{err}"), "boom");
    }

    #[test]
    fn test_response_error_display() {
        let err = ResponseError::BodyNotAllowed { method: Method::HEAD };
        assert_eq!(err.to_string(), "a HEAD response must not carry a body");

        let err = ResponseError::StreamUnavailable { path: "/x".into() };
        assert!(err.is_stream_gone());
        assert!(!ResponseError::AlreadySent.is_stream_gone());
    }

    #[test]
    fn test_stream_error_constructors() {
        assert_eq!(StreamError::aborted("idle").to_string(), "stream aborted: idle");
        assert_eq!(
            StreamError::transport("broken pipe").to_string(),
            "transport error: broken pipe"
        );
        assert_eq!(StreamError::Reset { code: 8 }.to_string(), "stream reset with code 8");
    }
}
