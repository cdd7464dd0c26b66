//! Server and session error types.

use std::io;

use courier_core::StreamError;
use thiserror::Error;

/// Why a session ended abnormally.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The connection failed while the session was running.
    #[error("session transport failed: {0}")]
    Transport(#[from] StreamError),

    /// TLS or HTTP/2 handshake did not complete.
    #[error("handshake failed: {message}")]
    Handshake {
        /// Underlying failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a handshake error.
    pub fn handshake(err: impl std::fmt::Display) -> Self {
        Self::Handshake {
            message: err.to_string(),
        }
    }
}

/// Errors from starting or running a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Certificate or key material is missing or unusable.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server configuration is inconsistent.
    #[error("invalid server configuration: {0}")]
    Config(String),
}

impl ServerError {
    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::from(StreamError::transport("connection reset"));
        assert!(err.to_string().contains("connection reset"));

        let err = SessionError::handshake("bad preface");
        assert_eq!(err.to_string(), "handshake failed: bad preface");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:443".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("failed to bind 0.0.0.0:443"));
        assert_eq!(ServerError::tls("no key").to_string(), "TLS configuration error: no key");
    }
}
