//! Response bodies.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::StreamError;

/// A streamed response body, as attached by `Response::pipe_stream`.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Boxes any fallible byte stream into a [`BodyStream`].
pub fn body_stream<S, E>(source: S) -> BodyStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display,
{
    Box::pin(source.map(|chunk| chunk.map_err(StreamError::source_failed)))
}

/// An in-memory response body.
///
/// The variant decides the `content-type` sent when the response has none.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// UTF-8 text, sent as `text/plain; charset=utf-8`.
    Text(String),
    /// Raw bytes, sent as `application/octet-stream`.
    Binary(Bytes),
    /// A JSON document, sent as `application/json`.
    Json(serde_json::Value),
}

impl Payload {
    /// Returns true for [`Payload::Empty`] and for zero-length bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Binary(bytes) => bytes.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Default `content-type` for this payload, if it has a body.
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Binary(_) => Some("application/octet-stream"),
            Self::Json(_) => Some("application/json"),
        }
    }

    /// Serializes the payload into wire bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Text(text) => Bytes::from(text),
            Self::Binary(bytes) => bytes,
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_types() {
        assert_eq!(Payload::Empty.content_type(), None);
        assert_eq!(Payload::from("hi").content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(Payload::from(vec![1_u8]).content_type(), Some("application/octet-stream"));
        assert_eq!(Payload::from(json!({"a": 1})).content_type(), Some("application/json"));
    }

    #[test]
    fn test_emptiness() {
        assert!(Payload::Empty.is_empty());
        assert!(Payload::from(String::new()).is_empty());
        assert!(Payload::from(None::<String>).is_empty());
        assert!(!Payload::from("x").is_empty());
        assert!(!Payload::from(json!(null)).is_empty());
    }

    #[test]
    fn test_json_serializes_compactly() {
        let bytes = Payload::from(json!({"ok": true})).into_bytes();
        assert_eq!(&bytes[..], br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_body_stream_maps_source_errors() {
        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Err("disk gone"),
        ]);
        let mut stream = body_stream(source);

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err, StreamError::source_failed("disk gone"));
    }
}
