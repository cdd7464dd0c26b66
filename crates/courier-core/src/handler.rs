//! Route handlers.
//!
//! A handler receives the matched [`Request`] and either sends the response
//! itself or returns a value for the dispatcher to send. Handlers are stored
//! type-erased as [`Handler`] so the router can hold them side by side.
//!
//! # Example
//!
//! ```rust
//! use courier_core::{handler_fn, HandlerError, Request};
//!
//! // Returns data: the dispatcher sends it.
//! let hello = handler_fn(|_req: Request| async move { Ok::<_, HandlerError>("yeah!") });
//!
//! // Sends by itself and returns nothing.
//! let created = handler_fn(|req: Request| async move {
//!     req.response().status(http::StatusCode::CREATED).send(()).await?;
//!     Ok::<_, HandlerError>(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::HandlerError;
use crate::payload::Payload;
use crate::request::Request;
use crate::transport::BoxFuture;

/// What a handler resolves to: data to send, nothing, or a failure.
pub type HandlerResult = Result<Option<Payload>, HandlerError>;

/// A type-erased handler.
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Values a handler may return.
///
/// `()` and `None` mean "nothing to send"; everything else is sent by the
/// dispatcher unless the handler already sent a response.
pub trait IntoReply {
    /// Converts the value into an optional payload.
    fn into_reply(self) -> Option<Payload>;
}

impl IntoReply for () {
    fn into_reply(self) -> Option<Payload> {
        None
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Option<Payload> {
        match self {
            Payload::Empty => None,
            payload => Some(payload),
        }
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Option<Payload> {
        Some(Payload::from(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Option<Payload> {
        Some(Payload::Text(self))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Option<Payload> {
        Some(Payload::Binary(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Option<Payload> {
        Some(Payload::from(self))
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Option<Payload> {
        Some(Payload::Json(self))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Option<Payload> {
        self.and_then(IntoReply::into_reply)
    }
}

/// Wraps an async function into a [`Handler`].
pub fn handler_fn<F, Fut, R, E>(func: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoReply,
    E: Into<HandlerError>,
{
    Arc::new(move |request: Request| -> BoxFuture<'static, HandlerResult> {
        let fut = func(request);
        Box::pin(async move { fut.await.map(IntoReply::into_reply).map_err(Into::into) })
    })
}
