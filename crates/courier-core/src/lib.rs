//! # Courier Core
//!
//! Core types for the Courier HTTP/2 dispatch layer.
//!
//! - [`Request`] / [`Response`] - the pair created for every stream
//! - [`Handler`] - type-erased route handler, built with [`handler_fn`]
//! - [`negotiate`] - `Accept` header negotiation
//! - [`transport`] - capabilities consumed from the HTTP/2 transport
//! - [`lifecycle`] - per-session tracking of live pairs
//! - [`fixtures`] - in-memory transport for tests

#![doc(html_root_url = "https://docs.rs/courier-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod cookie;
mod error;
pub mod fixtures;
mod handler;
pub mod lifecycle;
pub mod negotiate;
mod payload;
mod request;
mod response;
pub mod transport;

pub use context::RequestId;
pub use cookie::{CookieOptions, SameSite};
pub use error::{HandlerError, ResponseError, ResponseResult, StreamError};
pub use handler::{handler_fn, Handler, HandlerResult, IntoReply};
pub use lifecycle::{StreamRegistry, StreamState, StreamTicket};
pub use payload::{body_stream, BodyStream, Payload};
pub use request::Request;
pub use response::Response;
pub use transport::BoxFuture;

/// The router specialised to Courier handlers.
pub type Router = courier_router::Router<Handler>;
