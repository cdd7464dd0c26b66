//! Capabilities Courier needs from a multiplexed transport.
//!
//! The dispatch layer never touches frames, flow control or TLS. It sees a
//! session as a source of [`TransportEvent`]s and each stream as a request
//! head, a [`RequestBody`] and a [`ResponseSink`]. `courier-server` binds
//! these traits to the `h2` crate; [`crate::fixtures`] provides in-memory
//! versions for tests.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::StreamError;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write half of one stream.
pub trait ResponseSink: Send + 'static {
    /// Sends the response header block.
    ///
    /// With `end_of_stream` set the stream is finished and no body follows.
    fn send_head(&mut self, head: http::Response<()>, end_of_stream: bool) -> Result<(), StreamError>;

    /// Sends one body chunk, waiting for flow-control capacity as needed.
    fn send_data(&mut self, chunk: Bytes, end_of_stream: bool) -> BoxFuture<'_, Result<(), StreamError>>;

    /// Resolves once the stream has been closed, or fails if it was reset
    /// before finishing.
    fn closed(&mut self) -> BoxFuture<'_, Result<(), StreamError>>;

    /// Resets the stream with an HTTP/2 error code.
    fn reset(&mut self, code: u32);

    /// Returns false once the stream can no longer carry a response.
    fn is_open(&mut self) -> bool;
}

/// Read half of one stream.
pub trait RequestBody: Send + 'static {
    /// Returns the next body chunk, or `None` at end of stream.
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, StreamError>>>;
}

/// An inbound stream: the request head plus both halves.
pub struct IncomingStream {
    /// Method, URI (including scheme and authority) and headers.
    pub head: http::request::Parts,
    /// Request body.
    pub body: Box<dyn RequestBody>,
    /// Where the response goes.
    pub sink: Box<dyn ResponseSink>,
}

impl std::fmt::Debug for IncomingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingStream")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .finish_non_exhaustive()
    }
}

/// Something a session reports.
#[derive(Debug)]
pub enum TransportEvent {
    /// The peer opened a stream.
    Stream(IncomingStream),
    /// The peer announced it will open no more streams.
    GoAway,
}

/// One long-lived multiplexed connection.
pub trait TransportSession: Send + 'static {
    /// Waits for the next event.
    ///
    /// Returns `None` once the session has ended cleanly and an error if the
    /// connection failed. Must be polled continuously for in-flight streams
    /// to make progress.
    fn accept(&mut self) -> BoxFuture<'_, Option<Result<TransportEvent, StreamError>>>;

    /// Asks the peer to stop opening streams while in-flight ones finish.
    fn graceful_shutdown(&mut self);

    /// Remote address, when known.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}
