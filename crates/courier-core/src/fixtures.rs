//! In-memory transport pieces for tests.
//!
//! [`MockRequest`] builds a request/response pair whose response goes to a
//! recording sink. The returned [`SinkProbe`] shows what reached the "wire".
//!
//! # Example
//!
//! ```
//! use courier_core::fixtures::MockRequest;
//! use http::Method;
//!
//! let (request, probe) = MockRequest::new(Method::GET, "/users/7?full=1")
//!     .header("accept", "application/json")
//!     .build();
//!
//! assert_eq!(request.path(), "/users/7");
//! assert_eq!(request.query_parameter("full").as_deref(), Some("1"));
//! assert_eq!(probe.head_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderValue, Method, StatusCode};
use parking_lot::Mutex;

use crate::error::StreamError;
use crate::lifecycle::StreamTicket;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{BoxFuture, RequestBody, ResponseSink};

#[derive(Debug, Default)]
struct SinkRecord {
    head: Option<http::Response<()>>,
    head_count: usize,
    body: BytesMut,
    finished: bool,
    reset: Option<u32>,
    closed_by_peer: bool,
}

/// Read access to what a [`MockSink`] received.
#[derive(Debug, Clone, Default)]
pub struct SinkProbe {
    record: Arc<Mutex<SinkRecord>>,
}

impl SinkProbe {
    /// Status of the sent header block.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.record.lock().head.as_ref().map(http::Response::status)
    }

    /// First value of a sent header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.record
            .lock()
            .head
            .as_ref()
            .and_then(|head| head.headers().get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Every value of a sent header.
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<String> {
        self.record
            .lock()
            .head
            .as_ref()
            .map(|head| {
                head.headers()
                    .get_all(name)
                    .iter()
                    .filter_map(|v: &HeaderValue| v.to_str().ok())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Body received so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn body(&self) -> String {
        String::from_utf8_lossy(&self.record.lock().body).into_owned()
    }

    /// How many header blocks were sent.
    #[must_use]
    pub fn head_count(&self) -> usize {
        self.record.lock().head_count
    }

    /// Returns true once end-of-stream was sent.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.record.lock().finished
    }

    /// Reset code, if the stream was reset.
    #[must_use]
    pub fn reset_code(&self) -> Option<u32> {
        self.record.lock().reset
    }

    /// Simulates the peer closing the stream.
    pub fn close_stream(&self) {
        self.record.lock().closed_by_peer = true;
    }
}

/// A [`ResponseSink`] that records everything it is given.
#[derive(Debug, Default)]
pub struct MockSink {
    record: Arc<Mutex<SinkRecord>>,
    hang_on_close: bool,
}

impl MockSink {
    /// Creates a sink and the probe observing it.
    #[must_use]
    pub fn new() -> (Self, SinkProbe) {
        let sink = Self::default();
        let probe = SinkProbe {
            record: Arc::clone(&sink.record),
        };
        (sink, probe)
    }

    /// Makes [`ResponseSink::closed`] wait forever, as a stuck peer would.
    #[must_use]
    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }
}

impl ResponseSink for MockSink {
    fn send_head(&mut self, head: http::Response<()>, end_of_stream: bool) -> Result<(), StreamError> {
        let mut record = self.record.lock();
        if record.closed_by_peer {
            return Err(StreamError::Closed);
        }
        record.head = Some(head);
        record.head_count += 1;
        record.finished = end_of_stream;
        Ok(())
    }

    fn send_data(&mut self, chunk: Bytes, end_of_stream: bool) -> BoxFuture<'_, Result<(), StreamError>> {
        Box::pin(async move {
            let mut record = self.record.lock();
            if record.closed_by_peer {
                return Err(StreamError::Closed);
            }
            record.body.extend_from_slice(&chunk);
            record.finished = end_of_stream;
            Ok(())
        })
    }

    fn closed(&mut self) -> BoxFuture<'_, Result<(), StreamError>> {
        let hang = self.hang_on_close;
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }

    fn reset(&mut self, code: u32) {
        self.record.lock().reset = Some(code);
    }

    fn is_open(&mut self) -> bool {
        let record = self.record.lock();
        !record.closed_by_peer && record.reset.is_none()
    }
}

/// A [`RequestBody`] yielding a fixed list of chunks.
#[derive(Debug, Default)]
pub struct MockBody {
    chunks: VecDeque<Result<Bytes, StreamError>>,
}

impl MockBody {
    /// A body yielding `chunks` in order.
    #[must_use]
    pub fn new(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
        }
    }

    /// A body that fails after its chunks.
    #[must_use]
    pub fn failing_with(mut self, error: StreamError) -> Self {
        self.chunks.push_back(Err(error));
        self
    }
}

impl RequestBody for MockBody {
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, StreamError>>> {
        let next = self.chunks.pop_front();
        Box::pin(async move { next })
    }
}

/// Builder for a request/response pair on an in-memory stream.
#[derive(Debug)]
pub struct MockRequest {
    builder: http::request::Builder,
    body: MockBody,
    ticket: Option<StreamTicket>,
    hang_on_close: bool,
}

impl MockRequest {
    /// Starts a request for `method` and `uri`.
    ///
    /// Paths without a scheme and authority get `https://localhost`.
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        let uri = if uri.starts_with('/') {
            format!("https://localhost{uri}")
        } else {
            uri.to_string()
        };
        Self {
            builder: http::Request::builder().method(method).uri(uri),
            body: MockBody::default(),
            ticket: None,
            hang_on_close: false,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets a single-chunk body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = MockBody::new([body.into()]);
        self
    }

    /// Sets the body source.
    #[must_use]
    pub fn body_source(mut self, body: MockBody) -> Self {
        self.body = body;
        self
    }

    /// Registers the pair with a session's registry instead of a detached ticket.
    #[must_use]
    pub fn ticket(mut self, ticket: StreamTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// Makes the response's stream never report closed.
    #[must_use]
    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    /// Builds the pair. Response first, then the request bound to it.
    ///
    /// # Panics
    ///
    /// Panics if the method, URI or a header is invalid.
    #[must_use]
    pub fn build(self) -> (Request, SinkProbe) {
        let (mut sink, probe) = MockSink::new();
        if self.hang_on_close {
            sink = sink.hang_on_close();
        }
        let ticket = self.ticket.unwrap_or_else(StreamTicket::detached);
        let response = Response::new(Box::new(sink), ticket);

        let (head, ()) = self
            .builder
            .body(())
            .expect("mock request parts must be valid")
            .into_parts();
        let request = Request::new(head, Box::new(self.body), response);
        (request, probe)
    }
}
