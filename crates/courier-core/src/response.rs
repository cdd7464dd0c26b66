//! The one-shot response.
//!
//! Every stream gets exactly one [`Response`]. It collects a status, headers
//! and a body source, then transmits them once with [`Response::send`].
//! The `sent` flag flips on the first `send` and never flips back, so a
//! second call fails with [`ResponseError::AlreadySent`] and nothing reaches
//! the wire twice.
//!
//! # Example
//!
//! ```rust
//! use courier_core::fixtures::MockRequest;
//! use http::{Method, StatusCode};
//!
//! # tokio_test::block_on(async {
//! let (request, probe) = MockRequest::new(Method::GET, "/greeting").build();
//! let response = request.response();
//!
//! response.status(StatusCode::CREATED).header("x-greeting", "hi").unwrap();
//! response.send("hello").await.unwrap();
//!
//! assert!(response.is_sent());
//! assert_eq!(probe.status(), Some(StatusCode::CREATED));
//! assert_eq!(probe.body(), "hello");
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;

use crate::cookie::CookieOptions;
use crate::error::{ResponseError, ResponseResult, StreamError};
use crate::lifecycle::StreamTicket;
use crate::payload::{body_stream, BodyStream, Payload};
use crate::transport::ResponseSink;

/// HTTP/2 `INTERNAL_ERROR`, used when a piped body source fails mid-stream.
const INTERNAL_ERROR: u32 = 0x2;

/// Method and location of the request a response answers.
#[derive(Debug, Clone)]
struct RequestMeta {
    method: Method,
    path: String,
    url: String,
}

#[derive(Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    stream: Option<BodyStream>,
}

struct ResponseInner {
    sent: AtomicBool,
    meta: OnceLock<RequestMeta>,
    state: Mutex<ResponseState>,
    sink: Mutex<Option<Box<dyn ResponseSink>>>,
    ticket: StreamTicket,
}

impl Drop for ResponseInner {
    fn drop(&mut self) {
        if !*self.sent.get_mut() {
            let path = self.meta.get().map_or("", |m| m.path.as_str());
            tracing::warn!(path, "response dropped without being sent, resetting stream");
        }
    }
}

/// The response half of a request/response pair.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

enum Outgoing {
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Response {
    /// Binds a response to a stream sink and its lifecycle ticket.
    pub fn new(sink: Box<dyn ResponseSink>, ticket: StreamTicket) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                sent: AtomicBool::new(false),
                meta: OnceLock::new(),
                state: Mutex::new(ResponseState::default()),
                sink: Mutex::new(Some(sink)),
                ticket,
            }),
        }
    }

    /// Records what the response answers. Called once by the request.
    pub(crate) fn set_metadata(&self, method: Method, path: String, url: String) {
        let _ = self.inner.meta.set(RequestMeta { method, path, url });
    }

    /// Method of the request this response answers.
    #[must_use]
    pub fn method(&self) -> Method {
        self.inner
            .meta
            .get()
            .map_or(Method::GET, |meta| meta.method.clone())
    }

    /// Full URL of the request this response answers.
    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.meta.get().map_or("", |meta| meta.url.as_str())
    }

    fn path(&self) -> String {
        self.inner
            .meta
            .get()
            .map_or_else(String::new, |meta| meta.path.clone())
    }

    /// Sets the status code.
    pub fn status(&self, status: StatusCode) -> &Self {
        self.inner.state.lock().status = Some(status);
        self
    }

    /// The status set so far, if any. An unset status is sent as `200`.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.inner.state.lock().status
    }

    /// Sets a header, replacing earlier values with the same name.
    pub fn header(&self, name: &str, value: &str) -> ResponseResult<&Self> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ResponseError::invalid_header(name, e))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ResponseError::invalid_header(name, e))?;
        self.inner.state.lock().headers.insert(header_name, header_value);
        Ok(self)
    }

    /// A copy of the headers set so far.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        self.inner.state.lock().headers.clone()
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&self, name: &str, value: &str, options: &CookieOptions) -> ResponseResult<&Self> {
        let rendered = options.to_header_value(name, value);
        let header_value =
            HeaderValue::from_str(&rendered).map_err(|e| ResponseError::invalid_header(SET_COOKIE.as_str(), e))?;
        self.inner.state.lock().headers.append(SET_COOKIE, header_value);
        Ok(self)
    }

    /// Attaches a streaming body, sent when [`send`](Self::send) is called
    /// without a payload.
    ///
    /// An in-memory payload passed to `send` takes precedence.
    pub fn pipe_stream<S, E>(&self, source: S) -> &Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        self.inner.state.lock().stream = Some(body_stream(source));
        self
    }

    /// Returns true once `send` has been called.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.inner.sent.load(Ordering::Acquire)
    }

    /// Returns false once the underlying stream can no longer carry a
    /// response, either because it closed or because its session ended.
    #[must_use]
    pub fn is_stream_open(&self) -> bool {
        if !self.inner.ticket.is_open() {
            return false;
        }
        self.inner
            .sink
            .lock()
            .as_mut()
            .is_some_and(|sink| sink.is_open())
    }

    /// Transmits the response.
    ///
    /// `payload` may be `()` to send only headers, or the piped stream if one
    /// is attached. Resolves once the stream has closed.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::BodyNotAllowed`] for a body on a `HEAD` request.
    ///   The response stays unsent.
    /// - [`ResponseError::AlreadySent`] on every call after the first.
    /// - [`ResponseError::StreamUnavailable`] if the stream already closed.
    /// - [`ResponseError::Stream`] if the transport fails, the stream is
    ///   reset, or the session ends before the stream closes.
    pub async fn send(&self, payload: impl Into<Payload>) -> ResponseResult<&Self> {
        let payload = payload.into();

        if self.method() == Method::HEAD {
            let has_stream = self.inner.state.lock().stream.is_some();
            if !payload.is_empty() || has_stream {
                return Err(ResponseError::BodyNotAllowed { method: Method::HEAD });
            }
        }

        if self.inner.sent.swap(true, Ordering::AcqRel) {
            return Err(ResponseError::AlreadySent);
        }

        let sink = self.inner.sink.lock().take();
        let Some(mut sink) = sink else {
            return Err(ResponseError::StreamUnavailable { path: self.path() });
        };
        if !self.inner.ticket.is_open() || !sink.is_open() {
            self.inner.ticket.finish();
            return Err(ResponseError::StreamUnavailable { path: self.path() });
        }

        let (head, body) = self.prepare(payload);
        let result = tokio::select! {
            result = transmit(sink.as_mut(), head, body) => result,
            reason = self.inner.ticket.aborted() => Err(StreamError::aborted(reason)),
        };
        self.inner.ticket.finish();

        match result {
            Ok(()) => Ok(self),
            Err(err) => {
                tracing::debug!(path = %self.path(), error = %err, "response transmission failed");
                Err(err.into())
            }
        }
    }

    /// Sends `status` with a plain-text `message`, dropping the message for
    /// `HEAD` requests.
    pub async fn send_status(&self, status: StatusCode, message: impl Into<String>) -> ResponseResult<&Self> {
        self.status(status);
        if self.method() == Method::HEAD {
            self.inner.state.lock().stream = None;
            self.send(()).await
        } else {
            self.send(message.into()).await
        }
    }

    fn prepare(&self, payload: Payload) -> (http::Response<()>, Outgoing) {
        let mut state = self.inner.state.lock();

        let mut head = http::Response::new(());
        *head.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *head.headers_mut() = state.headers.clone();

        if let Some(content_type) = payload.content_type() {
            head.headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type));
        }

        let body = if !payload.is_empty() {
            let bytes = payload.into_bytes();
            head.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Outgoing::Full(bytes)
        } else if let Some(stream) = state.stream.take() {
            Outgoing::Stream(stream)
        } else {
            Outgoing::Empty
        };
        (head, body)
    }
}

async fn transmit(sink: &mut dyn ResponseSink, head: http::Response<()>, body: Outgoing) -> Result<(), StreamError> {
    match body {
        Outgoing::Empty => sink.send_head(head, true)?,
        Outgoing::Full(bytes) => {
            sink.send_head(head, false)?;
            sink.send_data(bytes, true).await?;
        }
        Outgoing::Stream(mut stream) => {
            sink.send_head(head, false)?;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => sink.send_data(chunk, false).await?,
                    Err(err) => {
                        sink.reset(INTERNAL_ERROR);
                        return Err(err);
                    }
                }
            }
            sink.send_data(Bytes::new(), true).await?;
        }
    }
    sink.closed().await
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url())
            .field("status", &self.status_code())
            .field("sent", &self.is_sent())
            .finish_non_exhaustive()
    }
}
