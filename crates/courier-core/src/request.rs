//! The request half of a request/response pair.
//!
//! A [`Request`] is an immutable view of one stream's head plus a small
//! amount of mutable state: the parameter map, which middleware and the
//! router write into, and memoised views (query map, parsed URL, parsed
//! `Accept` list) that are computed on first use.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use http::header::{ACCEPT, HOST};
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use url::Url;

use crate::context::RequestId;
use crate::error::StreamError;
use crate::negotiate::{self, MediaRange};
use crate::response::Response;
use crate::transport::RequestBody;

struct RequestInner {
    id: RequestId,
    head: http::request::Parts,
    url: String,
    parameters: Mutex<IndexMap<String, String>>,
    query: OnceLock<IndexMap<String, String>>,
    url_object: OnceLock<Option<Url>>,
    accept: OnceLock<Option<Vec<MediaRange>>>,
    body_source: Mutex<Option<Box<dyn RequestBody>>>,
    body: OnceCell<Bytes>,
    response: Response,
}

/// One inbound request.
///
/// Cloning is cheap; clones share the parameter map and the response.
///
/// # Example
///
/// ```
/// use courier_core::fixtures::MockRequest;
/// use http::Method;
///
/// let (request, _probe) = MockRequest::new(Method::GET, "/search?q=rust&page=2").build();
///
/// assert!(request.is_method("get"));
/// assert_eq!(request.url(), "https://localhost/search?q=rust&page=2");
/// assert_eq!(request.query_parameter("page").as_deref(), Some("2"));
///
/// request.set_parameter("tenant", "acme");
/// assert_eq!(request.parameter("tenant").as_deref(), Some("acme"));
/// ```
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Binds a stream's head and body to its already-created response.
    ///
    /// Records the method and URL on the response.
    pub fn new(head: http::request::Parts, body: Box<dyn RequestBody>, response: Response) -> Self {
        let url = build_url(&head);
        response.set_metadata(head.method.clone(), head.uri.path().to_string(), url.clone());

        Self {
            inner: Arc::new(RequestInner {
                id: RequestId::new(),
                head,
                url,
                parameters: Mutex::new(IndexMap::new()),
                query: OnceLock::new(),
                url_object: OnceLock::new(),
                accept: OnceLock::new(),
                body_source: Mutex::new(Some(body)),
                body: OnceCell::new(),
                response,
            }),
        }
    }

    /// Unique identifier of this request.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.head.method
    }

    /// Compares the method with `expected`, ignoring case.
    #[must_use]
    pub fn is_method(&self, expected: &str) -> bool {
        self.inner.head.method.as_str().eq_ignore_ascii_case(expected)
    }

    /// Path component, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.head.uri.path()
    }

    /// Full URL: `scheme://authority/path?query`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The URL parsed into a [`Url`], or `None` if it does not parse.
    #[must_use]
    pub fn url_object(&self) -> Option<&Url> {
        self.inner
            .url_object
            .get_or_init(|| Url::parse(&self.inner.url).ok())
            .as_ref()
    }

    /// The request URI as received.
    #[must_use]
    pub fn uri(&self) -> &http::Uri {
        &self.inner.head.uri
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.head.headers
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query parameters. A repeated key keeps its last value.
    #[must_use]
    pub fn query(&self) -> &IndexMap<String, String> {
        self.inner.query.get_or_init(|| {
            self.inner
                .head
                .uri
                .query()
                .map(|query| {
                    url::form_urlencoded::parse(query.as_bytes())
                        .into_owned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// One query parameter.
    #[must_use]
    pub fn query_parameter(&self, name: &str) -> Option<String> {
        self.query().get(name).cloned()
    }

    /// Returns true if the query string carries `name`.
    #[must_use]
    pub fn has_query_parameter(&self, name: &str) -> bool {
        self.query().contains_key(name)
    }

    /// A snapshot of all parameters.
    #[must_use]
    pub fn parameters(&self) -> IndexMap<String, String> {
        self.inner.parameters.lock().clone()
    }

    /// One parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.inner.parameters.lock().get(name).cloned()
    }

    /// Returns true if the parameter is set.
    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.inner.parameters.lock().contains_key(name)
    }

    /// Returns true if any parameter is set.
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.inner.parameters.lock().is_empty()
    }

    /// Sets one parameter, replacing an existing value.
    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.parameters.lock().insert(name.into(), value.into());
    }

    /// Merges parameters into the map. Incoming values replace existing ones
    /// with the same name; other existing entries are kept.
    pub fn merge_parameters<I>(&self, parameters: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = self.inner.parameters.lock();
        for (name, value) in parameters {
            map.insert(name, value);
        }
    }

    /// Picks the offered media type the client prefers.
    ///
    /// Returns `None` without an `Accept` header or when nothing matches.
    /// See [`negotiate::accepts`] for the rules.
    #[must_use]
    pub fn accepts<'a>(&self, offered: &[&'a str]) -> Option<&'a str> {
        let ranges = self
            .inner
            .accept
            .get_or_init(|| self.header(ACCEPT.as_str()).map(negotiate::parse_accept));
        negotiate::select(ranges.as_deref()?, offered)
    }

    /// The response bound to this request.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.inner.response
    }

    /// Returns true once the stream can no longer carry a response.
    #[must_use]
    pub fn stream_is_closed(&self) -> bool {
        !self.inner.response.is_stream_open()
    }

    /// Reads the whole request body.
    ///
    /// The body is read once and cached; later calls return the same bytes.
    /// Fails if the body was taken with [`take_body`](Self::take_body).
    pub async fn data(&self) -> Result<Bytes, StreamError> {
        self.inner
            .body
            .get_or_try_init(|| async {
                let source = self.inner.body_source.lock().take();
                let Some(mut source) = source else {
                    return Err(StreamError::Closed);
                };
                let mut buffer = BytesMut::new();
                while let Some(chunk) = source.next_chunk().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            })
            .await
            .cloned()
    }

    /// Takes the body source for incremental reading.
    ///
    /// Returns `None` if the body was already taken or read.
    pub fn take_body(&self) -> Option<Box<dyn RequestBody>> {
        self.inner.body_source.lock().take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("method", &self.inner.head.method)
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

fn build_url(head: &http::request::Parts) -> String {
    let uri = &head.uri;
    let scheme = uri.scheme_str().unwrap_or("http");
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            head.headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{scheme}://{authority}{path}")
}
