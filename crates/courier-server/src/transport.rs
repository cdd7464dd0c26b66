//! Binding of the transport capability traits to the `h2` crate.
//!
//! [`H2Session`] drives one `h2` server connection. Each accepted stream is
//! split into an [`H2RequestBody`] and an [`H2ResponseSink`].
//!
//! `h2` absorbs a peer's GOAWAY: new streams stop arriving but nothing is
//! reported until the in-flight ones finish. The session needs to know
//! earlier, so the read side of the connection passes through a frame
//! scanner that spots GOAWAY frame headers.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use courier_core::transport::{
    BoxFuture, IncomingStream, RequestBody, ResponseSink, TransportEvent, TransportSession,
};
use courier_core::StreamError;
use futures_util::task::noop_waker_ref;
use h2::server::{Connection, SendResponse};
use h2::{Reason, RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// HTTP/2 `REFUSED_STREAM`.
pub const REFUSED_STREAM: u32 = 0x7;

const CLIENT_PREFACE_LEN: usize = 24;
const FRAME_HEADER_LEN: usize = 9;
const FRAME_TYPE_GOAWAY: u8 = 0x7;

/// Follows frame boundaries in the inbound byte stream without buffering
/// payloads.
#[derive(Debug)]
struct FrameScanner {
    preface_left: usize,
    header: [u8; FRAME_HEADER_LEN],
    header_len: usize,
    payload_left: usize,
    go_away: Arc<AtomicBool>,
}

impl FrameScanner {
    fn new(go_away: Arc<AtomicBool>) -> Self {
        Self {
            preface_left: CLIENT_PREFACE_LEN,
            header: [0; FRAME_HEADER_LEN],
            header_len: 0,
            payload_left: 0,
            go_away,
        }
    }

    fn scan(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.preface_left > 0 {
                let n = self.preface_left.min(bytes.len());
                self.preface_left -= n;
                bytes = &bytes[n..];
                continue;
            }
            if self.payload_left > 0 {
                let n = self.payload_left.min(bytes.len());
                self.payload_left -= n;
                bytes = &bytes[n..];
                continue;
            }

            let n = (FRAME_HEADER_LEN - self.header_len).min(bytes.len());
            self.header[self.header_len..self.header_len + n].copy_from_slice(&bytes[..n]);
            self.header_len += n;
            bytes = &bytes[n..];

            if self.header_len == FRAME_HEADER_LEN {
                self.header_len = 0;
                self.payload_left = (usize::from(self.header[0]) << 16)
                    | (usize::from(self.header[1]) << 8)
                    | usize::from(self.header[2]);
                if self.header[3] == FRAME_TYPE_GOAWAY {
                    self.go_away.store(true, Ordering::Release);
                }
            }
        }
    }
}

/// Server-side connection I/O that flags inbound GOAWAY frames.
#[derive(Debug)]
struct FrameWatch<T> {
    io: T,
    scanner: FrameScanner,
}

impl<T> FrameWatch<T> {
    fn new(io: T, go_away: Arc<AtomicBool>) -> Self {
        Self {
            io,
            scanner: FrameScanner::new(go_away),
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FrameWatch<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = buf.filled().len();
        ready!(Pin::new(&mut this.io).poll_read(cx, buf))?;
        this.scanner.scan(&buf.filled()[start..]);
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FrameWatch<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

fn map_h2_error(err: &h2::Error) -> StreamError {
    match err.reason() {
        Some(reason) if !err.is_go_away() => StreamError::Reset { code: reason.into() },
        _ => StreamError::transport(err),
    }
}

/// One server-side HTTP/2 connection.
pub struct H2Session<T> {
    connection: Connection<FrameWatch<T>, Bytes>,
    peer: Option<SocketAddr>,
    go_away: Arc<AtomicBool>,
    go_away_reported: bool,
    done: bool,
}

impl<T> H2Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the HTTP/2 handshake on `io`.
    pub async fn handshake(
        io: T,
        peer: Option<SocketAddr>,
        max_concurrent_streams: Option<u32>,
    ) -> Result<Self, h2::Error> {
        let mut builder = h2::server::Builder::new();
        if let Some(max) = max_concurrent_streams {
            builder.max_concurrent_streams(max);
        }
        let go_away = Arc::new(AtomicBool::new(false));
        let connection = builder.handshake(FrameWatch::new(io, Arc::clone(&go_away))).await?;
        Ok(Self {
            connection,
            peer,
            go_away,
            go_away_reported: false,
            done: false,
        })
    }

    /// Streams queued before the peer's GOAWAY are handed out first; the
    /// GOAWAY itself is reported once, before the end of the session.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<TransportEvent, StreamError>>> {
        match self.connection.poll_accept(cx) {
            Poll::Ready(Some(Ok((request, respond)))) => {
                let (head, body) = request.into_parts();
                Poll::Ready(Some(Ok(TransportEvent::Stream(IncomingStream {
                    head,
                    body: Box::new(H2RequestBody { recv: body }),
                    sink: Box::new(H2ResponseSink::new(respond)),
                }))))
            }
            Poll::Ready(Some(Err(err))) => {
                self.done = true;
                Poll::Ready(Some(Err(StreamError::transport(err))))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(self.take_go_away().then_some(Ok(TransportEvent::GoAway)))
            }
            Poll::Pending if self.take_go_away() => Poll::Ready(Some(Ok(TransportEvent::GoAway))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn take_go_away(&mut self) -> bool {
        if self.go_away_reported || !self.go_away.load(Ordering::Acquire) {
            return false;
        }
        self.go_away_reported = true;
        true
    }
}

impl<T> TransportSession for H2Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn accept(&mut self) -> BoxFuture<'_, Option<Result<TransportEvent, StreamError>>> {
        Box::pin(async move {
            if self.done {
                return None;
            }
            poll_fn(|cx| self.poll_event(cx)).await
        })
    }

    fn graceful_shutdown(&mut self) {
        self.connection.graceful_shutdown();
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// Write half of one `h2` stream.
pub struct H2ResponseSink {
    respond: SendResponse<Bytes>,
    body: Option<SendStream<Bytes>>,
    finished: bool,
    reset: Option<u32>,
}

impl H2ResponseSink {
    fn new(respond: SendResponse<Bytes>) -> Self {
        Self {
            respond,
            body: None,
            finished: false,
            reset: None,
        }
    }

    fn poll_reset(&mut self, cx: &mut Context<'_>) -> Poll<Result<u32, StreamError>> {
        let polled = match self.body.as_mut() {
            Some(body) => body.poll_reset(cx),
            None => self.respond.poll_reset(cx),
        };
        polled.map(|result| match result {
            Ok(reason) => Ok(u32::from(reason)),
            Err(err) => Err(map_h2_error(&err)),
        })
    }

    async fn send_chunk(&mut self, mut chunk: Bytes, end_of_stream: bool) -> Result<(), StreamError> {
        let body = self.body.as_mut().ok_or(StreamError::Closed)?;

        if chunk.is_empty() {
            return body.send_data(chunk, end_of_stream).map_err(|e| map_h2_error(&e));
        }

        while !chunk.is_empty() {
            body.reserve_capacity(chunk.len());
            let granted = match poll_fn(|cx| body.poll_capacity(cx)).await {
                Some(Ok(granted)) => granted,
                Some(Err(err)) => return Err(map_h2_error(&err)),
                None => return Err(StreamError::Closed),
            };
            if granted == 0 {
                continue;
            }
            let part = chunk.split_to(granted.min(chunk.len()));
            body.send_data(part, end_of_stream && chunk.is_empty())
                .map_err(|e| map_h2_error(&e))?;
        }
        Ok(())
    }
}

impl ResponseSink for H2ResponseSink {
    fn send_head(&mut self, head: http::Response<()>, end_of_stream: bool) -> Result<(), StreamError> {
        let body = self
            .respond
            .send_response(head, end_of_stream)
            .map_err(|e| map_h2_error(&e))?;
        if end_of_stream {
            self.finished = true;
        } else {
            self.body = Some(body);
        }
        Ok(())
    }

    fn send_data(&mut self, chunk: Bytes, end_of_stream: bool) -> BoxFuture<'_, Result<(), StreamError>> {
        Box::pin(async move {
            self.send_chunk(chunk, end_of_stream).await?;
            if end_of_stream {
                self.finished = true;
            }
            Ok(())
        })
    }

    fn closed(&mut self) -> BoxFuture<'_, Result<(), StreamError>> {
        Box::pin(async move {
            if self.finished {
                return Ok(());
            }
            let code = poll_fn(|cx| self.poll_reset(cx)).await?;
            Err(StreamError::Reset { code })
        })
    }

    fn reset(&mut self, code: u32) {
        let reason = Reason::from(code);
        match self.body.as_mut() {
            Some(body) => body.send_reset(reason),
            None => self.respond.send_reset(reason),
        }
        self.reset = Some(code);
    }

    fn is_open(&mut self) -> bool {
        if self.finished || self.reset.is_some() {
            return false;
        }
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.poll_reset(&mut cx) {
            Poll::Pending => true,
            Poll::Ready(Ok(code)) => {
                self.reset = Some(code);
                false
            }
            Poll::Ready(Err(_)) => false,
        }
    }
}

/// Read half of one `h2` stream.
pub struct H2RequestBody {
    recv: RecvStream,
}

impl RequestBody for H2RequestBody {
    fn next_chunk(&mut self) -> BoxFuture<'_, Option<Result<Bytes, StreamError>>> {
        Box::pin(async move {
            match self.recv.data().await? {
                Ok(chunk) => {
                    let _ = self.recv.flow_control().release_capacity(chunk.len());
                    Some(Ok(chunk))
                }
                Err(err) => Some(Err(map_h2_error(&err))),
            }
        })
    }
}
