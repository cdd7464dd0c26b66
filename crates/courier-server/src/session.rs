//! Per-connection session state machine.
//!
//! A [`Session`] wraps one [`TransportSession`] and turns its streams into
//! request/response pairs. It moves through three states:
//!
//! ```text
//! ACTIVE --(GOAWAY | idle timeout | end())--> CLOSING --(transport done)--> CLOSED
//!    \________________________(transport error | terminate())______________/
//! ```
//!
//! While CLOSING, in-flight streams drain and new ones are refused. On
//! entering CLOSED every live pair is aborted through the session's
//! [`StreamRegistry`], and a single [`SessionEvent::Ended`] is emitted.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::transport::{IncomingStream, TransportEvent, TransportSession};
use courier_core::{Request, Response, StreamRegistry};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::error::SessionError;
use crate::transport::REFUSED_STREAM;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting new streams.
    Active,
    /// Draining in-flight streams, refusing new ones.
    Closing,
    /// Gone. Every pair it owned has been aborted.
    Closed,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What a session reports to its owner.
#[derive(Debug)]
pub enum SessionEvent {
    /// A new stream, ready for dispatch.
    Request(Request),
    /// The session closed. Always the last event.
    Ended {
        /// Set when the transport failed.
        error: Option<SessionError>,
    },
}

#[derive(Debug)]
struct Shared {
    id: u64,
    state: AtomicU8,
    registry: Arc<StreamRegistry>,
    end: Notify,
    terminate: Notify,
    peer: Option<SocketAddr>,
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Control and inspection handle for a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Server-assigned session id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Number of request/response pairs still in flight.
    #[must_use]
    pub fn live_streams(&self) -> usize {
        self.shared.registry.len()
    }

    /// Remote address, when known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer
    }

    /// Starts a graceful close: new streams are refused and in-flight ones
    /// drain.
    pub fn end(&self) {
        self.shared.end.notify_one();
    }

    /// Closes the session now, aborting every in-flight pair.
    pub fn terminate(&self) {
        self.shared.terminate.notify_one();
    }
}

/// One transport session and the pairs it owns.
pub struct Session {
    shared: Arc<Shared>,
    transport: Box<dyn TransportSession>,
    idle_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wraps `transport`. Returns the session, its handle and the event
    /// stream. Nothing happens until [`run`](Self::run) is awaited.
    pub fn new(
        id: u64,
        transport: impl TransportSession,
        idle_timeout: Option<Duration>,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id,
            state: AtomicU8::new(SessionState::Active.as_u8()),
            registry: StreamRegistry::new(),
            end: Notify::new(),
            terminate: Notify::new(),
            peer: transport.peer_addr(),
        });
        let session = Self {
            shared: Arc::clone(&shared),
            transport: Box::new(transport),
            idle_timeout,
            events,
        };
        (session, SessionHandle { shared }, receiver)
    }

    /// Drives the session until it closes.
    pub async fn run(mut self) {
        tracing::info!(session_id = self.shared.id, peer_addr = ?self.shared.peer, "session opened");
        let mut deadline = self.idle_timeout.map(|timeout| Instant::now() + timeout);

        let (error, reason) = loop {
            let active = self.shared.state() == SessionState::Active;
            let idle = async move {
                match deadline {
                    Some(at) if active => tokio::time::sleep_until(at).await,
                    _ => std::future::pending().await,
                }
            };

            tokio::select! {
                event = self.transport.accept() => match event {
                    Some(Ok(TransportEvent::Stream(stream))) => {
                        deadline = self.idle_timeout.map(|timeout| Instant::now() + timeout);
                        self.open_stream(stream);
                    }
                    Some(Ok(TransportEvent::GoAway)) => self.begin_closing("peer sent GOAWAY"),
                    Some(Err(err)) => {
                        let error = SessionError::from(err);
                        let reason = error.to_string();
                        break (Some(error), reason);
                    }
                    None => break (None, "session closed".to_string()),
                },
                () = idle => {
                    if self.shared.registry.is_empty() {
                        self.begin_closing("idle timeout");
                    } else {
                        deadline = self.idle_timeout.map(|timeout| Instant::now() + timeout);
                    }
                }
                () = self.shared.end.notified(), if active => self.begin_closing("ended by server"),
                () = self.shared.terminate.notified() => break (None, "session terminated".to_string()),
            }
        };

        self.finish(error, &reason);
    }

    fn open_stream(&mut self, mut stream: IncomingStream) {
        if self.shared.state() != SessionState::Active {
            tracing::debug!(session_id = self.shared.id, "refusing stream on closing session");
            stream.sink.reset(REFUSED_STREAM);
            return;
        }

        let IncomingStream { head, body, sink } = stream;
        let response = Response::new(sink, self.shared.registry.register());
        let request = Request::new(head, body, response);
        tracing::debug!(
            session_id = self.shared.id,
            request_id = %request.id(),
            method = %request.method(),
            path = request.path(),
            "stream opened"
        );

        if self.events.send(SessionEvent::Request(request)).is_err() {
            tracing::debug!(session_id = self.shared.id, "session events dropped, stream discarded");
        }
    }

    fn begin_closing(&mut self, cause: &str) {
        if self.shared.state() != SessionState::Active {
            return;
        }
        tracing::info!(
            session_id = self.shared.id,
            cause,
            live_streams = self.shared.registry.len(),
            "session closing"
        );
        self.shared.set_state(SessionState::Closing);
        self.transport.graceful_shutdown();
    }

    fn finish(self, error: Option<SessionError>, reason: &str) {
        let Self {
            shared,
            transport,
            events,
            ..
        } = self;
        drop(transport);

        shared.set_state(SessionState::Closed);
        let aborted = shared.registry.abort_all(reason);
        match &error {
            Some(err) => tracing::warn!(session_id = shared.id, aborted, error = %err, "session failed"),
            None => tracing::info!(session_id = shared.id, aborted, "session closed"),
        }

        let _ = events.send(SessionEvent::Ended { error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use courier_core::fixtures::{MockBody, MockSink, SinkProbe};
    use courier_core::transport::BoxFuture;
    use courier_core::{ResponseError, StreamError};

    struct ScriptedTransport {
        events: mpsc::UnboundedReceiver<Result<TransportEvent, StreamError>>,
        shutdown_requested: Arc<AtomicBool>,
    }

    impl TransportSession for ScriptedTransport {
        fn accept(&mut self) -> BoxFuture<'_, Option<Result<TransportEvent, StreamError>>> {
            Box::pin(self.events.recv())
        }

        fn graceful_shutdown(&mut self) {
            self.shutdown_requested.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        script: mpsc::UnboundedSender<Result<TransportEvent, StreamError>>,
        shutdown_requested: Arc<AtomicBool>,
        handle: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Harness {
        fn start(idle_timeout: Option<Duration>) -> Self {
            let (script, rx) = mpsc::unbounded_channel();
            let shutdown_requested = Arc::new(AtomicBool::new(false));
            let transport = ScriptedTransport {
                events: rx,
                shutdown_requested: Arc::clone(&shutdown_requested),
            };
            let (session, handle, events) = Session::new(1, transport, idle_timeout);
            tokio::spawn(session.run());
            Self {
                script,
                shutdown_requested,
                handle,
                events,
            }
        }

        fn open(&self, path: &str, hang: bool) -> SinkProbe {
            let (mut sink, probe) = MockSink::new();
            if hang {
                sink = sink.hang_on_close();
            }
            let (head, ()) = http::Request::builder()
                .uri(format!("https://localhost{path}"))
                .body(())
                .unwrap()
                .into_parts();
            let stream = IncomingStream {
                head,
                body: Box::new(MockBody::default()),
                sink: Box::new(sink),
            };
            self.script.send(Ok(TransportEvent::Stream(stream))).unwrap();
            probe
        }

        fn hang_up(&mut self) {
            self.script = mpsc::unbounded_channel().0;
        }

        async fn next_request(&mut self) -> Request {
            match self.events.recv().await {
                Some(SessionEvent::Request(request)) => request,
                other => panic!("expected a request, got {other:?}"),
            }
        }

        async fn ended(&mut self) -> Option<SessionError> {
            loop {
                match self.events.recv().await {
                    Some(SessionEvent::Ended { error }) => return error,
                    Some(SessionEvent::Request(_)) => continue,
                    None => panic!("session ended without an Ended event"),
                }
            }
        }

        async fn wait_for(&self, state: SessionState) {
            for _ in 0..100 {
                if self.handle.state() == state {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("session never reached {state}");
        }
    }

    #[tokio::test]
    async fn test_stream_becomes_request() {
        let mut harness = Harness::start(None);
        harness.open("/users/7?full=1", false);

        let request = harness.next_request().await;
        assert_eq!(request.path(), "/users/7");
        assert_eq!(request.response().url(), "https://localhost/users/7?full=1");
        assert_eq!(harness.handle.live_streams(), 1);
        assert_eq!(harness.handle.state(), SessionState::Active);

        request.response().send("ok").await.unwrap();
        assert_eq!(harness.handle.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_end_refuses_new_streams() {
        let mut harness = Harness::start(None);
        harness.handle.end();
        harness.wait_for(SessionState::Closing).await;
        assert!(harness.shutdown_requested.load(Ordering::SeqCst));

        let probe = harness.open("/late", false);
        harness.hang_up();
        assert!(harness.ended().await.is_none());

        assert_eq!(probe.reset_code(), Some(REFUSED_STREAM));
        assert_eq!(harness.handle.state(), SessionState::Closed);
        assert!(harness.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_goaway_drains_in_flight_streams() {
        let mut harness = Harness::start(None);
        let probe = harness.open("/slow", false);
        let request = harness.next_request().await;

        harness.script.send(Ok(TransportEvent::GoAway)).unwrap();
        harness.wait_for(SessionState::Closing).await;

        request.response().send("done").await.unwrap();
        assert_eq!(probe.body(), "done");
    }

    #[tokio::test]
    async fn test_peer_goaway_over_h2_drains_in_flight_stream() {
        use crate::transport::{test_frames, H2Session};
        use tokio::io::AsyncWriteExt;

        let (mut client, server_io) = tokio::io::duplex(64 * 1024);
        client.write_all(&test_frames::hello_with_get(1)).await.unwrap();
        let transport = H2Session::handshake(server_io, None, None).await.unwrap();
        let (session, handle, mut events) = Session::new(9, transport, None);
        tokio::spawn(session.run());

        let Some(SessionEvent::Request(request)) = events.recv().await else {
            panic!("expected a request");
        };
        assert_eq!(handle.state(), SessionState::Active);

        client.write_all(&test_frames::go_away(1, 0)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.state() != SessionState::Closing {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("peer GOAWAY should move the session to closing");
        assert_eq!(handle.live_streams(), 1);

        request.response().send("bye").await.unwrap();
        drop(request);

        let (headers, body) = test_frames::read_response(&mut client, 1).await;
        assert_eq!(headers.first(), Some(&0x88));
        assert_eq!(body, b"bye");

        let ended = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("session should close once drained");
        assert!(matches!(ended, Some(SessionEvent::Ended { error: None })));
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_transport_error_ends_with_error() {
        let mut harness = Harness::start(None);
        harness
            .script
            .send(Err(StreamError::transport("connection reset by peer")))
            .unwrap();

        let error = harness.ended().await.unwrap();
        assert!(error.to_string().contains("connection reset by peer"));
        assert_eq!(harness.handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_teardown_rejects_every_pending_send() {
        let mut harness = Harness::start(None);
        let mut sends = Vec::new();
        for i in 0..10 {
            harness.open(&format!("/item/{i}"), true);
            let request = harness.next_request().await;
            sends.push(tokio::spawn(async move {
                request.response().send("payload").await.map(|_| ()).unwrap_err()
            }));
        }
        assert_eq!(harness.handle.live_streams(), 10);

        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.script.send(Err(StreamError::transport("broken pipe"))).unwrap();
        assert!(harness.ended().await.is_some());

        for send in sends {
            let err = tokio::time::timeout(Duration::from_secs(1), send)
                .await
                .expect("send should settle")
                .unwrap();
            assert!(matches!(err, ResponseError::Stream(StreamError::Aborted { .. })));
        }
        assert_eq!(harness.handle.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_terminate_closes_immediately() {
        let mut harness = Harness::start(None);
        harness.open("/stuck", true);
        let request = harness.next_request().await;

        harness.handle.terminate();
        assert!(harness.ended().await.is_none());
        assert!(request.stream_is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_closes_quiet_session() {
        let harness = Harness::start(Some(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(61)).await;
        harness.wait_for(SessionState::Closing).await;
        assert!(harness.shutdown_requested.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_waits_for_live_streams() {
        let mut harness = Harness::start(Some(Duration::from_secs(60)));
        harness.open("/long-poll", false);
        let request = harness.next_request().await;

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(harness.handle.state(), SessionState::Active);

        request.response().send(()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        harness.wait_for(SessionState::Closing).await;
    }

    #[test]
    fn test_state_round_trip() {
        for state in [SessionState::Active, SessionState::Closing, SessionState::Closed] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(SessionState::Closing.to_string(), "closing");
    }
}
