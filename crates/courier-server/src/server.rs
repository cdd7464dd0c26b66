//! The listener and its set of active sessions.
//!
//! # Example
//!
//! ```rust,no_run
//! use courier_core::{handler_fn, HandlerError, Request};
//! use courier_server::{Server, ShutdownSignal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::builder().host("127.0.0.1").secure(false).build();
//!     server
//!         .router_mut()
//!         .get("/hello", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("hi") }))?;
//!
//!     let running = server.listen(Some(8080)).await?;
//!     running.run_until_shutdown(ShutdownSignal::with_os_signals()).await;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::Router;
use courier_middleware::{Middleware, MiddlewareChain};
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::{ServerConfig, ServerConfigBuilder, TlsSource};
use crate::dispatcher::{Dispatcher, RouteMatched};
use crate::error::{ServerError, SessionError};
use crate::session::{Session, SessionEvent, SessionHandle};
use crate::shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
use crate::tls;
use crate::transport::H2Session;

/// An HTTP/2 server that has not started listening yet.
///
/// Routes and middleware are registered here; both are frozen once
/// [`listen`](Self::listen) is called.
pub struct Server {
    config: ServerConfig,
    router: Router,
    middleware: MiddlewareChain,
}

impl Server {
    /// Creates a server with an empty router and no middleware.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            middleware: MiddlewareChain::new(),
        }
    }

    /// Creates a server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable access to the router for registering routes.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Replaces the router.
    #[must_use]
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Appends a middleware. Middleware runs in registration order.
    pub fn register_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// The registered middleware.
    #[must_use]
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Binds the listener and starts accepting sessions.
    ///
    /// `port` overrides the configured port; `Some(0)` picks an ephemeral
    /// one. TLS material is loaded here when the server is secure.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] if the server is secure but has no TLS material
    /// - [`ServerError::Tls`] if the material cannot be loaded
    /// - [`ServerError::Bind`] if the address is unavailable
    pub async fn listen(self, port: Option<u16>) -> Result<RunningServer, ServerError> {
        let Self {
            config,
            router,
            middleware,
        } = self;

        let acceptor = if config.secure() {
            let source = config
                .tls()
                .ok_or_else(|| ServerError::Config("a secure server needs a certificate and key".to_string()))?;
            Some(tls::load_acceptor(source).await?)
        } else {
            None
        };

        let port = port.unwrap_or_else(|| config.port());
        let listener = TcpListener::bind((config.host(), port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{port}", config.host()),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            %local_addr,
            secure = acceptor.is_some(),
            routes = router.len(),
            middleware = middleware.len(),
            "server listening"
        );

        let shared = Arc::new(Shared {
            dispatcher: Dispatcher::new(router, middleware),
            sessions: DashMap::new(),
            next_session_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            tracker: ConnectionTracker::new(),
            config,
        });
        let shutdown = ShutdownSignal::new();
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, Arc::clone(&shared), shutdown.clone()));

        Ok(RunningServer {
            local_addr,
            shared,
            shutdown,
            accept_task,
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.router.len())
            .field("middleware", &self.middleware)
            .finish()
    }
}

struct Shared {
    config: ServerConfig,
    dispatcher: Dispatcher,
    sessions: DashMap<u64, SessionHandle>,
    next_session_id: AtomicU64,
    closing: AtomicBool,
    tracker: ConnectionTracker,
}

/// A listening server.
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("sessions", &self.sessions.len())
            .field("connections", &self.tracker.active_connections())
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    /// The bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of sessions currently open.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Handles of the sessions currently open.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.shared.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Subscribes to route-matched notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RouteMatched> {
        self.shared.dispatcher.subscribe()
    }

    /// Closes the server.
    ///
    /// Every active session is ended first, so in-flight streams drain
    /// while new ones are refused. Then the listener stops and `close`
    /// waits up to the shutdown timeout for sessions to finish. Sessions
    /// still open after that are terminated, which aborts their pairs.
    pub async fn close(self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let sessions = self.sessions();
        tracing::info!(sessions = sessions.len(), "closing server");
        for session in &sessions {
            session.end();
        }

        self.shutdown.trigger();
        if let Err(err) = self.accept_task.await {
            tracing::error!(error = %err, "accept loop failed");
        }

        let timeout = self.shared.config.shutdown_timeout();
        if tokio::time::timeout(timeout, self.shared.tracker.drained()).await.is_err() {
            tracing::warn!(
                remaining = self.shared.tracker.active_connections(),
                ?timeout,
                "sessions did not drain in time, terminating"
            );
            for entry in &self.shared.sessions {
                entry.value().terminate();
            }
            let _ = tokio::time::timeout(TERMINATE_GRACE, self.shared.tracker.drained()).await;
        }
        tracing::info!(local_addr = %self.local_addr, "server closed");
    }

    /// Serves until `signal` triggers, then closes.
    pub async fn run_until_shutdown(self, signal: ShutdownSignal) {
        signal.triggered().await;
        self.close().await;
    }
}

const TERMINATE_GRACE: Duration = Duration::from_secs(1);

async fn accept_loop(listener: TcpListener, acceptor: Option<TlsAcceptor>, shared: Arc<Shared>, shutdown: ShutdownSignal) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((tcp, peer)) => {
                    let token = shared.tracker.acquire();
                    tokio::spawn(serve_connection(
                        tcp,
                        peer,
                        acceptor.clone(),
                        Arc::clone(&shared),
                        shutdown.clone(),
                        token,
                    ));
                }
                Err(err) => tracing::warn!(error = %err, "failed to accept connection"),
            },
            () = shutdown.triggered() => break,
        }
    }
    tracing::info!("listener stopped");
}

async fn serve_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    _token: ConnectionToken,
) {
    if let Err(err) = tcp.set_nodelay(true) {
        tracing::debug!(%peer, error = %err, "failed to set TCP_NODELAY");
    }
    let result = match acceptor {
        Some(acceptor) => {
            let tls_stream = tokio::select! {
                result = acceptor.accept(tcp) => result,
                () = shutdown.triggered() => return,
            };
            match tls_stream {
                Ok(stream) => {
                    let alpn = stream.get_ref().1.alpn_protocol();
                    if alpn != Some(tls::ALPN_H2) {
                        tracing::debug!(%peer, "client did not negotiate h2 via ALPN");
                    }
                    run_session(stream, peer, &shared, &shutdown).await
                }
                Err(err) => Err(SessionError::handshake(err)),
            }
        }
        None => run_session(tcp, peer, &shared, &shutdown).await,
    };

    if let Err(err) = result {
        tracing::warn!(%peer, error = %err, "connection ended with an error");
    }
}

async fn run_session<T>(io: T, peer: SocketAddr, shared: &Arc<Shared>, shutdown: &ShutdownSignal) -> Result<(), SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let transport = tokio::select! {
        result = H2Session::handshake(io, Some(peer), shared.config.max_concurrent_streams()) => {
            result.map_err(SessionError::handshake)?
        }
        () = shutdown.triggered() => return Ok(()),
    };

    let id = shared.next_session_id.fetch_add(1, Ordering::Relaxed);
    let (session, handle, mut events) = Session::new(id, transport, shared.config.idle_timeout());
    shared.sessions.insert(id, handle.clone());
    if shared.closing.load(Ordering::SeqCst) {
        handle.end();
    }
    tokio::spawn(session.run());

    let mut outcome = Ok(());
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Request(request) => {
                let dispatcher = shared.dispatcher.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher.dispatch(request).await;
                    tracing::trace!(?outcome, "request dispatched");
                });
            }
            SessionEvent::Ended { error } => {
                if let Some(err) = error {
                    outcome = Err(err);
                }
                break;
            }
        }
    }

    shared.sessions.remove(&id);
    outcome
}

/// Builder for [`Server`].
///
/// # Example
///
/// ```rust
/// use courier_server::Server;
/// use std::time::Duration;
///
/// let server = Server::builder()
///     .host("127.0.0.1")
///     .port(8443)
///     .secure(false)
///     .shutdown_timeout(Duration::from_secs(5))
///     .build();
///
/// assert_eq!(server.config().port(), 8443);
/// ```
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfigBuilder,
    router: Option<Router>,
    middleware: MiddlewareChain,
}

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = ServerConfigBuilder::from(config);
        self
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config = self.config.host(host);
        self
    }

    /// Sets the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.port(port);
        self
    }

    /// Serve plaintext HTTP/2 when false.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.config = self.config.secure(secure);
        self
    }

    /// Sets the TLS material and enables TLS.
    #[must_use]
    pub fn tls(mut self, tls: TlsSource) -> Self {
        self.config = self.config.tls(tls);
        self
    }

    /// Sets the session idle timeout; `None` disables it.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config = self.config.idle_timeout(timeout);
        self
    }

    /// Sets how long `close` waits for sessions to drain.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.shutdown_timeout(timeout);
        self
    }

    /// Limits concurrent streams per session.
    #[must_use]
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config = self.config.max_concurrent_streams(max);
        self
    }

    /// Uses a prepared router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Appends a middleware.
    #[must_use]
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config.build(),
            router: self.router.unwrap_or_default(),
            middleware: self.middleware,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Request;
    use courier_middleware::RequestLogger;

    #[test]
    fn test_builder_collects_settings() {
        let server = Server::builder()
            .host("127.0.0.1")
            .port(9000)
            .secure(false)
            .idle_timeout(None)
            .max_concurrent_streams(32)
            .middleware(RequestLogger::new())
            .build();

        assert_eq!(server.config().host(), "127.0.0.1");
        assert_eq!(server.config().port(), 9000);
        assert!(!server.config().secure());
        assert_eq!(server.config().idle_timeout(), None);
        assert_eq!(server.config().max_concurrent_streams(), Some(32));
        assert_eq!(server.middleware().names(), vec!["request_logger"]);
        assert!(server.router().is_empty());
    }

    #[test]
    fn test_register_middleware_keeps_order() {
        let mut server = Server::new(ServerConfig::default());
        server
            .register_middleware(courier_middleware::FnMiddleware::new("a", |_req: Request| async {}))
            .register_middleware(courier_middleware::FnMiddleware::new("b", |_req: Request| async {}));
        assert_eq!(server.middleware().names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_secure_without_tls_is_rejected() {
        let server = Server::builder().host("127.0.0.1").build();
        let err = server.listen(Some(0)).await.unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let first = Server::builder().host("127.0.0.1").secure(false).build();
        let running = first.listen(Some(0)).await.unwrap();
        let port = running.local_addr().port();

        let second = Server::builder().host("127.0.0.1").secure(false).build();
        let err = second.listen(Some(port)).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { ref addr, .. } if addr == &format!("127.0.0.1:{port}")));

        running.close().await;
    }

    #[tokio::test]
    async fn test_listen_and_close_without_sessions() {
        let server = Server::builder()
            .host("127.0.0.1")
            .secure(false)
            .shutdown_timeout(Duration::from_millis(100))
            .build();
        let running = server.listen(Some(0)).await.unwrap();

        assert_ne!(running.local_addr().port(), 0);
        assert_eq!(running.active_sessions(), 0);

        tokio::time::timeout(Duration::from_secs(5), running.close())
            .await
            .expect("close should finish");
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let server = Server::builder().host("127.0.0.1").secure(false).build();
        let running = server.listen(Some(0)).await.unwrap();
        let signal = ShutdownSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(5), running.run_until_shutdown(signal))
            .await
            .expect("server should stop");
    }
}
