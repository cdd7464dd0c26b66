//! # Courier Server
//!
//! Sessions, the dispatch pipeline and the HTTP/2 listener.
//!
//! - [`Server`] / [`RunningServer`] - listen, track sessions, close
//! - [`Session`] - one connection's ACTIVE → CLOSING → CLOSED lifecycle
//! - [`Dispatcher`] - middleware, routing, handler, one response
//! - [`transport`] - the `h2` binding of the transport traits
//! - [`ShutdownSignal`] - programmatic or OS-signal shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use courier_core::{handler_fn, HandlerError, Request};
//! use courier_server::{Server, TlsSource};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::builder()
//!     .tls(TlsSource::from_paths("cert.pem", "key.pem"))
//!     .build();
//! server.router_mut().get(
//!     "/users/:id",
//!     handler_fn(|req: Request| async move {
//!         Ok::<_, HandlerError>(format!("user {}", req.parameter("id").unwrap_or_default()))
//!     }),
//! )?;
//!
//! let running = server.listen(None).await?;
//! println!("listening on {}", running.local_addr());
//! running.close().await;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/courier-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod dispatcher;
mod error;
mod server;
mod session;
pub mod shutdown;
pub mod tls;
pub mod transport;

pub use config::{
    PemSource, ServerConfig, ServerConfigBuilder, TlsSource, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, RouteMatched};
pub use error::{ServerError, SessionError};
pub use server::{RunningServer, Server, ServerBuilder};
pub use session::{Session, SessionEvent, SessionHandle, SessionState};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
