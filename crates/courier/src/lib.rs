//! # Courier
//!
//! **Request dispatch over HTTP/2 sessions.**
//!
//! Courier accepts many concurrent streams over long-lived HTTP/2 sessions,
//! runs each through a short-circuiting middleware chain, resolves it to a
//! handler and guarantees exactly one response per stream, whatever the
//! handler does and however the session ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_development()
//!         .with_optional_file("courier.toml")?
//!         .load()?;
//!     init_logging(&config.logging.to_log_config())?;
//!
//!     let mut server = courier::server_from_config(&config);
//!     server.register_middleware(RequestLogger::new());
//!     server.router_mut().get(
//!         "/users/:id",
//!         handler_fn(|req: Request| async move {
//!             Ok::<_, HandlerError>(format!("user {}", req.parameter("id").unwrap_or_default()))
//!         }),
//!     )?;
//!
//!     let running = server.listen(None).await?;
//!     running.run_until_shutdown(ShutdownSignal::with_os_signals()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Session ─► Request ─► middleware… ─► Router::resolve ─► handler ─► Response::send
//!                           │                 │               │
//!                       stop / sent          404             500
//! ```

#![doc(html_root_url = "https://docs.rs/courier/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use courier_config as config;
pub use courier_core as core;
pub use courier_middleware as middleware;
pub use courier_router as router;
pub use courier_server as server;
pub use courier_telemetry as telemetry;

use courier_config::CourierConfig;
use courier_server::{Server, ServerConfig};

/// Creates a server from a loaded configuration.
///
/// Routes and middleware still need to be registered.
#[must_use]
pub fn server_from_config(config: &CourierConfig) -> Server {
    Server::new(ServerConfig::from_section(&config.server))
}

/// Common imports.
///
/// ```rust
/// use courier::prelude::*;
///
/// let mut router = Router::new();
/// router
///     .get("/", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("home") }))
///     .unwrap();
/// assert_eq!(router.len(), 1);
/// ```
pub mod prelude {
    pub use courier_config::{ConfigLoader, CourierConfig};
    pub use courier_core::{
        handler_fn, CookieOptions, Handler, HandlerError, HandlerResult, Payload, Request, RequestId, Response,
        ResponseError, Router, SameSite,
    };
    pub use courier_middleware::{Flow, FnMiddleware, Middleware, RequestLogger};
    pub use courier_router::{RouteMethod, RoutingError};
    pub use courier_server::{RunningServer, Server, ServerConfig, ShutdownSignal, TlsSource};
    pub use courier_telemetry::{init_logging, LogConfig, LogFormat};
}
