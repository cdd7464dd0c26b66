//! Typed configuration for Courier servers.
//!
//! - TOML and JSON configuration files
//! - `.env` files via `dotenvy`
//! - Environment variable overrides
//! - Strict parsing (fails on unknown fields)
//! - Layered loading (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use courier_config::ConfigLoader;
//!
//! # fn main() -> Result<(), courier_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("courier.toml")?
//!     .with_env_prefix("COURIER")
//!     .load()?;
//!
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 443
//! secure = true
//! idle_timeout_secs = 60
//! shutdown_timeout_secs = 30
//! max_concurrent_streams = 256
//!
//! [server.tls]
//! cert = "/etc/courier/cert.pem"
//! key = "/etc/courier/key.pem"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Keys use the format `PREFIX__SECTION__KEY`, for example
//! `COURIER__SERVER__PORT=8443` or `COURIER__SERVER__TLS__CERT=/run/cert.pem`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::CourierConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LoggingSection, ServerSection, TlsSection};
