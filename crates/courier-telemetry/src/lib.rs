//! Logging setup for Courier services.
//!
//! Courier libraries only emit `tracing` events; binaries decide where they
//! go by calling [`init_logging`] once at startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig {
//!     format: LogFormat::Compact,
//!     ..LogConfig::production()
//! };
//! init_logging(&config).expect("logging");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
