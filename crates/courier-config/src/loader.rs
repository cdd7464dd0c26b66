//! Building a [`CourierConfig`] from presets, files and the environment.
//!
//! Sources are applied in call order, each replacing the previous
//! document. Environment overrides are applied last, by [`ConfigLoader::load`],
//! and then the result is validated.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use courier_telemetry::LogFormat;

use crate::{ConfigError, CourierConfig, TlsSection};

/// Prefix used by [`ConfigLoader::with_env`].
pub const DEFAULT_ENV_PREFIX: &str = "COURIER";

/// Layered configuration builder.
///
/// ```no_run
/// use courier_config::ConfigLoader;
///
/// # fn main() -> Result<(), courier_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_optional_file("courier.toml")?
///     .with_dotenv()?
///     .with_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: CourierConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from [`CourierConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current document with the development preset.
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.server.port, 8080);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CourierConfig::development();
        self
    }

    /// Replaces the current document with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CourierConfig::production();
        self
    }

    /// Replaces the current document with a `.toml` or `.json` file.
    /// Keys the file omits take their defaults; unknown keys are rejected.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::missing(path));
        }

        let Some(format) = Format::from_path(path) else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::read(path, source))?;
        self.config = format.parse(&text)?;
        Ok(self)
    }

    /// [`with_file`](Self::with_file), skipped when `path` does not exist.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replaces the current document with `text` in `format` (`toml` or `json`).
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 8443", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.port, 8443);
    /// ```
    pub fn with_string(mut self, text: &str, format: &str) -> Result<Self, ConfigError> {
        let format = format
            .parse::<Format>()
            .map_err(|()| ConfigError::UnsupportedFormat(format.to_string()))?;
        self.config = format.parse(text)?;
        Ok(self)
    }

    /// Reads overrides named `<PREFIX>__SECTION__KEY` during [`load`](Self::load),
    /// e.g. `COURIER__SERVER__PORT=8443` or `COURIER__SERVER__TLS__CERT=/etc/cert.pem`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// [`with_env_prefix`](Self::with_env_prefix) with [`DEFAULT_ENV_PREFIX`].
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Exports `./.env` into the process environment if it exists.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Err(err) if !err.not_found() => Err(err.into()),
            _ => Ok(self),
        }
    }

    /// Exports the variables in `path` into the process environment.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Applies environment overrides and validates the result.
    pub fn load(mut self) -> Result<CourierConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let head = format!("{prefix}__");
            let mut overrides: Vec<_> = env::vars().filter(|(name, _)| name.starts_with(&head)).collect();
            overrides.sort();
            for (name, value) in &overrides {
                self.apply_override(&name[head.len()..], name, value)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Applies one override. `path` is the variable name without its prefix.
    fn apply_override(&mut self, path: &str, var: &str, value: &str) -> Result<(), ConfigError> {
        let server = &mut self.config.server;
        let logging = &mut self.config.logging;
        let segments: Vec<&str> = path.split("__").collect();

        match segments.as_slice() {
            ["SERVER", "HOST"] => server.host = value.to_string(),
            ["SERVER", "PORT"] => server.port = typed(var, value, "a port number")?,
            ["SERVER", "SECURE"] => server.secure = flag(var, value)?,
            ["SERVER", "TLS", "CERT"] => server.tls.get_or_insert_with(TlsSection::default).cert = value.into(),
            ["SERVER", "TLS", "KEY"] => server.tls.get_or_insert_with(TlsSection::default).key = value.into(),
            ["SERVER", "IDLE_TIMEOUT_SECS"] if value.eq_ignore_ascii_case("none") => server.idle_timeout_secs = None,
            ["SERVER", "IDLE_TIMEOUT_SECS"] => {
                server.idle_timeout_secs = Some(typed(var, value, "seconds or `none`")?);
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => server.shutdown_timeout_secs = typed(var, value, "seconds")?,
            ["SERVER", "MAX_CONCURRENT_STREAMS"] => {
                server.max_concurrent_streams = Some(typed(var, value, "a stream count")?);
            }
            ["LOGGING", "ENABLED"] => logging.enabled = flag(var, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|reason| ConfigError::env_override(var, reason))?;
            }
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = flag(var, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => logging.include_location = flag(var, value)?,
            [section @ .., key] if !section.is_empty() && !key.is_empty() => {
                return Err(ConfigError::unknown_key(
                    section.join(".").to_lowercase(),
                    key.to_lowercase(),
                ));
            }
            _ => return Err(ConfigError::env_override(var, "expected <PREFIX>__SECTION__KEY")),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }

    fn parse(self, text: &str) -> Result<CourierConfig, ConfigError> {
        Ok(match self {
            Self::Toml => toml::from_str(text)?,
            Self::Json => serde_json::from_str(text)?,
        })
    }
}

impl FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("toml") {
            Ok(Self::Toml)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(())
        }
    }
}

fn typed<T: FromStr>(var: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_override(var, format!("expected {expected}")))
}

fn flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_override(var, "expected a boolean")),
    }
}
