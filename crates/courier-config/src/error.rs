//! Errors raised while loading or validating configuration.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration source could not be turned into a valid [`CourierConfig`](crate::CourierConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `with_file` was pointed at a path that does not exist.
    #[error("config file {path} does not exist")]
    Missing {
        /// The requested path.
        path: PathBuf,
    },

    /// The file exists but reading it failed.
    #[error("cannot read config file {path}")]
    Read {
        /// The requested path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or a key the schema does not know.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a key the schema does not know.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override addressed a key outside the schema.
    #[error("no config key `{section}.{key}`")]
    UnknownKey {
        /// Section named by the override.
        section: String,
        /// Key named by the override.
        key: String,
    },

    /// A value parsed but failed validation.
    #[error("`{field}` {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("environment override {var}: {reason}")]
    EnvOverride {
        /// The variable name.
        var: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `.env` file could not be loaded.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// Neither TOML nor JSON.
    #[error("unsupported config format `{0}`")]
    UnsupportedFormat(String),
}

impl ConfigError {
    pub(crate) fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unknown_key(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UnknownKey {
            section: section.into(),
            key: key.into(),
        }
    }

    /// Builds a validation failure for `field`.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
