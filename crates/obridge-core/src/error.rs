//! Error types shared across the bridge.
//!
//! `Error` covers configuration and data-model failures that surface before
//! a request ever reaches the protocol layer (bad config, malformed model
//! data supplied by a test fixture, etc). Protocol-facing failures —
//! the closed failure-kind taxonomy from the spec's error table — live in
//! `obridge_server::error_map` and `obridge_adapter::AdapterError`; this
//! type is their common ancestor for `?`-propagation out of `obridge-core`.

use thiserror::Error;

/// Result type alias for `obridge-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading configuration or validating models.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file parse error: {0}")]
    ConfigParse(String),
}

impl Error {
    /// A stable, machine-readable category for this error, independent of
    /// the human message. Mirrors the `error_type()` convention used by the
    /// protocol-facing error types further up the stack.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) | Self::InvalidField { .. } => "INVALID_CONFIG",
            Self::MissingEnv(_) => "MISSING_ENV",
            Self::Io(_) => "OS_ERROR",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
        }
    }
}
