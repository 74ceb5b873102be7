//! Error types for the DDNS updater
//!
//! Construction-time failures (`Config`, `Template`, `Provider`) are returned
//! to the caller. Per-pass failures are logged at the pass boundary and never
//! escalate.

use crate::traits::IpVersion;
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS updater
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template syntax or rendering errors
    #[error("Template error: {0}")]
    Template(String),

    /// Provider definition errors
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Public address lookup errors
    #[error("{version} lookup failed: {message}")]
    AddressLookup {
        /// Address family being resolved
        version: IpVersion,
        /// Error message
        message: String,
    },

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a body outside its accepted set
    #[error("Unexpected response: {body}")]
    UnexpectedResponse {
        /// The observed response body
        body: String,
    },

    /// The operation was interrupted by `Updater::stop`
    #[error("Operation cancelled")]
    Cancelled,

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an address lookup error
    pub fn lookup(version: IpVersion, message: impl Into<String>) -> Self {
        Self::AddressLookup {
            version,
            message: message.into(),
        }
    }

    /// Whether this error belongs to the construction-time class
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Template(_) | Self::Provider { .. } | Self::Toml(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
