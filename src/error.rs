//! Error types for configuration, price fetching, and exporting.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems with the configuration. Raised before any page is fetched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("price selector '{name}': {reason}")]
    InvalidSelector { name: String, reason: String },

    #[error("item '{item}' references unknown price selector '{selector}'")]
    UnknownSelector { item: String, selector: String },

    #[error("item '{item}' references unknown special tweak '{tweak}'")]
    UnknownTweak { item: String, tweak: String },

    #[error("item '{item}' appears more than once in group '{group}'")]
    DuplicateItem { group: String, item: String },

    #[error("{kind} '{name}' is defined more than once")]
    DuplicateName { kind: &'static str, name: String },

    #[error("item '{item}' has an invalid get_price_delay: {value}")]
    InvalidDelay { item: String, value: f64 },

    #[error("service account key file does not exist: {}", .0.display())]
    MissingKeyFile(PathBuf),
}

/// The price could not be pulled out of a fetched document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("selector '{0}' matched nothing")]
    NoMatch(String),

    #[error("cannot parse '{text}' as a price")]
    Unparseable { text: String },
}

/// One failed attempt at fetching and extracting an item's price.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] wreq::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl FetchError {
    /// Whether another attempt could possibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidHeader { .. })
    }
}

/// Failure while writing to an export destination.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{operation} failed: {message}")]
    Remote { operation: String, message: String },

    #[error("unexpected response from {operation}: {message}")]
    InvalidResponse { operation: String, message: String },
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io { path: path.into(), source }
    }

    pub(crate) fn remote(operation: impl Into<String>, message: impl ToString) -> Self {
        ExportError::Remote { operation: operation.into(), message: message.to_string() }
    }

    pub(crate) fn invalid_response(operation: impl Into<String>, message: impl ToString) -> Self {
        ExportError::InvalidResponse { operation: operation.into(), message: message.to_string() }
    }
}
