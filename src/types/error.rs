use thiserror::Error;

use super::FetchFailure;

/// costroll error types
#[derive(Error, Debug)]
pub enum CostrollError {
    /// Resource-type key could not be decoded
    #[error("malformed resource key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// Invalid selector, settings, or plugin configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Project or service account lookup failed
    #[error("identity lookup failed: {0}")]
    IdentityLookup(String),

    /// Secret listing or secret data lookup failed
    #[error("secret fetch failed: {0}")]
    SecretFetch(String),

    /// Plugin returned an error or could not be reached
    #[error("plugin fetch failed: {0}")]
    PluginFetch(String),

    /// Collection produced nothing but failures
    #[error("collection failed for all {bindings} bindings: {}", summarize(.failures))]
    AllBindingsFailed {
        bindings: u64,
        failures: Vec<FetchFailure>,
    },

    /// Records of one group disagree on currency
    #[error("currency mismatch in group '{group}': expected {expected}, found {found}")]
    CurrencyMismatch {
        group: String,
        expected: String,
        found: String,
    },

    /// Request cancelled by the caller
    #[error("request cancelled")]
    Cancelled,

    /// Request exceeded its overall deadline
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Failed to parse JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache operation failed
    #[error("cache error: {0}")]
    Cache(String),
}

fn summarize(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for costroll
pub type Result<T> = std::result::Result<T, CostrollError>;
