//! Error taxonomy for every storage tier.

use thiserror::Error;

/// Errors produced by local and remote tiers.
///
/// The manager's facade never hands these to callers; they travel inside
/// receipts and log records so a fallback stays explainable.
#[derive(Debug, Error)]
pub enum StorageFailure {
    /// Keys must be non-empty.
    #[error("storage key must not be empty")]
    InvalidKey,

    /// The remote tier was asked for without endpoint and access key.
    #[error("remote database is not configured")]
    NotConfigured,

    /// The configured endpoint could not be parsed as a URL.
    #[error("invalid remote endpoint '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The access key cannot be sent as an HTTP header value.
    #[error("remote access key contains characters not allowed in a header")]
    InvalidApiKey,

    /// Transport-level failure talking to the remote database.
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote database answered with a non-success status.
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A local store refused a write because it would exceed its quota.
    #[error("quota exceeded writing '{key}': {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageFailure {
    /// Short, stable label used in metric keys.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid_key",
            Self::NotConfigured => "not_configured",
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::InvalidApiKey => "invalid_api_key",
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::QuotaExceeded { .. } => "quota",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_names_key_and_sizes() {
        let err = StorageFailure::QuotaExceeded {
            key: "habits.list".into(),
            needed: 120,
            quota: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("habits.list"));
        assert!(msg.contains("120"));
        assert!(msg.contains("64"));
        assert_eq!(err.label(), "quota");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageFailure = io.into();
        assert!(matches!(err, StorageFailure::Io(_)));
        assert_eq!(err.label(), "io");
    }
}
