//! Error types for the provider and storage seams.

use thiserror::Error;

/// Errors surfaced by price providers.
///
/// Transient variants (`Http`, `Status`) are recoverable through cached
/// data or the fallback chain; the rest are hard failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("session not started")]
    NotStarted,

    #[error("session error: {0}")]
    Session(String),

    #[error("blocked by upstream firewall")]
    Blocked,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no provider supports exchange rates")]
    UnsupportedCapability,
}

impl ProviderError {
    /// True when retrying through cache or a fallback provider makes sense.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Http(_) | ProviderError::Status(_))
    }
}

/// Errors from the holdings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("holding not found")]
    NotFound,

    #[error("holding already exists")]
    AlreadyExists,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
