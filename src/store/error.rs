
/// Generic errors for every credential store the core talks to. An implementor may carry its own
/// error type, but it has to be convertible into this one before it reaches the protocol code
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// This kind of errors should be temporal and a release may not contain any of this
    #[error("unknown error")]
    Unknown,

    /// Dedicated to transport errors, the request may succeed if retried
    #[error("connection error")]
    ConnectionReset(Box<dyn std::error::Error + Send + Sync>),

    #[error("element not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    /// The entry was not signed by the private key matching the addressed public key
    #[error("invalid entry signature")]
    InvalidSignature,

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Whether a read that failed with this error is worth repeating
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unknown | StoreError::ConnectionReset(_) | StoreError::Timeout)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Malformed(error.to_string())
    }
}

/// The browser-local storage facility itself is missing, not just the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("local storage unavailable")]
pub struct StorageUnavailable;
