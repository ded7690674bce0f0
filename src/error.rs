use serde::{Deserialize, Serialize};

use crate::store::{StorageUnavailable, StoreError};

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Everything that can go wrong while a skapp connects to the provider. Store and popup failures
/// are translated into one of these before they reach the host skapp.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Local persistent storage is missing. Callers degrade instead of failing
    #[error("local storage unavailable")]
    StorageUnavailable,

    #[error("identity not found for given seed")]
    IdentityNotFound,

    #[error("permission was denied")]
    PermissionDenied,

    /// The popup went away before the user chose anything, this is not a denial
    #[error("window closed without answer")]
    WindowClosedWithoutAnswer,

    #[error("popup did not answer in time")]
    PopupTimeout,

    #[error("popup could not be opened: {0}")]
    PopupBlocked(String),

    #[error("unsupported method for this provider interface: '{0}'")]
    UnsupportedMethod(String),

    /// The interface descriptor names a method the provider does not implement. This is a bug in
    /// the provider, not something a skapp can cause
    #[error("unimplemented interface method: '{0}'")]
    UnimplementedMethod(String),

    #[error("provider not connected, cannot access interface")]
    NotConnected,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StorageUnavailable> for ProviderError {
    fn from(_: StorageUnavailable) -> Self {
        ProviderError::StorageUnavailable
    }
}

/// Wire tag for an error, the only error shape that crosses a window boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    StorageUnavailable,
    IdentityNotFound,
    PermissionDenied,
    WindowClosedWithoutAnswer,
    PopupTimeout,
    PopupBlocked,
    UnsupportedMethod,
    UnimplementedMethod,
    NotConnected,
    Validation,
    MissingParameter,
    Store,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(ErrorKind::MissingParameter, format!("Parameter '{name}' not found"))
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind == ErrorKind::PermissionDenied
    }
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::StorageUnavailable => ErrorKind::StorageUnavailable,
            ProviderError::IdentityNotFound => ErrorKind::IdentityNotFound,
            ProviderError::PermissionDenied => ErrorKind::PermissionDenied,
            ProviderError::WindowClosedWithoutAnswer => ErrorKind::WindowClosedWithoutAnswer,
            ProviderError::PopupTimeout => ErrorKind::PopupTimeout,
            ProviderError::PopupBlocked(_) => ErrorKind::PopupBlocked,
            ProviderError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            ProviderError::UnimplementedMethod(_) => ErrorKind::UnimplementedMethod,
            ProviderError::NotConnected => ErrorKind::NotConnected,
            ProviderError::Validation(_) => ErrorKind::Validation,
            ProviderError::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<&ProviderError> for ErrorPayload {
    fn from(error: &ProviderError) -> Self {
        ErrorPayload::new(error.kind(), error.to_string())
    }
}

impl From<ProviderError> for ErrorPayload {
    fn from(error: ProviderError) -> Self {
        ErrorPayload::from(&error)
    }
}

/// Rebuilds an error reported by a popup. Kinds that only make sense on the provider side collapse
/// into a validation error carrying the popup's message
impl From<ErrorPayload> for ProviderError {
    fn from(payload: ErrorPayload) -> Self {
        match payload.kind {
            ErrorKind::StorageUnavailable => ProviderError::StorageUnavailable,
            ErrorKind::IdentityNotFound => ProviderError::IdentityNotFound,
            ErrorKind::PermissionDenied => ProviderError::PermissionDenied,
            ErrorKind::WindowClosedWithoutAnswer => ProviderError::WindowClosedWithoutAnswer,
            ErrorKind::PopupTimeout => ProviderError::PopupTimeout,
            ErrorKind::PopupBlocked => ProviderError::PopupBlocked(payload.message),
            ErrorKind::NotConnected => ProviderError::NotConnected,
            _ => ProviderError::Validation(payload.message),
        }
    }
}
