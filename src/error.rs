//! Error taxonomy shared by session resolution, ingestion and retrieval.

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Errors surfaced to portal callers.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Report too large: {size_bytes} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size_bytes: u64, limit: u64 },

    #[error("Stored payload could not be decoded: {0}")]
    CorruptPayload(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),
}

impl PortalError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::CorruptPayload(_) => "CORRUPT_PAYLOAD",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Identity(_) => "IDENTITY_ERROR",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::Identity(e) => e.is_retryable(),
            _ => false,
        }
    }
}
