//! Error types for the encryption service.

use thiserror::Error;

use veilgroup_core::{Handle, Principal};

/// Errors returned by an [`EncryptionService`](crate::EncryptionService).
///
/// The registry passes these through to its caller unchanged and never
/// retries on the service's behalf.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requester holds no authorization for the handle.
    #[error("principal {principal} is not authorized for handle {handle}")]
    Unauthorized { handle: Handle, principal: Principal },

    /// The proof attached to an imported ciphertext does not verify.
    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    /// The decrypt request signature does not verify.
    #[error("invalid decrypt authorization: {0}")]
    InvalidAuthorization(String),

    /// The handle was never issued by this service.
    #[error("unknown handle: {0}")]
    UnknownHandle(Handle),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Internal service state is unusable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] veilgroup_core::CoreError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
