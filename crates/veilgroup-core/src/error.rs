//! Error types for Veilgroup Core.

use thiserror::Error;

/// Errors raised by the pure primitives in this crate.
///
/// Envelope errors are client-side and local: a caller decoding a batch of
/// messages should surface them per message rather than aborting the batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("message too long: {len} bytes exceeds the {max}-byte envelope payload")]
    MessageTooLong { len: usize, max: usize },

    #[error("corrupt envelope: {0}")]
    CorruptEnvelope(String),

    #[error("clear word does not fit in {0} bytes")]
    WordOverflow(usize),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
