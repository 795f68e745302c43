//! The encryption service interface.
//!
//! The registry depends on this trait only. A deployment plugs in its
//! homomorphic co-processor; tests and local setups use
//! [`LocalEncryptionService`](crate::LocalEncryptionService).

use std::collections::HashMap;

use async_trait::async_trait;

use veilgroup_core::{ClearWord, Handle, Principal};

use crate::crypto::X25519PublicKey;
use crate::error::Result;
use crate::input::{DecryptAuth, ExternalInput, InputProof};

/// An external service that owns ciphertexts and enforces who may decrypt
/// them.
///
/// Every call is a round trip the caller may abandon; an abandoned call
/// produces no handle or plaintext and leaves no partial state behind.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    /// Key clients encrypt their inputs to.
    fn input_key(&self) -> X25519PublicKey;

    /// Encrypt a plaintext word and return its handle.
    async fn encrypt_value(&self, value: ClearWord) -> Result<Handle>;

    /// Import a client-encrypted input after checking its proof against the
    /// submitting principal.
    async fn import_ciphertext(
        &self,
        input: &ExternalInput,
        proof: &InputProof,
        submitter: &Principal,
    ) -> Result<Handle>;

    /// Allow `principal` to decrypt `handle`. Idempotent.
    async fn authorize(&self, handle: &Handle, principal: &Principal) -> Result<()>;

    /// Whether `principal` may decrypt `handle`.
    async fn is_authorized(&self, handle: &Handle, principal: &Principal) -> Result<bool>;

    /// Decrypt `handles` for `requester`.
    ///
    /// Fails as a whole if any handle is not authorized for the requester.
    async fn decrypt(
        &self,
        handles: &[Handle],
        requester: &Principal,
        auth: &DecryptAuth,
    ) -> Result<HashMap<Handle, ClearWord>>;
}
