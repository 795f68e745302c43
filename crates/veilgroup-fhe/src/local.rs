//! In-process implementation of the encryption service.
//!
//! Ciphertexts are kept sealed at rest under a storage key, each tagged with
//! the set of principals authorized to decrypt it. It has the same
//! authorization semantics as a real co-processor but no homomorphic
//! evaluation.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use veilgroup_core::{derive_hash, ClearWord, Handle, Principal};

use crate::crypto::{CipherKey, SealedBlob, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, ServiceError};
use crate::input::{DecryptAuth, ExternalInput, InputProof};
use crate::service::EncryptionService;

const HANDLE_CONTEXT: &str = "veilgroup local service handle v1";

/// In-process encryption service.
pub struct LocalEncryptionService {
    identity: X25519StaticSecret,
    storage_key: CipherKey,
    inner: RwLock<LocalInner>,
}

#[derive(Default)]
struct LocalInner {
    /// Handles issued so far; mixed into each new handle.
    issued: u64,

    ciphertexts: HashMap<Handle, StoredCiphertext>,
}

struct StoredCiphertext {
    blob: SealedBlob,
    authorized: HashSet<Principal>,
}

impl LocalEncryptionService {
    /// Create a service with fresh random keys.
    pub fn new() -> Self {
        Self::with_keys(X25519StaticSecret::generate(), CipherKey::generate())
    }

    /// Create a service with deterministic keys.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let storage = derive_hash("veilgroup local service storage key v1", &[seed.as_slice()]);
        Self::with_keys(X25519StaticSecret::from_bytes(seed), CipherKey::from_bytes(storage))
    }

    fn with_keys(identity: X25519StaticSecret, storage_key: CipherKey) -> Self {
        Self {
            identity,
            storage_key,
            inner: RwLock::new(LocalInner::default()),
        }
    }

    /// Number of ciphertexts held.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.ciphertexts.len())
    }

    /// Whether the service holds no ciphertexts.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LocalInner>> {
        self.inner
            .read()
            .map_err(|e| ServiceError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LocalInner>> {
        self.inner
            .write()
            .map_err(|e| ServiceError::Unavailable(format!("lock poisoned: {}", e)))
    }

    /// Seal `value` at rest and register it under a new handle.
    fn store(&self, value: &ClearWord) -> Result<Handle> {
        let mut inner = self.write()?;
        inner.issued += 1;

        let handle = Handle::from_bytes(derive_hash(
            HANDLE_CONTEXT,
            &[inner.issued.to_be_bytes().as_slice(), self.identity.public_key().as_bytes().as_slice()],
        ));
        // The handle is the associated data, so a blob moved under another
        // handle no longer opens.
        let blob = self.storage_key.seal(value.as_bytes(), handle.as_bytes())?;

        inner.ciphertexts.insert(
            handle,
            StoredCiphertext {
                blob,
                authorized: HashSet::new(),
            },
        );
        Ok(handle)
    }
}

impl Default for LocalEncryptionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncryptionService for LocalEncryptionService {
    fn input_key(&self) -> X25519PublicKey {
        self.identity.public_key()
    }

    async fn encrypt_value(&self, value: ClearWord) -> Result<Handle> {
        self.store(&value)
    }

    async fn import_ciphertext(
        &self,
        input: &ExternalInput,
        proof: &InputProof,
        submitter: &Principal,
    ) -> Result<Handle> {
        proof.verify(input, submitter)?;
        let value = input.decrypt(&self.identity)?;
        let handle = self.store(&value)?;
        tracing::debug!(%handle, %submitter, "imported external input");
        Ok(handle)
    }

    async fn authorize(&self, handle: &Handle, principal: &Principal) -> Result<()> {
        let mut inner = self.write()?;
        let stored = inner
            .ciphertexts
            .get_mut(handle)
            .ok_or(ServiceError::UnknownHandle(*handle))?;
        stored.authorized.insert(*principal);
        Ok(())
    }

    async fn is_authorized(&self, handle: &Handle, principal: &Principal) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner
            .ciphertexts
            .get(handle)
            .is_some_and(|stored| stored.authorized.contains(principal)))
    }

    async fn decrypt(
        &self,
        handles: &[Handle],
        requester: &Principal,
        auth: &DecryptAuth,
    ) -> Result<HashMap<Handle, ClearWord>> {
        auth.verify(handles, requester)?;

        let inner = self.read()?;
        let mut plaintexts = HashMap::with_capacity(handles.len());
        for handle in handles {
            let stored = inner
                .ciphertexts
                .get(handle)
                .ok_or(ServiceError::UnknownHandle(*handle))?;
            if !stored.authorized.contains(requester) {
                return Err(ServiceError::Unauthorized {
                    handle: *handle,
                    principal: *requester,
                });
            }

            let bytes = self.storage_key.open(&stored.blob, handle.as_bytes())?;
            let word: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                ServiceError::DecryptionError(format!("stored word has {} bytes", bytes.len()))
            })?;
            plaintexts.insert(*handle, ClearWord(word));
        }

        Ok(plaintexts)
    }
}
