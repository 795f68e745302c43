//! Key agreement and authenticated encryption for the service boundary.
//!
//! Clients encrypt inputs to the service's X25519 key with an ephemeral
//! keypair; the service keeps every ciphertext sealed at rest under its own
//! ChaCha20-Poly1305 storage key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{Result, ServiceError};

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// The service's long-term X25519 identity.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Agree on a shared secret with a peer.
    pub fn agree(&self, peer: &X25519PublicKey) -> SharedSecret {
        SharedSecret(*self.0.diffie_hellman(&peer.to_dalek()).as_bytes())
    }
}

/// A one-shot client keypair used to encrypt a single input.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Agree on a shared secret; consumes the ephemeral secret.
    pub fn agree(self, peer: &X25519PublicKey) -> SharedSecret {
        SharedSecret(*self.secret.diffie_hellman(&peer.to_dalek()).as_bytes())
    }
}

/// Raw X25519 output. Only ever used to derive a [`CipherKey`].
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Derive an input-encryption key bound to `context`.
    pub fn derive_key(&self, context: &[u8]) -> CipherKey {
        let mut hasher = blake3::Hasher::new_derive_key("veilgroup input encryption v1");
        hasher.update(&self.0);
        hasher.update(context);
        CipherKey(*hasher.finalize().as_bytes())
    }
}

/// A 96-bit ChaCha20-Poly1305 nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherNonce(pub [u8; 12]);

impl CipherNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Ciphertext plus the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    pub nonce: CipherNonce,
    pub ciphertext: Vec<u8>,
}

/// A 256-bit ChaCha20-Poly1305 key.
#[derive(Clone)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedBlob> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ServiceError::EncryptionError(e.to_string()))?;
        let nonce = CipherNonce::generate();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
            .map_err(|e| ServiceError::EncryptionError(e.to_string()))?;
        Ok(SealedBlob { nonce, ciphertext })
    }

    /// Decrypt a blob sealed with the same key and `aad`.
    pub fn open(&self, blob: &SealedBlob, aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ServiceError::DecryptionError(e.to_string()))?;
        cipher
            .decrypt(
                Nonce::from_slice(&blob.nonce.0),
                Payload {
                    msg: &blob.ciphertext,
                    aad,
                },
            )
            .map_err(|e| ServiceError::DecryptionError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_agreement() {
        let service = X25519StaticSecret::generate();
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let client_side = ephemeral.agree(&service.public_key()).derive_key(b"ctx");
        let service_side = service.agree(&ephemeral_public).derive_key(b"ctx");

        let blob = client_side.seal(b"word", b"").unwrap();
        assert_eq!(service_side.open(&blob, b"").unwrap(), b"word");
    }

    #[test]
    fn test_aad_is_bound() {
        let key = CipherKey::generate();
        let blob = key.seal(b"secret", b"handle-a").unwrap();

        assert_eq!(key.open(&blob, b"handle-a").unwrap(), b"secret");
        assert!(key.open(&blob, b"handle-b").is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = CipherKey::generate().seal(b"secret", b"").unwrap();
        assert!(CipherKey::generate().open(&blob, b"").is_err());
    }

    #[test]
    fn test_context_separates_keys() {
        let service = X25519StaticSecret::from_bytes([9; 32]);
        let peer = X25519StaticSecret::from_bytes([3; 32]).public_key();
        let a = service.agree(&peer).derive_key(b"a");
        let b = service.agree(&peer).derive_key(b"b");

        let blob = a.seal(b"x", b"").unwrap();
        assert!(b.open(&blob, b"").is_err());
    }
}
