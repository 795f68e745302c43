//! Client-produced inputs and the proofs that accompany them.
//!
//! A client never hands the registry a plaintext. It encrypts a
//! [`ClearWord`] to the service's X25519 key, signs the result, and submits
//! both. The service checks the signature against the submitting principal
//! before importing the ciphertext under a fresh handle.
//!
//! Decrypt requests are authenticated the same way: the requester signs the
//! exact list of handles it asks for.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use veilgroup_core::{derive_hash, ClearWord, Handle, Keypair, Principal, Signature};

use crate::crypto::{CipherNonce, EphemeralKeyPair, SealedBlob, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, ServiceError};

const INPUT_DIGEST_CONTEXT: &str = "veilgroup external input digest v1";
const INPUT_PROOF_CONTEXT: &str = "veilgroup external input proof v1";
const DECRYPT_AUTH_CONTEXT: &str = "veilgroup decrypt request v1";

/// A value encrypted by a client for the encryption service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalInput {
    /// Client's one-shot X25519 public key.
    pub ephemeral_public: X25519PublicKey,

    /// Nonce used for encryption.
    pub nonce: CipherNonce,

    /// The encrypted word, including the authentication tag.
    pub ciphertext: Bytes,
}

impl ExternalInput {
    /// Encrypt `value` to the service key and sign it as `submitter`.
    ///
    /// The proof only verifies for the submitter's own principal, so an input
    /// lifted from another member's transaction cannot be replayed under a
    /// different sender.
    pub fn encrypt(
        value: &ClearWord,
        service_key: &X25519PublicKey,
        submitter: &Keypair,
    ) -> Result<(Self, InputProof)> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let key = ephemeral
            .agree(service_key)
            .derive_key(ephemeral_public.as_bytes());
        let blob = key.seal(value.as_bytes(), b"")?;

        let input = Self {
            ephemeral_public,
            nonce: blob.nonce,
            ciphertext: Bytes::from(blob.ciphertext),
        };
        let proof = InputProof::sign(&input, submitter);
        Ok((input, proof))
    }

    /// Recover the word with the service's identity secret.
    pub fn decrypt(&self, service_secret: &X25519StaticSecret) -> Result<ClearWord> {
        let key = service_secret
            .agree(&self.ephemeral_public)
            .derive_key(self.ephemeral_public.as_bytes());
        let blob = SealedBlob {
            nonce: self.nonce,
            ciphertext: self.ciphertext.to_vec(),
        };
        let bytes = key.open(&blob, b"")?;

        let word: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ServiceError::DecryptionError(format!(
                "invalid word length: expected 32, got {}",
                bytes.len()
            ))
        })?;
        Ok(ClearWord(word))
    }

    /// Hash committing to every field of the input.
    pub fn digest(&self) -> [u8; 32] {
        derive_hash(
            INPUT_DIGEST_CONTEXT,
            &[
                self.ephemeral_public.as_bytes().as_slice(),
                self.nonce.0.as_slice(),
                &self.ciphertext[..],
            ],
        )
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ServiceError::SerializationError(e.to_string()))
    }
}

/// Proof that an [`ExternalInput`] was produced by a given principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof {
    pub signature: Signature,
}

impl InputProof {
    fn message(input: &ExternalInput, submitter: &Principal) -> [u8; 32] {
        derive_hash(
            INPUT_PROOF_CONTEXT,
            &[input.digest().as_slice(), submitter.as_bytes().as_slice()],
        )
    }

    /// Sign `input` as `submitter`.
    pub fn sign(input: &ExternalInput, submitter: &Keypair) -> Self {
        let message = Self::message(input, &submitter.principal());
        Self {
            signature: submitter.sign(&message),
        }
    }

    /// Check the proof against the principal submitting the input.
    pub fn verify(&self, input: &ExternalInput, submitter: &Principal) -> Result<()> {
        let message = Self::message(input, submitter);
        submitter
            .verify(&message, &self.signature)
            .map_err(|e| ServiceError::InvalidProof(e.to_string()))
    }
}

/// A requester's signature over the handles it wants decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptAuth {
    pub signature: Signature,
}

impl DecryptAuth {
    fn message(handles: &[Handle], requester: &Principal) -> [u8; 32] {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(handles.len() + 1);
        parts.push(requester.as_bytes());
        parts.extend(handles.iter().map(|h| h.as_bytes().as_slice()));
        derive_hash(DECRYPT_AUTH_CONTEXT, &parts)
    }

    /// Sign a decrypt request for `handles`.
    pub fn sign(handles: &[Handle], requester: &Keypair) -> Self {
        let message = Self::message(handles, &requester.principal());
        Self {
            signature: requester.sign(&message),
        }
    }

    /// Check the request signature.
    pub fn verify(&self, handles: &[Handle], requester: &Principal) -> Result<()> {
        let message = Self::message(handles, requester);
        requester
            .verify(&message, &self.signature)
            .map_err(|e| ServiceError::InvalidAuthorization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_input_roundtrip() {
        let service = X25519StaticSecret::generate();
        let alice = Keypair::generate();
        let word = ClearWord::from_u64(77);

        let (input, proof) = ExternalInput::encrypt(&word, &service.public_key(), &alice).unwrap();

        proof.verify(&input, &alice.principal()).unwrap();
        assert_eq!(input.decrypt(&service).unwrap(), word);
    }

    #[test]
    fn test_proof_bound_to_submitter() {
        let service = X25519StaticSecret::generate();
        let alice = Keypair::generate();
        let mallory = Keypair::generate();

        let (input, proof) =
            ExternalInput::encrypt(&ClearWord::ZERO, &service.public_key(), &alice).unwrap();

        assert!(matches!(
            proof.verify(&input, &mallory.principal()),
            Err(ServiceError::InvalidProof(_))
        ));
    }

    #[test]
    fn test_tampered_input_fails_proof() {
        let service = X25519StaticSecret::generate();
        let alice = Keypair::generate();
        let (mut input, proof) =
            ExternalInput::encrypt(&ClearWord::ZERO, &service.public_key(), &alice).unwrap();

        let mut bytes = input.ciphertext.to_vec();
        bytes[0] ^= 1;
        input.ciphertext = Bytes::from(bytes);

        assert!(proof.verify(&input, &alice.principal()).is_err());
        assert!(input.decrypt(&service).is_err());
    }

    #[test]
    fn test_wrong_service_cannot_decrypt() {
        let service = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();
        let (input, _) = ExternalInput::encrypt(
            &ClearWord::from_u64(1),
            &service.public_key(),
            &Keypair::generate(),
        )
        .unwrap();

        assert!(input.decrypt(&other).is_err());
    }

    #[test]
    fn test_decrypt_auth_covers_handle_list() {
        let bob = Keypair::generate();
        let handles = [Handle::from_bytes([1; 32]), Handle::from_bytes([2; 32])];
        let auth = DecryptAuth::sign(&handles, &bob);

        auth.verify(&handles, &bob.principal()).unwrap();
        assert!(auth.verify(&handles[..1], &bob.principal()).is_err());
        assert!(auth
            .verify(&handles, &Keypair::generate().principal())
            .is_err());
    }

    #[test]
    fn test_input_serialization() {
        let service = X25519StaticSecret::generate();
        let (input, _) = ExternalInput::encrypt(
            &ClearWord::from_u64(5),
            &service.public_key(),
            &Keypair::generate(),
        )
        .unwrap();

        let recovered = ExternalInput::from_bytes(&input.to_bytes().unwrap()).unwrap();
        assert_eq!(input, recovered);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_bit_flip_is_rejected(
            value in any::<u64>(),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let service = X25519StaticSecret::generate();
            let alice = Keypair::generate();
            let (mut input, proof) = ExternalInput::encrypt(
                &ClearWord::from_u64(value),
                &service.public_key(),
                &alice,
            )
            .unwrap();
            prop_assert_eq!(input.decrypt(&service).unwrap(), ClearWord::from_u64(value));

            let mut bytes = input.ciphertext.to_vec();
            let i = position.index(bytes.len());
            bytes[i] ^= 1 << bit;
            input.ciphertext = Bytes::from(bytes);

            prop_assert!(input.decrypt(&service).is_err());
            prop_assert!(proof.verify(&input, &alice.principal()).is_err());
        }
    }
}
