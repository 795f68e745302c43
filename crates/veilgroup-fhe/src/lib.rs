//! # Veilgroup Encryption Service
//!
//! The boundary between the group registry and the service that actually
//! holds ciphertexts.
//!
//! ## Overview
//!
//! The registry never encrypts or decrypts anything. It asks an
//! [`EncryptionService`] for opaque [`Handle`](veilgroup_core::Handle)s,
//! records them, and mirrors every access grant into the service with
//! [`EncryptionService::authorize`]. Members later ask the service directly
//! to decrypt the handles they were granted.
//!
//! ## Key Concepts
//!
//! - **ExternalInput**: a word encrypted by a client to the service's X25519 key
//! - **InputProof**: the submitter's signature binding an input to their principal
//! - **DecryptAuth**: the requester's signature over the handles it asks for
//! - **LocalEncryptionService**: an in-process service with the same
//!   authorization semantics, for tests and single-node setups
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veilgroup_core::{ClearWord, Keypair};
//! use veilgroup_fhe::{EncryptionService, ExternalInput, LocalEncryptionService};
//!
//! async fn example() {
//!     let service = LocalEncryptionService::new();
//!     let alice = Keypair::generate();
//!
//!     let (input, proof) =
//!         ExternalInput::encrypt(&ClearWord::from_u64(7), &service.input_key(), &alice).unwrap();
//!     let handle = service
//!         .import_ciphertext(&input, &proof, &alice.principal())
//!         .await
//!         .unwrap();
//!     service.authorize(&handle, &alice.principal()).await.unwrap();
//! }
//! ```

pub mod crypto;
pub mod error;
pub mod input;
pub mod local;
pub mod service;

pub use crypto::{CipherKey, CipherNonce, SealedBlob, X25519PublicKey, X25519StaticSecret};
pub use error::{Result, ServiceError};
pub use input::{DecryptAuth, ExternalInput, InputProof};
pub use local::LocalEncryptionService;
pub use service::EncryptionService;
