//! # Veilgroup Core
//!
//! Pure primitives for Veilgroup: identifiers, opaque ciphertext handles,
//! principals, ledger events and the envelope codec.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`GroupId`] / [`MessageIndex`] - dense addresses into the group arena
//! - [`Handle`] - opaque reference to a ciphertext held by the encryption service
//! - [`Principal`] - Ed25519 identity of a creator, member or sender
//! - [`LedgerEvent`] - what every committed mutation emits
//!
//! ## Envelope Codec
//!
//! Messages are sealed into a fixed 32-byte block. See the [`envelope`] module.
//!
//! ```rust
//! use veilgroup_core::{open, seal, GroupSecret};
//!
//! let secret = GroupSecret(42);
//! let sealed = seal("Hello", secret).unwrap();
//! assert_eq!(open(&sealed, secret).unwrap(), "Hello");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod event;
pub mod types;

pub use crypto::{derive_hash, Keypair, Principal, Signature};
pub use envelope::{open, seal, KeyStream, SealedEnvelope, ENVELOPE_WIDTH, MAX_PAYLOAD_LEN};
pub use error::CoreError;
pub use event::LedgerEvent;
pub use types::{ClearWord, GroupId, GroupSecret, Handle, MessageIndex};
