//! # Veilgroup
//!
//! Confidential group messaging on a shared, append-only ledger.
//!
//! ## Overview
//!
//! Group membership and the existence of messages are public. Message
//! content and each group's shared secret are not: they live in an external
//! encryption service as opaque handles, and the registry only records those
//! handles and who may decrypt them.
//!
//! - **Groups**: dense ids, an immutable name, a creator who is the first
//!   member, and an append-only member list
//! - **Messages**: per-group append-only sequences of sealed envelopes
//! - **Grants**: every member can decrypt the group key and every message of
//!   the group, including those sent before they joined
//! - **Envelopes**: 31-byte texts sealed under the group secret on the
//!   client, see `core::seal` and `core::open`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use veilgroup::{GroupClient, GroupRegistry};
//! use veilgroup::core::Keypair;
//! use veilgroup::fhe::LocalEncryptionService;
//! use veilgroup::store::SqliteLedger;
//!
//! async fn example() {
//!     let ledger = SqliteLedger::open("ledger.db").unwrap();
//!     let service = Arc::new(LocalEncryptionService::new());
//!     let registry = Arc::new(GroupRegistry::with_defaults(ledger, service));
//!
//!     let alice = GroupClient::new(registry.clone(), Keypair::generate());
//!     let bob = GroupClient::new(registry, Keypair::generate());
//!
//!     let group = alice.create_group("Alpha").await.unwrap();
//!     bob.join(group).await.unwrap();
//!
//!     let index = alice.send_text(group, "Hello").await.unwrap();
//!     assert_eq!(bob.read_message(group, index).await.unwrap(), "Hello");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `veilgroup::core` - ids, principals, events and the envelope codec
//! - `veilgroup::store` - ledger storage
//! - `veilgroup::fhe` - the encryption service boundary

pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod mirror;
pub mod registry;

pub use veilgroup_core as core;
pub use veilgroup_fhe as fhe;
pub use veilgroup_store as store;

pub use client::{DecodedMessage, GroupClient};
pub use config::RegistryConfig;
pub use env::{LedgerEnv, ManualLedger, SystemLedger};
pub use error::{ClientError, RegistryError, Result};
pub use mirror::{CatchUpError, MirrorError, RegistryMirror};
pub use registry::{derive_group_secret, GroupRegistry};

pub use veilgroup_core::{GroupId, GroupSecret, Handle, Keypair, LedgerEvent, MessageIndex, Principal};
