//! # Veilgroup Store
//!
//! Ledger storage for the group registry: groups, their member lists and
//! message sequences, the access-control list, and the event log.
//!
//! ## Overview
//!
//! Everything the registry persists goes through the [`LedgerStore`] trait.
//! Reads are plain queries; writes are batched into a [`Transaction`] and
//! applied with [`LedgerStore::commit`], which either applies the whole batch
//! or nothing. [`SqliteLedger`] persists to disk, [`MemoryLedger`] keeps
//! everything in process.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all ledger storage
//! - [`Transaction`] - An ordered batch of [`LedgerOp`]s plus emitted events
//! - [`AccessControlList`] - The monotonic `(handle, principal)` grant set
//! - [`StoreExt`] - The message log as a bare append-only sequence
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veilgroup_core::{GroupId, Handle, Principal};
//! use veilgroup_store::{LedgerStore, SqliteLedger, Transaction};
//!
//! async fn example() {
//!     let ledger = SqliteLedger::open("ledger.db").unwrap();
//!     let creator = Principal::from_bytes([1; 32]);
//!     let key_handle = Handle::from_bytes([2; 32]);
//!
//!     let mut tx = Transaction::new();
//!     tx.create_group(GroupId(0), "alpha", key_handle, creator, 0)
//!         .grant(key_handle, creator);
//!     ledger.commit(tx).await.unwrap();
//! }
//! ```

pub mod acl;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use acl::AccessControlList;
pub use error::{Result, StoreError};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{
    CommitReceipt, GroupRecord, LedgerOp, LedgerStore, MessageRecord, StoreExt, Transaction,
};
