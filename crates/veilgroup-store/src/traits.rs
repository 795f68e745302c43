//! The ledger store: the abstract interface for registry persistence.
//!
//! Reads are individual queries. Writes go through a single entry point,
//! [`LedgerStore::commit`], which applies a whole [`Transaction`] or nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use veilgroup_core::{GroupId, Handle, LedgerEvent, MessageIndex, Principal};

use crate::error::Result;

/// A group as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Dense sequential id.
    pub id: GroupId,

    /// Display name, immutable after creation.
    pub name: String,

    /// Handle to the encrypted group secret.
    pub key_handle: Handle,

    /// Principal that created the group.
    pub creator: Principal,

    /// Ledger time of creation (Unix ms).
    pub created_at: i64,

    /// Current number of members.
    pub member_count: u64,
}

/// A message as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Member that submitted the message.
    pub sender: Principal,

    /// Handle to the sealed envelope.
    pub content_handle: Handle,

    /// Ledger time of submission (Unix ms).
    pub timestamp: i64,
}

/// One state change inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// Create a group with the creator as its only member.
    ///
    /// `id` must equal the current group count.
    CreateGroup {
        id: GroupId,
        name: String,
        key_handle: Handle,
        creator: Principal,
        created_at: i64,
    },

    /// Append a member. The principal must not already be a member.
    AddMember { group_id: GroupId, member: Principal },

    /// Append a message. `index` must equal the group's message count.
    AppendMessage {
        group_id: GroupId,
        index: MessageIndex,
        record: MessageRecord,
    },

    /// Grant decrypt permission. Idempotent.
    Grant { handle: Handle, principal: Principal },
}

/// A batch of ledger operations and the events they emit.
///
/// Operations apply in order; later operations observe earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<LedgerOp>,
    events: Vec<LedgerEvent>,
}

impl Transaction {
    /// Start an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a group creation.
    pub fn create_group(
        &mut self,
        id: GroupId,
        name: impl Into<String>,
        key_handle: Handle,
        creator: Principal,
        created_at: i64,
    ) -> &mut Self {
        self.ops.push(LedgerOp::CreateGroup {
            id,
            name: name.into(),
            key_handle,
            creator,
            created_at,
        });
        self
    }

    /// Stage a member append.
    pub fn add_member(&mut self, group_id: GroupId, member: Principal) -> &mut Self {
        self.ops.push(LedgerOp::AddMember { group_id, member });
        self
    }

    /// Stage a message append.
    pub fn append_message(
        &mut self,
        group_id: GroupId,
        index: MessageIndex,
        record: MessageRecord,
    ) -> &mut Self {
        self.ops.push(LedgerOp::AppendMessage {
            group_id,
            index,
            record,
        });
        self
    }

    /// Stage a grant.
    pub fn grant(&mut self, handle: Handle, principal: Principal) -> &mut Self {
        self.ops.push(LedgerOp::Grant { handle, principal });
        self
    }

    /// Stage an event for the event log.
    pub fn emit(&mut self, event: LedgerEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    /// Staged operations, in order.
    pub fn ops(&self) -> &[LedgerOp] {
        &self.ops
    }

    /// Staged events, in order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.events.is_empty()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Event-log sequence number of the first event in the transaction
    /// (1-based). Equals `last_event_seq + 1` when no event was staged.
    pub first_event_seq: u64,

    /// Sequence number of the last event in the log after the commit.
    pub last_event_seq: u64,

    /// Grants that did not exist before the commit.
    pub grants_added: usize,
}

/// The LedgerStore trait: async interface for registry persistence.
///
/// # Design Notes
///
/// - **All-or-nothing commits**: a transaction that fails any precondition
///   leaves the store exactly as it was.
/// - **Dense addressing**: groups are `0..group_count()`, messages are
///   `0..message_count(group)`. Backends reject out-of-order appends with
///   [`StoreError::Conflict`](crate::StoreError::Conflict).
/// - **Monotonic ACL**: grants are never removed.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of groups ever created.
    async fn group_count(&self) -> Result<u64>;

    /// Get a group by id.
    async fn get_group(&self, id: GroupId) -> Result<Option<GroupRecord>>;

    /// Members of a group in join order.
    async fn members(&self, id: GroupId) -> Result<Vec<Principal>>;

    /// Whether `principal` is a member of the group.
    async fn is_member(&self, id: GroupId, principal: &Principal) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of messages in a group.
    async fn message_count(&self, id: GroupId) -> Result<u64>;

    /// Get a message by its position.
    async fn get_message(&self, id: GroupId, index: MessageIndex) -> Result<Option<MessageRecord>>;

    /// Content handles of every message in the group, in index order.
    async fn message_handles(&self, id: GroupId) -> Result<Vec<Handle>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Access control
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `principal` holds a grant on `handle`.
    async fn is_granted(&self, handle: &Handle, principal: &Principal) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event log
    // ─────────────────────────────────────────────────────────────────────────

    /// Events with a sequence number greater than `after_seq`, in order.
    async fn events_since(&self, after_seq: u64) -> Result<Vec<(u64, LedgerEvent)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply every operation and append every event of `tx` atomically.
    async fn commit(&self, tx: Transaction) -> Result<CommitReceipt>;
}

/// Extension trait exposing the message store as a plain append-only log.
pub trait StoreExt: LedgerStore {
    /// Append `record` at the end of the group's message sequence and return
    /// its index. No grants or events are written.
    fn append_message(
        &self,
        group_id: GroupId,
        record: MessageRecord,
    ) -> impl std::future::Future<Output = Result<MessageIndex>> + Send;
}

impl<S: LedgerStore + ?Sized> StoreExt for S {
    async fn append_message(&self, group_id: GroupId, record: MessageRecord) -> Result<MessageIndex> {
        let index = MessageIndex(self.message_count(group_id).await?);
        let mut tx = Transaction::new();
        tx.append_message(group_id, index, record);
        self.commit(tx).await?;
        Ok(index)
    }
}
