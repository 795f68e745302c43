//! Ledger events.
//!
//! Every committed registry mutation emits exactly one event. Events carry
//! enough data for an observer to rebuild groups, members, messages and the
//! access-control list without polling the registry.

use serde::{Deserialize, Serialize};

use crate::crypto::Principal;
use crate::error::CoreError;
use crate::types::{GroupId, Handle, MessageIndex};

/// An event appended to the ledger's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A group was created; the creator is its first member.
    GroupCreated {
        group_id: GroupId,
        name: String,
        creator: Principal,
        key_handle: Handle,
    },

    /// A principal joined a group.
    MemberJoined { group_id: GroupId, member: Principal },

    /// A member appended a message to a group.
    MessageSent {
        group_id: GroupId,
        index: MessageIndex,
        sender: Principal,
        content_handle: Handle,
        timestamp: i64,
    },
}

impl LedgerEvent {
    /// The group this event belongs to.
    pub fn group_id(&self) -> GroupId {
        match self {
            LedgerEvent::GroupCreated { group_id, .. }
            | LedgerEvent::MemberJoined { group_id, .. }
            | LedgerEvent::MessageSent { group_id, .. } => *group_id,
        }
    }

    /// Short name, used as the event-log discriminator and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::GroupCreated { .. } => "group_created",
            LedgerEvent::MemberJoined { .. } => "member_joined",
            LedgerEvent::MessageSent { .. } => "message_sent",
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
