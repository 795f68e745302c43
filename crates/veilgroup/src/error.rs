//! Error types for the group registry and client session.

use thiserror::Error;

use veilgroup_core::{CoreError, GroupId, MessageIndex, Principal};
use veilgroup_fhe::ServiceError;
use veilgroup_store::StoreError;

/// Errors returned by [`GroupRegistry`](crate::GroupRegistry) operations.
///
/// Every error except [`GrantsNotMirrored`](RegistryError::GrantsNotMirrored)
/// aborts the operation before anything is committed.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The group id is not below the group count.
    #[error("invalid group: {0}")]
    InvalidGroup(GroupId),

    /// The principal already belongs to the group.
    #[error("{principal} is already a member of group {group_id}")]
    AlreadyMember {
        group_id: GroupId,
        principal: Principal,
    },

    /// The sender does not belong to the group.
    #[error("{principal} is not a member of group {group_id}")]
    NotMember {
        group_id: GroupId,
        principal: Principal,
    },

    /// The message index is not below the group's message count.
    #[error("message {index} out of range for group {group_id} ({count} messages)")]
    IndexOutOfRange {
        group_id: GroupId,
        index: MessageIndex,
        count: u64,
    },

    /// Group names must be non-empty.
    #[error("group name must not be empty")]
    EmptyName,

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Encryption service error, passed through unchanged.
    #[error("encryption service error: {0}")]
    Service(#[from] ServiceError),

    /// The ledger committed the mutation but the encryption service refused
    /// one of its grants. [`GroupRegistry::resync_group`](crate::GroupRegistry::resync_group)
    /// replays them.
    #[error("group {group_id} committed but its grants were not mirrored: {source}")]
    GrantsNotMirrored {
        group_id: GroupId,
        #[source]
        source: ServiceError,
    },

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors returned by [`GroupClient`](crate::GroupClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The registry rejected the request.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The encryption service rejected the request.
    #[error("encryption service error: {0}")]
    Service(#[from] ServiceError),

    /// Sealing or opening an envelope failed.
    #[error("envelope error: {0}")]
    Codec(#[from] CoreError),
}
