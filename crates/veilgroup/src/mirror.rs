//! Observer-side reconstruction of registry state from ledger events.
//!
//! A mirror never talks to the store directly. It folds [`LedgerEvent`]s,
//! applying the same grant propagation the registry does, and rejects any
//! event that does not follow from the state it already holds.

use std::collections::HashSet;

use thiserror::Error;

use veilgroup_core::{GroupId, Handle, LedgerEvent, MessageIndex, Principal};
use veilgroup_fhe::EncryptionService;
use veilgroup_store::{AccessControlList, LedgerStore, MessageRecord};

use crate::env::LedgerEnv;
use crate::error::RegistryError;
use crate::registry::GroupRegistry;

/// An event that does not apply on top of the mirrored state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("expected group {expected}, event creates {found}")]
    UnexpectedGroup { expected: GroupId, found: GroupId },

    #[error("event for unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("{member} joined group {group_id} twice")]
    DuplicateMember { group_id: GroupId, member: Principal },

    #[error("expected message {expected} in group {group_id}, event carries {found}")]
    UnexpectedIndex {
        group_id: GroupId,
        expected: MessageIndex,
        found: MessageIndex,
    },

    #[error("sender {sender} is not a member of group {group_id}")]
    NotMember { group_id: GroupId, sender: Principal },
}

#[derive(Debug, Clone)]
struct MirroredGroup {
    name: String,
    creator: Principal,
    key_handle: Handle,
    members: Vec<Principal>,
    member_set: HashSet<Principal>,
    messages: Vec<MessageRecord>,
}

/// Registry state rebuilt from events.
#[derive(Debug, Clone, Default)]
pub struct RegistryMirror {
    groups: Vec<MirroredGroup>,
    acl: AccessControlList,
    last_seq: u64,
}

impl RegistryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last logged event applied.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), MirrorError> {
        match event {
            LedgerEvent::GroupCreated {
                group_id,
                name,
                creator,
                key_handle,
            } => {
                let expected = GroupId(self.groups.len() as u64);
                if *group_id != expected {
                    return Err(MirrorError::UnexpectedGroup {
                        expected,
                        found: *group_id,
                    });
                }
                self.groups.push(MirroredGroup {
                    name: name.clone(),
                    creator: *creator,
                    key_handle: *key_handle,
                    members: vec![*creator],
                    member_set: HashSet::from([*creator]),
                    messages: Vec::new(),
                });
                self.acl.grant(*key_handle, *creator);
            }
            LedgerEvent::MemberJoined { group_id, member } => {
                let group = group_mut(&mut self.groups, *group_id)?;
                if !group.member_set.insert(*member) {
                    return Err(MirrorError::DuplicateMember {
                        group_id: *group_id,
                        member: *member,
                    });
                }
                group.members.push(*member);

                self.acl.grant(group.key_handle, *member);
                for message in &group.messages {
                    self.acl.grant(message.content_handle, *member);
                }
            }
            LedgerEvent::MessageSent {
                group_id,
                index,
                sender,
                content_handle,
                timestamp,
            } => {
                let group = group_mut(&mut self.groups, *group_id)?;
                let expected = MessageIndex(group.messages.len() as u64);
                if *index != expected {
                    return Err(MirrorError::UnexpectedIndex {
                        group_id: *group_id,
                        expected,
                        found: *index,
                    });
                }
                if !group.member_set.contains(sender) {
                    return Err(MirrorError::NotMember {
                        group_id: *group_id,
                        sender: *sender,
                    });
                }
                group.messages.push(MessageRecord {
                    sender: *sender,
                    content_handle: *content_handle,
                    timestamp: *timestamp,
                });

                for member in &group.members {
                    self.acl.grant(*content_handle, *member);
                }
            }
        }
        Ok(())
    }

    /// Apply an event taken from the event log. Events at or below
    /// [`last_seq`](Self::last_seq) are skipped.
    pub fn apply_logged(&mut self, seq: u64, event: &LedgerEvent) -> Result<(), MirrorError> {
        if seq <= self.last_seq {
            return Ok(());
        }
        self.apply(event)?;
        self.last_seq = seq;
        Ok(())
    }

    /// Pull and apply every event the registry logged since the last one seen.
    ///
    /// Returns the number of events applied.
    pub async fn catch_up<S, E, L>(
        &mut self,
        registry: &GroupRegistry<S, E, L>,
    ) -> Result<usize, CatchUpError>
    where
        S: LedgerStore,
        E: EncryptionService,
        L: LedgerEnv,
    {
        let events = registry.events_since(self.last_seq).await?;
        for (seq, event) in &events {
            self.apply_logged(*seq, event)?;
        }
        Ok(events.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn group_count(&self) -> u64 {
        self.groups.len() as u64
    }

    pub fn name(&self, group_id: GroupId) -> Option<&str> {
        self.group(group_id).map(|g| g.name.as_str())
    }

    pub fn creator(&self, group_id: GroupId) -> Option<Principal> {
        self.group(group_id).map(|g| g.creator)
    }

    pub fn key_handle(&self, group_id: GroupId) -> Option<Handle> {
        self.group(group_id).map(|g| g.key_handle)
    }

    pub fn members(&self, group_id: GroupId) -> Option<&[Principal]> {
        self.group(group_id).map(|g| g.members.as_slice())
    }

    pub fn is_member(&self, group_id: GroupId, principal: &Principal) -> bool {
        self.group(group_id)
            .is_some_and(|g| g.member_set.contains(principal))
    }

    pub fn messages(&self, group_id: GroupId) -> Option<&[MessageRecord]> {
        self.group(group_id).map(|g| g.messages.as_slice())
    }

    pub fn is_granted(&self, handle: &Handle, principal: &Principal) -> bool {
        self.acl.is_granted(handle, principal)
    }

    /// Number of distinct grants.
    pub fn grant_count(&self) -> usize {
        self.acl.len()
    }

    fn group(&self, group_id: GroupId) -> Option<&MirroredGroup> {
        usize::try_from(group_id.0)
            .ok()
            .and_then(|i| self.groups.get(i))
    }
}

fn group_mut(groups: &mut [MirroredGroup], group_id: GroupId) -> Result<&mut MirroredGroup, MirrorError> {
    usize::try_from(group_id.0)
        .ok()
        .and_then(|i| groups.get_mut(i))
        .ok_or(MirrorError::UnknownGroup(group_id))
}

/// Failure while catching up from a registry's event log.
#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("event log does not replay: {0}")]
    Mirror(#[from] MirrorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(b: u8) -> Principal {
        Principal::from_bytes([b; 32])
    }

    fn h(b: u8) -> Handle {
        Handle::from_bytes([b; 32])
    }

    fn created(id: u64, creator: Principal, key: Handle) -> LedgerEvent {
        LedgerEvent::GroupCreated {
            group_id: GroupId(id),
            name: "alpha".into(),
            creator,
            key_handle: key,
        }
    }

    fn sent(id: u64, index: u64, sender: Principal, content: Handle) -> LedgerEvent {
        LedgerEvent::MessageSent {
            group_id: GroupId(id),
            index: MessageIndex(index),
            sender,
            content_handle: content,
            timestamp: 0,
        }
    }

    #[test]
    fn test_grants_propagate_both_ways() {
        let mut mirror = RegistryMirror::new();
        mirror.apply(&created(0, p(1), h(0xaa))).unwrap();
        mirror.apply(&sent(0, 0, p(1), h(1))).unwrap();
        mirror
            .apply(&LedgerEvent::MemberJoined {
                group_id: GroupId(0),
                member: p(2),
            })
            .unwrap();
        mirror.apply(&sent(0, 1, p(2), h(2))).unwrap();

        // Retroactive: p(2) sees the message sent before joining.
        assert!(mirror.is_granted(&h(1), &p(2)));
        // Forward: p(1) sees the message sent after p(2) joined.
        assert!(mirror.is_granted(&h(2), &p(1)));
        assert!(mirror.is_granted(&h(0xaa), &p(2)));
        assert_eq!(mirror.members(GroupId(0)).unwrap(), &[p(1), p(2)]);
        assert_eq!(mirror.grant_count(), 6);
    }

    #[test]
    fn test_rejects_events_out_of_order() {
        let mut mirror = RegistryMirror::new();
        assert_eq!(
            mirror.apply(&created(1, p(1), h(1))),
            Err(MirrorError::UnexpectedGroup {
                expected: GroupId(0),
                found: GroupId(1)
            })
        );
        mirror.apply(&created(0, p(1), h(1))).unwrap();

        assert!(matches!(
            mirror.apply(&sent(0, 1, p(1), h(2))),
            Err(MirrorError::UnexpectedIndex { .. })
        ));
        assert!(matches!(
            mirror.apply(&sent(0, 0, p(9), h(2))),
            Err(MirrorError::NotMember { .. })
        ));
        assert!(matches!(
            mirror.apply(&LedgerEvent::MemberJoined {
                group_id: GroupId(0),
                member: p(1)
            }),
            Err(MirrorError::DuplicateMember { .. })
        ));
        assert!(matches!(
            mirror.apply(&sent(4, 0, p(1), h(2))),
            Err(MirrorError::UnknownGroup(GroupId(4)))
        ));
    }

    #[test]
    fn test_logged_events_apply_once() {
        let mut mirror = RegistryMirror::new();
        mirror.apply_logged(1, &created(0, p(1), h(1))).unwrap();
        mirror.apply_logged(1, &created(0, p(1), h(1))).unwrap();

        assert_eq!(mirror.group_count(), 1);
        assert_eq!(mirror.last_seq(), 1);
    }
}
