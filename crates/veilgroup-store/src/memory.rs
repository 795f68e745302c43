//! In-memory implementation of the LedgerStore trait.
//!
//! Same semantics as SQLite, nothing persisted. Commits apply operations in
//! place under the write lock and keep an undo log; if any operation fails,
//! the log is unwound before the lock is released, so a failed transaction
//! is never observed.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use veilgroup_core::{GroupId, Handle, LedgerEvent, MessageIndex, Principal};

use crate::acl::AccessControlList;
use crate::error::{Result, StoreError};
use crate::traits::{CommitReceipt, GroupRecord, LedgerOp, LedgerStore, MessageRecord, Transaction};

/// In-memory ledger. Thread-safe via RwLock.
pub struct MemoryLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    /// Arena of groups indexed by `GroupId`.
    groups: Vec<GroupSlot>,

    acl: AccessControlList,

    /// Event log; sequence number is position + 1.
    events: Vec<LedgerEvent>,
}

struct GroupSlot {
    id: GroupId,
    name: String,
    key_handle: Handle,
    creator: Principal,
    created_at: i64,
    members: Vec<Principal>,
    member_set: HashSet<Principal>,
    messages: Vec<MessageRecord>,
}

/// Reverses one applied operation.
enum Undo {
    Nothing,
    PopGroup,
    PopMember(GroupId),
    PopMessage(GroupId),
    Ungrant(Handle, Principal),
}

impl GroupSlot {
    fn record(&self) -> GroupRecord {
        GroupRecord {
            id: self.id,
            name: self.name.clone(),
            key_handle: self.key_handle,
            creator: self.creator,
            created_at: self.created_at,
            member_count: self.members.len() as u64,
        }
    }
}

impl LedgerState {
    fn group(&self, id: GroupId) -> Option<&GroupSlot> {
        usize::try_from(id.0).ok().and_then(|i| self.groups.get(i))
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut GroupSlot> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.groups.get_mut(i))
            .ok_or(StoreError::UnknownGroup(id))
    }

    /// Apply one operation, returning how to reverse it. A failing
    /// operation changes nothing.
    fn apply(&mut self, op: &LedgerOp) -> Result<Undo> {
        match op {
            LedgerOp::CreateGroup {
                id,
                name,
                key_handle,
                creator,
                created_at,
            } => {
                if id.0 != self.groups.len() as u64 {
                    return Err(StoreError::Conflict(format!(
                        "group id {} is not the next id {}",
                        id,
                        self.groups.len()
                    )));
                }
                self.groups.push(GroupSlot {
                    id: *id,
                    name: name.clone(),
                    key_handle: *key_handle,
                    creator: *creator,
                    created_at: *created_at,
                    members: vec![*creator],
                    member_set: HashSet::from([*creator]),
                    messages: Vec::new(),
                });
                Ok(Undo::PopGroup)
            }
            LedgerOp::AddMember { group_id, member } => {
                let slot = self.group_mut(*group_id)?;
                if !slot.member_set.insert(*member) {
                    return Err(StoreError::Conflict(format!(
                        "{} is already a member of group {}",
                        member, group_id
                    )));
                }
                slot.members.push(*member);
                Ok(Undo::PopMember(*group_id))
            }
            LedgerOp::AppendMessage {
                group_id,
                index,
                record,
            } => {
                let slot = self.group_mut(*group_id)?;
                if index.0 != slot.messages.len() as u64 {
                    return Err(StoreError::Conflict(format!(
                        "message index {} is not the next index {} of group {}",
                        index,
                        slot.messages.len(),
                        group_id
                    )));
                }
                slot.messages.push(record.clone());
                Ok(Undo::PopMessage(*group_id))
            }
            LedgerOp::Grant { handle, principal } => {
                if self.acl.grant(*handle, *principal) {
                    Ok(Undo::Ungrant(*handle, *principal))
                } else {
                    Ok(Undo::Nothing)
                }
            }
        }
    }

    fn undo(&mut self, entry: Undo) {
        match entry {
            Undo::Nothing => {}
            Undo::PopGroup => {
                self.groups.pop();
            }
            Undo::PopMember(id) => {
                if let Ok(slot) = self.group_mut(id) {
                    if let Some(member) = slot.members.pop() {
                        slot.member_set.remove(&member);
                    }
                }
            }
            Undo::PopMessage(id) => {
                if let Ok(slot) = self.group_mut(id) {
                    slot.messages.pop();
                }
            }
            Undo::Ungrant(handle, principal) => self.acl.rollback_grant(&handle, &principal),
        }
    }
}

impl MemoryLedger {
    /// Create a new empty in-memory ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn group_count(&self) -> Result<u64> {
        Ok(self.read()?.groups.len() as u64)
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<GroupRecord>> {
        Ok(self.read()?.group(id).map(GroupSlot::record))
    }

    async fn members(&self, id: GroupId) -> Result<Vec<Principal>> {
        Ok(self
            .read()?
            .group(id)
            .map(|g| g.members.clone())
            .unwrap_or_default())
    }

    async fn is_member(&self, id: GroupId, principal: &Principal) -> Result<bool> {
        Ok(self
            .read()?
            .group(id)
            .is_some_and(|g| g.member_set.contains(principal)))
    }

    async fn message_count(&self, id: GroupId) -> Result<u64> {
        Ok(self
            .read()?
            .group(id)
            .map_or(0, |g| g.messages.len() as u64))
    }

    async fn get_message(&self, id: GroupId, index: MessageIndex) -> Result<Option<MessageRecord>> {
        let inner = self.read()?;
        Ok(inner.group(id).and_then(|g| {
            usize::try_from(index.0)
                .ok()
                .and_then(|i| g.messages.get(i))
                .cloned()
        }))
    }

    async fn message_handles(&self, id: GroupId) -> Result<Vec<Handle>> {
        Ok(self
            .read()?
            .group(id)
            .map(|g| g.messages.iter().map(|m| m.content_handle).collect())
            .unwrap_or_default())
    }

    async fn is_granted(&self, handle: &Handle, principal: &Principal) -> Result<bool> {
        Ok(self.read()?.acl.is_granted(handle, principal))
    }

    async fn events_since(&self, after_seq: u64) -> Result<Vec<(u64, LedgerEvent)>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u64 + 1, e.clone()))
            .filter(|(seq, _)| *seq > after_seq)
            .collect())
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitReceipt> {
        let mut inner = self.write()?;

        let mut undo_log = Vec::with_capacity(tx.ops().len());
        for op in tx.ops() {
            match inner.apply(op) {
                Ok(entry) => undo_log.push(entry),
                Err(e) => {
                    while let Some(entry) = undo_log.pop() {
                        inner.undo(entry);
                    }
                    return Err(e);
                }
            }
        }
        let grants_added = undo_log
            .iter()
            .filter(|entry| matches!(entry, Undo::Ungrant(..)))
            .count();

        let first_event_seq = inner.events.len() as u64 + 1;
        inner.events.extend(tx.events().iter().cloned());
        let last_event_seq = inner.events.len() as u64;

        Ok(CommitReceipt {
            first_event_seq,
            last_event_seq,
            grants_added,
        })
    }
}
