//! SQLite implementation of the LedgerStore trait.
//!
//! This is the persistent backend for the group registry. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking. Each
//! commit runs inside one SQLite transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use veilgroup_core::{GroupId, Handle, LedgerEvent, MessageIndex, Principal};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CommitReceipt, GroupRecord, LedgerOp, LedgerStore, MessageRecord, Transaction};

/// SQLite-based ledger implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn blob32(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<[u8; 32]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, "32-byte blob".into(), rusqlite::types::Type::Blob)
    })
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: GroupId(row.get::<_, i64>(0)? as u64),
        name: row.get(1)?,
        key_handle: Handle::from_bytes(blob32(row, 2)?),
        creator: Principal::from_bytes(blob32(row, 3)?),
        created_at: row.get(4)?,
        member_count: row.get::<_, i64>(5)? as u64,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        sender: Principal::from_bytes(blob32(row, 0)?),
        content_handle: Handle::from_bytes(blob32(row, 1)?),
        timestamp: row.get(2)?,
    })
}

fn count(conn: &Connection, sql: &str, group_id: GroupId) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params![group_id.0 as i64], |row| row.get(0))?;
    Ok(n as u64)
}

fn group_exists(conn: &Connection, group_id: GroupId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM groups WHERE group_id = ?1",
            params![group_id.0 as i64],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Apply one operation inside an open transaction, returning whether it
/// added a new grant.
fn apply_op(conn: &Connection, op: &LedgerOp) -> Result<bool> {
    match op {
        LedgerOp::CreateGroup {
            id,
            name,
            key_handle,
            creator,
            created_at,
        } => {
            let next: i64 = conn.query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))?;
            if id.0 != next as u64 {
                return Err(StoreError::Conflict(format!(
                    "group id {} is not the next id {}",
                    id, next
                )));
            }
            conn.execute(
                "INSERT INTO groups (group_id, name, key_handle, creator, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.0 as i64,
                    name,
                    key_handle.as_bytes().as_slice(),
                    creator.as_bytes().as_slice(),
                    created_at,
                ],
            )?;
            conn.execute(
                "INSERT INTO members (group_id, position, principal) VALUES (?1, 0, ?2)",
                params![id.0 as i64, creator.as_bytes().as_slice()],
            )?;
            Ok(false)
        }
        LedgerOp::AddMember { group_id, member } => {
            if !group_exists(conn, *group_id)? {
                return Err(StoreError::UnknownGroup(*group_id));
            }
            let present = conn
                .query_row(
                    "SELECT 1 FROM members WHERE group_id = ?1 AND principal = ?2",
                    params![group_id.0 as i64, member.as_bytes().as_slice()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if present {
                return Err(StoreError::Conflict(format!(
                    "{} is already a member of group {}",
                    member, group_id
                )));
            }
            let position = count(conn, "SELECT COUNT(*) FROM members WHERE group_id = ?1", *group_id)?;
            conn.execute(
                "INSERT INTO members (group_id, position, principal) VALUES (?1, ?2, ?3)",
                params![group_id.0 as i64, position as i64, member.as_bytes().as_slice()],
            )?;
            Ok(false)
        }
        LedgerOp::AppendMessage {
            group_id,
            index,
            record,
        } => {
            if !group_exists(conn, *group_id)? {
                return Err(StoreError::UnknownGroup(*group_id));
            }
            let next = count(conn, "SELECT COUNT(*) FROM messages WHERE group_id = ?1", *group_id)?;
            if index.0 != next {
                return Err(StoreError::Conflict(format!(
                    "message index {} is not the next index {} of group {}",
                    index, next, group_id
                )));
            }
            conn.execute(
                "INSERT INTO messages (group_id, idx, sender, content_handle, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    group_id.0 as i64,
                    index.0 as i64,
                    record.sender.as_bytes().as_slice(),
                    record.content_handle.as_bytes().as_slice(),
                    record.timestamp,
                ],
            )?;
            Ok(false)
        }
        LedgerOp::Grant { handle, principal } => {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO acl (handle, principal) VALUES (?1, ?2)",
                params![handle.as_bytes().as_slice(), principal.as_bytes().as_slice()],
            )?;
            Ok(changed == 1)
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn group_count(&self) -> Result<u64> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<GroupRecord>> {
        self.run(move |conn| {
            conn.query_row(
                "SELECT g.group_id, g.name, g.key_handle, g.creator, g.created_at,
                        (SELECT COUNT(*) FROM members m WHERE m.group_id = g.group_id)
                 FROM groups g WHERE g.group_id = ?1",
                params![id.0 as i64],
                row_to_group,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn members(&self, id: GroupId) -> Result<Vec<Principal>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT principal FROM members WHERE group_id = ?1 ORDER BY position ASC",
            )?;
            let members = stmt
                .query_map(params![id.0 as i64], |row| Ok(Principal::from_bytes(blob32(row, 0)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
    }

    async fn is_member(&self, id: GroupId, principal: &Principal) -> Result<bool> {
        let principal = *principal;
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM members WHERE group_id = ?1 AND principal = ?2",
                    params![id.0 as i64, principal.as_bytes().as_slice()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    async fn message_count(&self, id: GroupId) -> Result<u64> {
        self.run(move |conn| count(conn, "SELECT COUNT(*) FROM messages WHERE group_id = ?1", id))
            .await
    }

    async fn get_message(&self, id: GroupId, index: MessageIndex) -> Result<Option<MessageRecord>> {
        // Indices past i64::MAX cannot have been written.
        let Ok(idx) = i64::try_from(index.0) else {
            return Ok(None);
        };
        self.run(move |conn| {
            conn.query_row(
                "SELECT sender, content_handle, timestamp
                 FROM messages WHERE group_id = ?1 AND idx = ?2",
                params![id.0 as i64, idx],
                row_to_message,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn message_handles(&self, id: GroupId) -> Result<Vec<Handle>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT content_handle FROM messages WHERE group_id = ?1 ORDER BY idx ASC",
            )?;
            let handles = stmt
                .query_map(params![id.0 as i64], |row| Ok(Handle::from_bytes(blob32(row, 0)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(handles)
        })
        .await
    }

    async fn is_granted(&self, handle: &Handle, principal: &Principal) -> Result<bool> {
        let (handle, principal) = (*handle, *principal);
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM acl WHERE handle = ?1 AND principal = ?2",
                    params![handle.as_bytes().as_slice(), principal.as_bytes().as_slice()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    async fn events_since(&self, after_seq: u64) -> Result<Vec<(u64, LedgerEvent)>> {
        let after = i64::try_from(after_seq).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT seq, body FROM events WHERE seq > ?1 ORDER BY seq ASC")?;
            let rows = stmt
                .query_map(params![after], |row| {
                    Ok((row.get::<_, i64>(0)? as u64, row.get::<_, Vec<u8>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(seq, body)| {
                    LedgerEvent::from_bytes(&body)
                        .map(|event| (seq, event))
                        .map_err(|e| StoreError::InvalidData(format!("event {}: {}", seq, e)))
                })
                .collect()
        })
        .await
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitReceipt> {
        // Encode before touching the database so a bad event aborts early.
        let bodies = tx
            .events()
            .iter()
            .map(|event| Ok((event.group_id(), event.kind(), event.to_bytes()?)))
            .collect::<Result<Vec<_>>>()?;

        self.run(move |conn| {
            let db = conn.transaction()?;

            let mut grants_added = 0;
            for op in tx.ops() {
                if apply_op(&db, op)? {
                    grants_added += 1;
                }
            }

            let last: i64 = db.query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| {
                row.get(0)
            })?;
            let mut seq = last;
            for (group_id, kind, body) in &bodies {
                seq += 1;
                db.execute(
                    "INSERT INTO events (seq, group_id, kind, body) VALUES (?1, ?2, ?3, ?4)",
                    params![seq, group_id.0 as i64, kind, body],
                )?;
            }

            // Dropping `db` on an early return rolls everything back.
            db.commit()?;
            tracing::debug!(
                ops = tx.ops().len(),
                events = bodies.len(),
                grants_added,
                "committed ledger transaction"
            );

            Ok(CommitReceipt {
                first_event_seq: last as u64 + 1,
                last_event_seq: seq as u64,
                grants_added,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;

    fn principal(b: u8) -> Principal {
        Principal::from_bytes([b; 32])
    }

    fn handle(b: u8) -> Handle {
        Handle::from_bytes([b; 32])
    }

    fn created(id: u64, creator: Principal, key_handle: Handle) -> LedgerEvent {
        LedgerEvent::GroupCreated {
            group_id: GroupId(id),
            name: format!("group {}", id),
            creator,
            key_handle,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_group() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut tx = Transaction::new();
        tx.create_group(GroupId(0), "alpha", handle(0xaa), principal(1), 1234)
            .grant(handle(0xaa), principal(1))
            .emit(created(0, principal(1), handle(0xaa)));
        let receipt = ledger.commit(tx).await.unwrap();

        assert_eq!(receipt.grants_added, 1);
        assert_eq!((receipt.first_event_seq, receipt.last_event_seq), (1, 1));
        assert_eq!(ledger.group_count().await.unwrap(), 1);

        let group = ledger.get_group(GroupId(0)).await.unwrap().unwrap();
        assert_eq!(group.name, "alpha");
        assert_eq!(group.key_handle, handle(0xaa));
        assert_eq!(group.creator, principal(1));
        assert_eq!(group.created_at, 1234);
        assert_eq!(group.member_count, 1);

        assert!(ledger.is_member(GroupId(0), &principal(1)).await.unwrap());
        assert!(!ledger.is_member(GroupId(0), &principal(2)).await.unwrap());
        assert!(ledger.is_granted(&handle(0xaa), &principal(1)).await.unwrap());
        assert!(ledger.get_group(GroupId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_members_keep_join_order() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut tx = Transaction::new();
        tx.create_group(GroupId(0), "alpha", handle(1), principal(9), 0);
        ledger.commit(tx).await.unwrap();

        for p in [3u8, 1, 2] {
            let mut tx = Transaction::new();
            tx.add_member(GroupId(0), principal(p));
            ledger.commit(tx).await.unwrap();
        }

        assert_eq!(
            ledger.members(GroupId(0)).await.unwrap(),
            vec![principal(9), principal(3), principal(1), principal(2)]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut tx = Transaction::new();
        tx.create_group(GroupId(0), "alpha", handle(1), principal(1), 0)
            .emit(created(0, principal(1), handle(1)));
        ledger.commit(tx).await.unwrap();

        let mut tx = Transaction::new();
        tx.grant(handle(1), principal(2))
            .emit(LedgerEvent::MemberJoined {
                group_id: GroupId(0),
                member: principal(1),
            })
            .add_member(GroupId(0), principal(1));
        let err = ledger.commit(tx).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(!ledger.is_granted(&handle(1), &principal(2)).await.unwrap());
        assert_eq!(ledger.events_since(0).await.unwrap().len(), 1);
        assert_eq!(ledger.members(GroupId(0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_messages_are_dense() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut tx = Transaction::new();
        tx.create_group(GroupId(0), "alpha", handle(1), principal(1), 0);
        ledger.commit(tx).await.unwrap();

        for i in 0..3u8 {
            let record = MessageRecord {
                sender: principal(1),
                content_handle: handle(10 + i),
                timestamp: i as i64,
            };
            assert_eq!(
                ledger.append_message(GroupId(0), record).await.unwrap(),
                MessageIndex(i as u64)
            );
        }

        let record = MessageRecord {
            sender: principal(1),
            content_handle: handle(99),
            timestamp: 9,
        };
        let mut tx = Transaction::new();
        tx.append_message(GroupId(0), MessageIndex(1), record);
        assert!(matches!(ledger.commit(tx).await, Err(StoreError::Conflict(_))));

        assert_eq!(ledger.message_count(GroupId(0)).await.unwrap(), 3);
        assert_eq!(ledger.message_count(GroupId(5)).await.unwrap(), 0);
        assert_eq!(
            ledger.message_handles(GroupId(0)).await.unwrap(),
            vec![handle(10), handle(11), handle(12)]
        );
        let msg = ledger.get_message(GroupId(0), MessageIndex(2)).await.unwrap().unwrap();
        assert_eq!(msg.content_handle, handle(12));
        assert!(ledger.get_message(GroupId(0), MessageIndex(u64::MAX)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_group_rejected() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut tx = Transaction::new();
        tx.add_member(GroupId(0), principal(1));
        assert!(matches!(
            ledger.commit(tx).await,
            Err(StoreError::UnknownGroup(GroupId(0)))
        ));

        let mut tx = Transaction::new();
        tx.create_group(GroupId(1), "skip", handle(1), principal(1), 0);
        assert!(matches!(ledger.commit(tx).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let ledger = SqliteLedger::open(&path).unwrap();
            let mut tx = Transaction::new();
            tx.create_group(GroupId(0), "alpha", handle(1), principal(1), 7)
                .grant(handle(1), principal(1))
                .emit(created(0, principal(1), handle(1)));
            ledger.commit(tx).await.unwrap();
        }

        let ledger = SqliteLedger::open(&path).unwrap();
        assert_eq!(ledger.group_count().await.unwrap(), 1);
        assert!(ledger.is_granted(&handle(1), &principal(1)).await.unwrap());

        let events = ledger.events_since(0).await.unwrap();
        assert_eq!(events, vec![(1, created(0, principal(1), handle(1)))]);
    }
}
