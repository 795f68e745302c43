//! Schema migrations for the SQLite ledger.
//!
//! Versions are recorded in `schema_migrations`; every pending version is
//! applied inside one transaction on open.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Groups, dense ids starting at 0
        CREATE TABLE groups (
            group_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            key_handle BLOB NOT NULL,         -- 32 bytes, handle of the group secret
            creator BLOB NOT NULL,            -- 32 bytes, Ed25519 public key
            created_at INTEGER NOT NULL       -- ledger time (Unix ms)
        );

        -- Membership in join order; position 0 is the creator
        CREATE TABLE members (
            group_id INTEGER NOT NULL REFERENCES groups(group_id),
            position INTEGER NOT NULL,
            principal BLOB NOT NULL,
            PRIMARY KEY (group_id, position),
            UNIQUE (group_id, principal)
        );

        -- Per-group message sequence
        CREATE TABLE messages (
            group_id INTEGER NOT NULL REFERENCES groups(group_id),
            idx INTEGER NOT NULL,
            sender BLOB NOT NULL,
            content_handle BLOB NOT NULL,     -- 32 bytes, handle of the sealed envelope
            timestamp INTEGER NOT NULL,
            PRIMARY KEY (group_id, idx)
        );

        -- Decrypt grants; rows are never deleted
        CREATE TABLE acl (
            handle BLOB NOT NULL,
            principal BLOB NOT NULL,
            PRIMARY KEY (handle, principal)
        );

        -- Event log, 1-based dense sequence
        CREATE TABLE events (
            seq INTEGER PRIMARY KEY,
            group_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            body BLOB NOT NULL                -- CBOR-encoded LedgerEvent
        );

        CREATE INDEX idx_events_group ON events(group_id);
        CREATE INDEX idx_acl_principal ON acl(principal);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["groups", "members", "messages", "acl", "events", "schema_migrations"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_member_uniqueness_enforced() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO groups (group_id, name, key_handle, creator, created_at)
             VALUES (0, 'alpha', x'00', x'01', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO members (group_id, position, principal) VALUES (0, 0, x'01')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO members (group_id, position, principal) VALUES (0, 1, x'01')",
            [],
        );
        assert!(dup.is_err());
    }
}
