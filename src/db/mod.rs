//! SQLite-backed contact store.
//!
//! Every identity decision is made against the `contacts` table. A `ContactDb`
//! wraps one connection; the server holds a handful of them and each request
//! runs inside a single `BEGIN IMMEDIATE` transaction, so concurrent requests
//! touching the same cluster are serialised by SQLite's write lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

mod contacts;
pub mod types;
pub use types::*;

/// Default busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection-level settings applied when a database is opened.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub busy_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

pub struct ContactDb {
    conn: Connection,
}

impl ContactDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a write transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// `BEGIN IMMEDIATE` takes the reserved lock before the first read, so the
    /// match/merge/insert sequence sees a snapshot no other writer can change.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(DbError::from(e).into());
                }
                Ok(val)
            }
            Err(e) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path, OpenOptions::default())
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf, options: OpenOptions) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(options.busy_timeout)?;

        // WAL keeps readers off the writer's lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::prepare(conn, Some(&path))
    }

    /// Open a private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn, None)
    }

    fn prepare(conn: Connection, path: Option<&Path>) -> Result<Self, DbError> {
        let applied = crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        // Set after migrations so table rebuilds in later migrations can
        // toggle it freely.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        match path {
            Some(path) => log::info!(
                "Contact database opened at {} ({} migration(s) applied)",
                path.display(),
                applied
            ),
            None => log::debug!("In-memory contact database opened"),
        }

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.contact-identity/contacts.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".contact-identity").join("contacts.db"))
    }
}


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::{seed_primary, test_db};
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .expect("contacts table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_in_memory_has_schema() {
        let db = ContactDb::open_in_memory().expect("in-memory db");
        assert_eq!(db.count_contacts().unwrap(), 0);
    }

    #[test]
    fn test_open_at_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("contacts.db");
        let _db = ContactDb::open_at(path.clone(), OpenOptions::default()).expect("open");
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = test_db();
        let id = db
            .with_transaction(|tx| -> Result<i64, DbError> {
                Ok(seed_primary(tx, Some("a@x.com"), None, "2025-01-01T00:00:00.000000Z"))
            })
            .expect("transaction");
        assert!(db.get_contact(id).unwrap().is_some());
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            seed_primary(tx, Some("a@x.com"), None, "2025-01-01T00:00:00.000000Z");
            Err(DbError::Migration("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.count_contacts().unwrap(), 0, "insert should be rolled back");
    }

    #[test]
    fn test_busy_error_is_transient() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("busy.db");
        let fast_fail = OpenOptions {
            busy_timeout: std::time::Duration::from_millis(0),
        };
        let holder = ContactDb::open_at(path.clone(), fast_fail).expect("open holder");
        let contender = ContactDb::open_at(path, fast_fail).expect("open contender");

        holder.conn.execute_batch("BEGIN IMMEDIATE").unwrap();
        let err = contender
            .with_transaction(|_| -> Result<(), DbError> { Ok(()) })
            .expect_err("second writer should be refused");
        assert!(err.is_transient(), "busy should be transient: {err}");
        holder.conn.execute_batch("ROLLBACK").unwrap();
    }

    #[test]
    fn test_migration_error_is_not_transient() {
        assert!(!DbError::Migration("bad".to_string()).is_transient());
        assert!(!DbError::HomeDirNotFound.is_transient());
    }
}
