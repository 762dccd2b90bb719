use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::db::{ContactDb, DbError};
use crate::identity::RetryPolicy;

/// Process-wide state handed to every request handler.
///
/// Owns a fixed set of connections to the same database file. Connections are
/// opened once at startup and closed when the state is dropped at shutdown.
pub struct AppState {
    pub config: Config,
    pub database_path: PathBuf,
    pool: Vec<Mutex<ContactDb>>,
    next: AtomicUsize,
}

impl AppState {
    /// Open `config.connections` connections to the configured database.
    pub fn open(config: Config) -> Result<Self, DbError> {
        let database_path = match &config.database_path {
            Some(path) => path.clone(),
            None => ContactDb::default_path()?,
        };

        let size = config.connections.max(1);
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            let db = ContactDb::open_at(database_path.clone(), config.open_options())?;
            pool.push(Mutex::new(db));
        }
        log::info!(
            "Opened {} connection(s) to {}",
            size,
            database_path.display()
        );

        Ok(Self {
            config,
            database_path,
            pool,
            next: AtomicUsize::new(0),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Run `f` with exclusive use of one pooled connection.
    ///
    /// Prefers an idle connection; when all are busy, waits on the next one in
    /// round-robin order. Blocks, so call from a blocking context.
    pub fn with_db<T>(&self, f: impl FnOnce(&ContactDb) -> T) -> T {
        for slot in &self.pool {
            if let Some(db) = slot.try_lock() {
                return f(&*db);
            }
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let db = self.pool[index].lock();
        f(&*db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::identify;

    fn temp_config(connections: usize) -> Config {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.db");
        std::mem::forget(dir);
        Config {
            database_path: Some(path),
            connections,
            ..Config::default()
        }
    }

    #[test]
    fn test_open_builds_pool() {
        let state = AppState::open(temp_config(3)).unwrap();
        assert_eq!(state.pool_size(), 3);
        assert!(state.database_path.exists());
    }

    #[test]
    fn test_zero_connections_still_opens_one() {
        let state = AppState::open(temp_config(0)).unwrap();
        assert_eq!(state.pool_size(), 1);
    }

    #[test]
    fn test_connections_share_one_database() {
        let state = AppState::open(temp_config(2)).unwrap();
        let written = state
            .with_db(|db| identify(db, Some("a@x.com"), None))
            .unwrap();

        // Hold the first connection so the read lands on the second.
        let first = state.pool[0].lock();
        let read = state
            .with_db(|db| identify(db, Some("a@x.com"), None))
            .unwrap();
        drop(first);

        assert_eq!(read, written);
    }
}
