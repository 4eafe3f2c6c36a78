//! SQLite archive of finished and in-flight jobs.
//!
//! The in-memory `JobStore` stays authoritative for live jobs; the archive
//! lets `get_with_fallback` answer for jobs evicted from memory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::Config;

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Shared handle to the archive connection. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the archive at `path`, creating parent directories, and brings
    /// the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::run_all(&conn)?;

        log::info!("Job archive opened at {}", path.display());
        Ok(Self::wrap(conn))
    }

    /// Opens the archive named by `database_path`, or `None` when the config
    /// leaves archiving off.
    pub fn open_configured(config: &Config) -> Result<Option<Self>, DatabaseError> {
        match config.database_path.as_deref() {
            Some(raw) => Self::open(&resolve_path(raw)).map(Some),
            None => Ok(None),
        }
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Expands a leading `~/` to the home directory.
fn resolve_path(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_jobs(db: &Database) -> u32 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_open_creates_parent_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive").join("jobs.db");

        let db = Database::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(count_jobs(&db), 0);
    }

    #[test]
    fn test_open_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path().to_string_lossy());
        assert!(Database::open_configured(&config).unwrap().is_none());

        let path = dir.path().join("jobs.db");
        config.database_path = Some(path.to_string_lossy().into_owned());
        let db = Database::open_configured(&config).unwrap().unwrap();
        assert_eq!(count_jobs(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_resolve_path_expands_home() {
        let resolved = resolve_path("~/.visionforge/jobs.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolved, home.join(".visionforge").join("jobs.db"));
        }
        assert_eq!(resolve_path("/srv/jobs.db"), PathBuf::from("/srv/jobs.db"));
    }
}
