use crate::error::StateError;
use rusqlite::{Connection, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// SQLite state backend. Each mutation is its own committed transaction.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        debug!("Opened SQLite state at {}", path.display());
        Ok(db)
    }

    /// Remove any existing database (and its WAL sidecars) without reading
    /// it, then create a fresh one.
    pub fn create_empty(path: &Path) -> std::result::Result<Self, StateError> {
        for candidate in [
            path.to_path_buf(),
            path.with_extension(sidecar_extension(path, "wal")),
            path.with_extension(sidecar_extension(path, "shm")),
        ] {
            match fs::remove_file(&candidate) {
                Ok(()) => debug!("Removed {}", candidate.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StateError::Persist {
                        path: candidate,
                        source,
                    });
                }
            }
        }
        let db = Self::open(path)?;
        info!("State database reset: {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        // FULL: a committed completion must survive power loss.
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, synchronous FULL)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > 1 {
            debug!("Schema version {} is newer than this build understands", version);
        }
        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version 1)");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM processed_path;
             DELETE FROM hash_output;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}

/// `state.db` → `db-wal`, so `with_extension` yields `state.db-wal`.
fn sidecar_extension(path: &Path, suffix: &str) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}", ext, suffix),
        None => suffix.to_string(),
    }
}
