use super::models::ProcessingState;
use super::sqlite::Database;
use super::StateStore;
use crate::error::StateError;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl StateStore for Database {
    fn is_processed(&self, path: &str) -> Result<bool, StateError> {
        let found = self
            .connection()
            .query_row(
                "SELECT 1 FROM processed_path WHERE path = ?1",
                params![path],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn lookup_hash(&self, fingerprint: &str) -> Result<Option<String>, StateError> {
        let base_name = self
            .connection()
            .query_row(
                "SELECT base_name FROM hash_output WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(base_name)
    }

    fn is_extracted(&self, fingerprint: &str) -> Result<bool, StateError> {
        let extracted: Option<bool> = self
            .connection()
            .query_row(
                "SELECT extracted FROM hash_output WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(extracted.unwrap_or(false))
    }

    fn owner_of(&self, base_name: &str) -> Result<Option<String>, StateError> {
        let fingerprint = self
            .connection()
            .query_row(
                "SELECT fingerprint FROM hash_output WHERE base_name = ?1",
                params![base_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }

    fn record_hash(&mut self, fingerprint: &str, base_name: &str) -> Result<(), StateError> {
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = self.connection().execute(
            "INSERT OR IGNORE INTO hash_output (fingerprint, base_name, extracted, recorded_at) \
             VALUES (?1, ?2, 0, ?3)",
            params![fingerprint, base_name, now],
        )?;
        if inserted > 0 {
            debug!("Recorded hash {} -> {}", fingerprint, base_name);
        }
        Ok(())
    }

    fn record_processed(&mut self, path: &str) -> Result<(), StateError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT OR IGNORE INTO processed_path (path, processed_at) VALUES (?1, ?2)",
            params![path, now],
        )?;
        Ok(())
    }

    fn record_extraction(
        &mut self,
        path: &str,
        fingerprint: &str,
        base_name: &str,
    ) -> Result<(), StateError> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.connection_mut().transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO hash_output (fingerprint, base_name, extracted, recorded_at) \
             VALUES (?1, ?2, 0, ?3)",
            params![fingerprint, base_name, now],
        )?;
        tx.execute(
            "UPDATE hash_output SET extracted = 1 WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO processed_path (path, processed_at) VALUES (?1, ?2)",
            params![path, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StateError> {
        self.truncate_all()?;
        Ok(())
    }

    fn snapshot(&self) -> Result<ProcessingState, StateError> {
        let mut state = ProcessingState::default();

        let mut stmt = self
            .connection()
            .prepare("SELECT path FROM processed_path ORDER BY path")?;
        let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for path in paths {
            state.processed_paths.insert(path?);
        }

        let mut stmt = self.connection().prepare(
            "SELECT fingerprint, base_name, extracted FROM hash_output ORDER BY fingerprint",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        for row in rows {
            let (fingerprint, base_name, extracted) = row?;
            if extracted {
                state.extracted.insert(fingerprint.clone());
            }
            state.hash_to_output.insert(fingerprint, base_name);
        }

        Ok(state)
    }
}
