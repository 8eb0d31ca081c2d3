// Database manager
// Owns the SQLite connection; repositories hang off it as `impl` blocks

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::migrations;
use crate::config::AppConfig;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database manager that owns the SQLite connection
pub struct DatabaseManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DatabaseManager {
    /// Open (or create) the database at the specified path and migrate it
    pub fn new(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path)
            .context("Failed to open database")?;

        // Enable foreign keys
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        // Wait on a locked database instead of failing immediately
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;

        // Run migrations
        migrations::run_migrations(&conn)
            .context("Failed to run database migrations")?;

        log::info!("Database initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Initialize the database manager in the configured data directory
    pub fn init_with_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.db_path())
    }

    /// Execute a function with access to the database connection.
    ///
    /// This serializes SQL statements only; it is not the lock that guards
    /// recording state.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock database connection: {}", e))?;
        f(&conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let manager = DatabaseManager::new(db_path.clone()).unwrap();
        assert!(db_path.exists());
        assert_eq!(manager.db_path(), db_path.as_path());

        manager.with_connection(|conn| {
            let count: i32 = conn.query_row(
                "SELECT COUNT(*) FROM activities",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(count, 0);

            let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(fk, 1);
            Ok(())
        }).unwrap();
    }

    #[test]
    fn test_init_with_config_uses_data_dir() {
        let dir = tempdir().unwrap();
        let config = AppConfig::with_data_dir(dir.path().join("data"));

        let manager = DatabaseManager::init_with_config(&config).unwrap();
        assert_eq!(manager.db_path(), config.db_path().as_path());
        assert!(config.db_path().is_file());
    }

    #[test]
    fn test_reopen_existing_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        drop(DatabaseManager::new(db_path.clone()).unwrap());
        let reopened = DatabaseManager::new(db_path).unwrap();
        let version = reopened
            .with_connection(|conn| migrations::get_schema_version(conn))
            .unwrap();
        assert_eq!(version, migrations::SCHEMA_VERSION);
    }
}
