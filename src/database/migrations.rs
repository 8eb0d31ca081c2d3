// Database migrations
// Creates and updates the database schema

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check for schema_version table")?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

/// Initial schema: users and activities (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v1");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Users: one per install, settings stored as JSON
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT NOT NULL,
            settings TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Activities: soft-deleted via deleted_at, never physically removed
        CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            title TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled',
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_activities_user_start
        ON activities(user_id, start_time);

        INSERT INTO schema_version (version) VALUES (1);
    "#).context("Failed to run migration v1")?;

    Ok(())
}

/// Audio recordings (version 2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v2");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS audio_recordings (
            id TEXT PRIMARY KEY NOT NULL,
            activity_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            device TEXT NOT NULL,
            file_path TEXT NOT NULL,
            duration_seconds REAL NOT NULL DEFAULT 0,
            sample_rate INTEGER NOT NULL,
            channels INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            file_size INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'recording',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (activity_id) REFERENCES activities(id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_audio_recordings_activity
        ON audio_recordings(activity_id, start_time);

        CREATE INDEX IF NOT EXISTS idx_audio_recordings_user_status
        ON audio_recordings(user_id, status);

        INSERT INTO schema_version (version) VALUES (2);
    "#).context("Failed to run migration v2")?;

    Ok(())
}

/// Transcript chunks (version 3)
fn migrate_v3(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v3");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS transcript_chunks (
            id TEXT PRIMARY KEY NOT NULL,
            recording_id TEXT NOT NULL,
            activity_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            start_offset REAL NOT NULL,
            end_offset REAL NOT NULL,
            text TEXT NOT NULL,
            confidence REAL,
            speaker TEXT,
            language TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (recording_id) REFERENCES audio_recordings(id) ON DELETE CASCADE,
            FOREIGN KEY (activity_id) REFERENCES activities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_transcript_chunks_recording
        ON transcript_chunks(recording_id, start_offset);

        CREATE INDEX IF NOT EXISTS idx_transcript_chunks_user
        ON transcript_chunks(user_id);

        INSERT INTO schema_version (version) VALUES (3);
    "#).context("Failed to run migration v3")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_reach_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, SCHEMA_VERSION);
    }
}
