// Recordings repository
// Handles CRUD operations for audio recordings

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::codec::{
    from_db_enum, from_db_time, from_json, opt_from_db_time, opt_to_db_time, to_db_time, to_json,
};
use super::models::{AudioRecording, RecordingStatus};
use super::DatabaseManager;

impl DatabaseManager {
    pub fn insert_recording(&self, recording: &AudioRecording) -> Result<()> {
        self.with_connection(|conn| insert_recording_impl(conn, recording))
    }

    pub fn get_recording(&self, id: &str) -> Result<Option<AudioRecording>> {
        self.with_connection(|conn| get_recording_impl(conn, id))
    }

    /// Persist every mutable column of the recording
    pub fn update_recording(&self, recording: &AudioRecording) -> Result<()> {
        self.with_connection(|conn| update_recording_impl(conn, recording))
    }

    /// Recordings of an activity in start order
    pub fn list_recordings_for_activity(&self, activity_id: &str) -> Result<Vec<AudioRecording>> {
        self.with_connection(|conn| list_recordings_for_activity_impl(conn, activity_id))
    }

    /// Recordings in a given status, optionally limited to one user
    pub fn list_recordings_by_status(
        &self,
        user_id: Option<&str>,
        status: RecordingStatus,
    ) -> Result<Vec<AudioRecording>> {
        self.with_connection(|conn| list_recordings_by_status_impl(conn, user_id, status))
    }

    /// Relative file paths of every recording whose activity is not deleted
    pub fn list_live_recording_paths(&self) -> Result<Vec<String>> {
        self.with_connection(list_live_recording_paths_impl)
    }
}

const RECORDING_COLUMNS: &str = "r.id, r.activity_id, r.user_id, r.device, r.file_path, \
     r.duration_seconds, r.sample_rate, r.channels, r.start_time, r.end_time, r.file_size, \
     r.status, r.metadata, r.created_at, r.updated_at";

pub(super) fn row_to_recording(row: &Row) -> rusqlite::Result<AudioRecording> {
    let device: String = row.get(3)?;
    let start_time: String = row.get(8)?;
    let status: String = row.get(11)?;
    let metadata: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(AudioRecording {
        id: row.get(0)?,
        activity_id: row.get(1)?,
        user_id: row.get(2)?,
        device: from_json(3, &device)?,
        file_path: row.get(4)?,
        duration_seconds: row.get(5)?,
        sample_rate: row.get(6)?,
        channels: row.get(7)?,
        start_time: from_db_time(8, &start_time)?,
        end_time: opt_from_db_time(9, row.get(9)?)?,
        file_size: row.get(10)?,
        status: from_db_enum(11, &status, RecordingStatus::from_str)?,
        metadata: from_json(12, &metadata)?,
        created_at: from_db_time(13, &created_at)?,
        updated_at: from_db_time(14, &updated_at)?,
    })
}

fn insert_recording_impl(conn: &Connection, recording: &AudioRecording) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO audio_recordings (
            id, activity_id, user_id, device, file_path, duration_seconds,
            sample_rate, channels, start_time, end_time, file_size, status,
            metadata, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            recording.id,
            recording.activity_id,
            recording.user_id,
            to_json(&recording.device)?,
            recording.file_path,
            recording.duration_seconds,
            recording.sample_rate,
            recording.channels,
            to_db_time(&recording.start_time),
            opt_to_db_time(&recording.end_time),
            recording.file_size,
            recording.status.as_str(),
            to_json(&recording.metadata)?,
            to_db_time(&recording.created_at),
            to_db_time(&recording.updated_at),
        ],
    ).context("Failed to create recording")?;

    Ok(())
}

fn get_recording_impl(conn: &Connection, id: &str) -> Result<Option<AudioRecording>> {
    let sql = format!("SELECT {} FROM audio_recordings r WHERE r.id = ?", RECORDING_COLUMNS);
    let result = conn.query_row(&sql, params![id], row_to_recording);

    match result {
        Ok(recording) => Ok(Some(recording)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get recording"),
    }
}

fn update_recording_impl(conn: &Connection, recording: &AudioRecording) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE audio_recordings SET
            duration_seconds = ?1,
            end_time = ?2,
            file_size = ?3,
            status = ?4,
            metadata = ?5,
            updated_at = ?6
        WHERE id = ?7
        "#,
        params![
            recording.duration_seconds,
            opt_to_db_time(&recording.end_time),
            recording.file_size,
            recording.status.as_str(),
            to_json(&recording.metadata)?,
            to_db_time(&recording.updated_at),
            recording.id,
        ],
    ).context("Failed to update recording")?;

    if updated == 0 {
        anyhow::bail!("Recording not found: {}", recording.id);
    }

    Ok(())
}

fn list_recordings_for_activity_impl(conn: &Connection, activity_id: &str) -> Result<Vec<AudioRecording>> {
    let sql = format!(
        "SELECT {} FROM audio_recordings r WHERE r.activity_id = ? ORDER BY r.start_time ASC, r.rowid ASC",
        RECORDING_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare list_recordings query")?;
    let rows = stmt
        .query_map(params![activity_id], row_to_recording)
        .context("Failed to query recordings")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read recording row")
}

fn list_recordings_by_status_impl(
    conn: &Connection,
    user_id: Option<&str>,
    status: RecordingStatus,
) -> Result<Vec<AudioRecording>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM audio_recordings r
        WHERE r.status = ?1 AND (?2 IS NULL OR r.user_id = ?2)
        ORDER BY r.start_time ASC, r.rowid ASC
        "#,
        RECORDING_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare recordings by status query")?;
    let rows = stmt
        .query_map(params![status.as_str(), user_id], row_to_recording)
        .context("Failed to query recordings by status")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read recording row")
}

fn list_live_recording_paths_impl(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.file_path
        FROM audio_recordings r
        JOIN activities a ON a.id = r.activity_id
        WHERE a.deleted_at IS NULL
        "#
    ).context("Failed to prepare live recording paths query")?;

    let paths = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query live recording paths")?;

    paths.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read recording path")
}
