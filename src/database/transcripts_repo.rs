// Transcripts repository
// Handles storage and ordered retrieval of transcript chunks

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::codec::{from_db_time, to_db_time};
use super::models::TranscriptChunk;
use super::DatabaseManager;

impl DatabaseManager {
    /// Insert a batch of chunks in a single transaction
    pub fn insert_transcript_chunks(&self, chunks: &[TranscriptChunk]) -> Result<()> {
        self.with_connection(|conn| insert_transcript_chunks_impl(conn, chunks))
    }

    /// The chunk with the greatest end offset for a recording
    pub fn last_transcript_chunk(&self, recording_id: &str) -> Result<Option<TranscriptChunk>> {
        self.with_connection(|conn| last_transcript_chunk_impl(conn, recording_id))
    }

    pub fn list_chunks_for_recording(&self, recording_id: &str) -> Result<Vec<TranscriptChunk>> {
        self.with_connection(|conn| list_chunks_for_recording_impl(conn, recording_id))
    }

    /// All chunks of an activity, by recording start then chunk start
    pub fn list_chunks_for_activity(&self, activity_id: &str) -> Result<Vec<TranscriptChunk>> {
        self.with_connection(|conn| list_chunks_for_activity_impl(conn, activity_id))
    }
}

pub(super) const CHUNK_COLUMNS: &str = "c.id, c.recording_id, c.activity_id, c.user_id, \
     c.start_offset, c.end_offset, c.text, c.confidence, c.speaker, c.language, c.created_at";

pub(super) fn row_to_chunk(row: &Row) -> rusqlite::Result<TranscriptChunk> {
    let created_at: String = row.get(10)?;
    Ok(TranscriptChunk {
        id: row.get(0)?,
        recording_id: row.get(1)?,
        activity_id: row.get(2)?,
        user_id: row.get(3)?,
        start_offset: row.get(4)?,
        end_offset: row.get(5)?,
        text: row.get(6)?,
        confidence: row.get(7)?,
        speaker: row.get(8)?,
        language: row.get(9)?,
        created_at: from_db_time(10, &created_at)?,
    })
}

fn insert_transcript_chunks_impl(conn: &Connection, chunks: &[TranscriptChunk]) -> Result<()> {
    let tx = conn.unchecked_transaction()
        .context("Failed to start transaction")?;

    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO transcript_chunks (
                id, recording_id, activity_id, user_id, start_offset, end_offset,
                text, confidence, speaker, language, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#
        ).context("Failed to prepare transcript insert")?;

        for chunk in chunks {
            stmt.execute(params![
                chunk.id,
                chunk.recording_id,
                chunk.activity_id,
                chunk.user_id,
                chunk.start_offset,
                chunk.end_offset,
                chunk.text,
                chunk.confidence,
                chunk.speaker,
                chunk.language,
                to_db_time(&chunk.created_at),
            ]).context("Failed to insert transcript chunk")?;
        }
    }

    tx.commit().context("Failed to commit transcript chunks")?;

    Ok(())
}

fn last_transcript_chunk_impl(conn: &Connection, recording_id: &str) -> Result<Option<TranscriptChunk>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM transcript_chunks c
        WHERE c.recording_id = ?
        ORDER BY c.end_offset DESC, c.rowid DESC
        LIMIT 1
        "#,
        CHUNK_COLUMNS
    );
    let result = conn.query_row(&sql, params![recording_id], row_to_chunk);

    match result {
        Ok(chunk) => Ok(Some(chunk)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get last transcript chunk"),
    }
}

fn list_chunks_for_recording_impl(conn: &Connection, recording_id: &str) -> Result<Vec<TranscriptChunk>> {
    let sql = format!(
        "SELECT {} FROM transcript_chunks c WHERE c.recording_id = ? ORDER BY c.start_offset ASC, c.rowid ASC",
        CHUNK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare transcript query")?;
    let rows = stmt
        .query_map(params![recording_id], row_to_chunk)
        .context("Failed to query transcript chunks")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read transcript chunk")
}

fn list_chunks_for_activity_impl(conn: &Connection, activity_id: &str) -> Result<Vec<TranscriptChunk>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM transcript_chunks c
        JOIN audio_recordings r ON r.id = c.recording_id
        WHERE c.activity_id = ?
        ORDER BY r.start_time ASC, r.rowid ASC, c.start_offset ASC, c.rowid ASC
        "#,
        CHUNK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare activity transcript query")?;
    let rows = stmt
        .query_map(params![activity_id], row_to_chunk)
        .context("Failed to query activity transcript")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read transcript chunk")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::codec::utc_now;
    use crate::database::models::{
        Activity, ActivityType, AudioDeviceInfo, AudioRecording, DeviceType, RecordingConfig, User,
    };
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        db: DatabaseManager,
        user: User,
        activity: Activity,
    }

    fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db")).unwrap();
        let user = User::new("tester");
        db.create_user(&user).unwrap();
        let activity = Activity::new(&user.id, ActivityType::Meeting, "Review");
        db.insert_activity(&activity).unwrap();
        Fixture { _dir: dir, db, user, activity }
    }

    fn add_recording(f: &Fixture, offset_secs: i64) -> AudioRecording {
        let device = AudioDeviceInfo {
            device_id: "0".into(),
            name: "Mic".into(),
            sample_rate: 44100,
            channels: 1,
            device_type: DeviceType::Microphone,
        };
        let mut r = AudioRecording::new(&f.activity.id, &f.user.id, device, "r.wav", RecordingConfig::default());
        r.start_time = r.start_time + chrono::Duration::seconds(offset_secs);
        f.db.insert_recording(&r).unwrap();
        r
    }

    fn chunk(r: &AudioRecording, start: f64, end: f64, text: &str) -> TranscriptChunk {
        TranscriptChunk {
            id: uuid::Uuid::new_v4().to_string(),
            recording_id: r.id.clone(),
            activity_id: r.activity_id.clone(),
            user_id: r.user_id.clone(),
            start_offset: start,
            end_offset: end,
            text: text.into(),
            confidence: Some(0.9),
            speaker: None,
            language: Some("en".into()),
            created_at: utc_now(),
        }
    }

    #[test]
    fn test_activity_transcript_orders_by_recording_then_offset() {
        let f = setup();
        let later = add_recording(&f, 60);
        let earlier = add_recording(&f, 0);

        f.db.insert_transcript_chunks(&[chunk(&later, 100.0, 105.0, "third")]).unwrap();
        f.db.insert_transcript_chunks(&[
            chunk(&earlier, 5.0, 9.0, "second"),
            chunk(&earlier, 0.0, 5.0, "first"),
        ]).unwrap();

        let texts: Vec<String> = f.db
            .list_chunks_for_activity(&f.activity.id)
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        let last = f.db.last_transcript_chunk(&earlier.id).unwrap().unwrap();
        assert_eq!(last.text, "second");
        assert_eq!(f.db.list_chunks_for_recording(&later.id).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_insert_is_atomic() {
        let f = setup();
        let r = add_recording(&f, 0);
        let first = chunk(&r, 0.0, 1.0, "a");
        let duplicate = first.clone();

        assert!(f.db.insert_transcript_chunks(&[first, duplicate]).is_err());
        assert!(f.db.list_chunks_for_recording(&r.id).unwrap().is_empty());
    }
}
