// Transcript search
// Case-insensitive substring search over a user's transcript chunks

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::codec::from_db_time;
use super::models::{SearchOptions, TranscriptMatch};
use super::transcripts_repo::{row_to_chunk, CHUNK_COLUMNS};
use super::DatabaseManager;

impl DatabaseManager {
    /// Search a user's transcript chunks, chronologically ordered.
    /// Chunks belonging to deleted activities are never returned.
    pub fn search_transcripts(
        &self,
        user_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<TranscriptMatch>> {
        self.with_connection(|conn| search_transcripts_impl(conn, user_id, query, options))
    }
}

fn search_transcripts_impl(
    conn: &Connection,
    user_id: &str,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<TranscriptMatch>> {
    // Whitespace is part of the needle; it only decides emptiness here
    if query.trim().is_empty() || options.limit == 0 {
        return Ok(Vec::new());
    }
    let needle = query.to_lowercase();

    // SQLite's LIKE only folds ASCII case, so it can narrow the scan for ASCII
    // queries; the exact match is always decided below.
    let like_pattern = if needle.is_ascii() {
        format!("%{}%", escape_like(&needle))
    } else {
        "%".to_string()
    };

    let sql = format!(
        r#"
        SELECT {}, a.title, r.start_time
        FROM transcript_chunks c
        JOIN audio_recordings r ON r.id = c.recording_id
        JOIN activities a ON a.id = c.activity_id
        WHERE c.user_id = ?1
          AND a.deleted_at IS NULL
          AND c.text LIKE ?2 ESCAPE '\'
        ORDER BY r.start_time ASC, r.rowid ASC, c.start_offset ASC, c.rowid ASC
        "#,
        CHUNK_COLUMNS
    );

    let mut stmt = conn.prepare(&sql).context("Failed to prepare transcript search")?;
    let rows = stmt
        .query_map(params![user_id, like_pattern], |row| {
            let recording_start: String = row.get(12)?;
            Ok(TranscriptMatch {
                chunk: row_to_chunk(row)?,
                activity_title: row.get(11)?,
                recording_start: from_db_time(12, &recording_start)?,
            })
        })
        .context("Failed to run transcript search")?;

    let mut matches = Vec::new();
    let mut skipped = 0;
    for row in rows {
        let hit = row.context("Failed to read search result")?;
        if !hit.chunk.text.to_lowercase().contains(&needle) {
            continue;
        }
        if skipped < options.offset {
            skipped += 1;
            continue;
        }
        matches.push(hit);
        if matches.len() >= options.limit {
            break;
        }
    }

    Ok(matches)
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::codec::utc_now;
    use crate::database::models::{
        Activity, ActivityType, AudioDeviceInfo, AudioRecording, DeviceType, RecordingConfig,
        TranscriptChunk, User,
    };
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        db: DatabaseManager,
        user: User,
    }

    fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db")).unwrap();
        let user = User::new("tester");
        db.create_user(&user).unwrap();
        Fixture { _dir: dir, db, user }
    }

    fn seed(f: &Fixture, user: &User, title: &str, texts: &[&str]) -> Activity {
        let activity = Activity::new(&user.id, ActivityType::Meeting, title);
        f.db.insert_activity(&activity).unwrap();
        let device = AudioDeviceInfo {
            device_id: "0".into(),
            name: "Mic".into(),
            sample_rate: 16000,
            channels: 1,
            device_type: DeviceType::Microphone,
        };
        let recording = AudioRecording::new(&activity.id, &user.id, device, "r.wav", RecordingConfig::default());
        f.db.insert_recording(&recording).unwrap();

        let chunks: Vec<TranscriptChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| TranscriptChunk {
                id: uuid::Uuid::new_v4().to_string(),
                recording_id: recording.id.clone(),
                activity_id: activity.id.clone(),
                user_id: user.id.clone(),
                start_offset: i as f64 * 5.0,
                end_offset: i as f64 * 5.0 + 5.0,
                text: text.to_string(),
                confidence: None,
                speaker: None,
                language: None,
                created_at: utc_now(),
            })
            .collect();
        f.db.insert_transcript_chunks(&chunks).unwrap();
        activity
    }

    #[test]
    fn test_search_is_case_insensitive_and_scoped() {
        let f = setup();
        let other = User::new("someone else");
        f.db.create_user(&other).unwrap();

        seed(&f, &f.user, "Planning", &["The BUDGET review", "nothing here", "budget again"]);
        seed(&f, &other, "Theirs", &["budget of another user"]);

        let hits = f.db.search_transcripts(&f.user.id, "Budget", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "The BUDGET review");
        assert_eq!(hits[1].chunk.text, "budget again");
        assert_eq!(hits[0].activity_title, "Planning");
    }

    #[test]
    fn test_search_matches_non_ascii_case() {
        let f = setup();
        seed(&f, &f.user, "Café", &["Réunion ÉTÉ"]);
        let hits = f.db.search_transcripts(&f.user.id, "été", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_keeps_surrounding_whitespace() {
        let f = setup();
        seed(&f, &f.user, "Spacing", &["nobudget here", "the budget line"]);

        let hits = f.db.search_transcripts(&f.user.id, " budget", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "the budget line");

        assert!(f.db.search_transcripts(&f.user.id, "   ", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let f = setup();
        seed(&f, &f.user, "Stats", &["growth was 50% this quarter", "growth was 50 units"]);
        let hits = f.db.search_transcripts(&f.user.id, "50%", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_pages_and_skips_deleted() {
        let f = setup();
        seed(&f, &f.user, "One", &["alpha", "alpha", "alpha"]);
        let deleted = seed(&f, &f.user, "Two", &["alpha"]);
        f.db.soft_delete_activity(&deleted.id, &utc_now()).unwrap();

        let all = f.db.search_transcripts(&f.user.id, "alpha", &SearchOptions::default()).unwrap();
        assert_eq!(all.len(), 3);

        let page = f.db
            .search_transcripts(&f.user.id, "alpha", &SearchOptions { limit: 2, offset: 2 })
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].chunk.start_offset, 10.0);

        assert!(f.db.search_transcripts(&f.user.id, "   ", &SearchOptions::default()).unwrap().is_empty());
    }
}
