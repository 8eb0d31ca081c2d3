// Database models - Transcript
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored, time-bounded piece of transcribed text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub id: String,
    pub recording_id: String,
    pub activity_id: String,
    pub user_id: String,
    /// Seconds from the activity start
    pub start_offset: f64,
    pub end_offset: f64,
    pub text: String,
    pub confidence: Option<f64>,
    pub speaker: Option<String>,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptChunk {
    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// `MM:SS - MM:SS`, switching to `HH:MM:SS` past the hour
    pub fn format_time_range(&self) -> String {
        format!(
            "{} - {}",
            format_offset(self.start_offset),
            format_offset(self.end_offset)
        )
    }
}

fn format_offset(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// A chunk as produced by the transcription engine, before it is stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTranscriptChunk {
    pub start_offset: f64,
    pub end_offset: f64,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl NewTranscriptChunk {
    pub fn new(start_offset: f64, end_offset: f64, text: impl Into<String>) -> Self {
        Self {
            start_offset,
            end_offset,
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A search hit with enough context to locate it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMatch {
    pub chunk: TranscriptChunk,
    pub activity_title: String,
    pub recording_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 100, offset: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: f64, end: f64, text: &str) -> TranscriptChunk {
        TranscriptChunk {
            id: "c".into(),
            recording_id: "r".into(),
            activity_id: "a".into(),
            user_id: "u".into(),
            start_offset: start,
            end_offset: end,
            text: text.into(),
            confidence: None,
            speaker: None,
            language: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_chunk_helpers() {
        let c = chunk(65.5, 70.0, "  hello   there world ");
        assert_eq!(c.duration(), 4.5);
        assert_eq!(c.word_count(), 3);
        assert_eq!(c.format_time_range(), "01:05 - 01:10");
    }

    #[test]
    fn test_time_range_switches_to_hours() {
        let c = chunk(3599.0, 3725.0, "x");
        assert_eq!(c.format_time_range(), "59:59 - 01:02:05");
    }
}
