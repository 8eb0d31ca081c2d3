// Database models - AudioRecording
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extensions a recording may be written as
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["wav", "mp3", "m4a", "aac", "flac", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Microphone,
    SystemAudio,
    Virtual,
}

/// Descriptor of the capture device a recording was made with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub device_id: String,
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Completed,
    Failed,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Recording => "recording",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recording" => Some(RecordingStatus::Recording),
            "completed" => Some(RecordingStatus::Completed),
            "failed" => Some(RecordingStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordingStatus::Recording)
    }
}

/// Why a recording ended up `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// File missing or zero bytes when the recording stopped
    EmptyRecording,
    /// File exists but its size could not be read
    FileUnreadable,
    /// Found still `recording` when the process started
    StaleOnStartup,
    /// Start sequence aborted after the row was written
    StartFailed,
}

/// Capture settings requested for a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub format: String,
    pub quality: String,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub channels: u16,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            quality: "high".to_string(),
            sample_rate: 44100,
            bitrate: 128000,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RecordingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRecording {
    pub id: String,
    pub activity_id: String,
    pub user_id: String,
    pub device: AudioDeviceInfo,
    /// Relative to the data root, always `/`-separated
    pub file_path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub file_size: i64,
    pub status: RecordingStatus,
    pub metadata: RecordingMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AudioRecording {
    pub fn new(
        activity_id: impl Into<String>,
        user_id: impl Into<String>,
        device: AudioDeviceInfo,
        file_path: impl Into<String>,
        config: RecordingConfig,
    ) -> Self {
        let now = crate::database::codec::utc_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: activity_id.into(),
            user_id: user_id.into(),
            sample_rate: device.sample_rate,
            channels: device.channels,
            device,
            file_path: file_path.into(),
            duration_seconds: 0.0,
            start_time: now,
            end_time: None,
            file_size: 0,
            status: RecordingStatus::Recording,
            metadata: RecordingMetadata {
                config: Some(config),
                ..RecordingMetadata::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == RecordingStatus::Recording
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.metadata.failure_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!RecordingStatus::Recording.is_terminal());
        assert!(RecordingStatus::Completed.is_terminal());
        assert!(RecordingStatus::Failed.is_terminal());
        assert_eq!(RecordingStatus::from_str("paused"), None);
    }

    #[test]
    fn test_failure_reason_serializes_snake_case() {
        let meta = RecordingMetadata {
            failure_reason: Some(FailureReason::EmptyRecording),
            ..RecordingMetadata::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["failure_reason"], "empty_recording");
        assert!(value.get("config").is_none());
    }
}
