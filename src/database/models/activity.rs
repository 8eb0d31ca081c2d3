// Database models - Activity
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity a user is tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Meeting,
    WorkSession,
    Call,
    Other,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Meeting => "meeting",
            ActivityType::WorkSession => "work_session",
            ActivityType::Call => "call",
            ActivityType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "meeting" => Some(ActivityType::Meeting),
            "work_session" => Some(ActivityType::WorkSession),
            "call" => Some(ActivityType::Call),
            "other" => Some(ActivityType::Other),
            _ => None,
        }
    }
}

/// Lifecycle status of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Scheduled,
    Active,
    Recording,
    Processing,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Scheduled => "scheduled",
            ActivityStatus::Active => "active",
            ActivityStatus::Recording => "recording",
            ActivityStatus::Processing => "processing",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ActivityStatus::Scheduled),
            "active" => Some(ActivityStatus::Active),
            "recording" => Some(ActivityStatus::Recording),
            "processing" => Some(ActivityStatus::Processing),
            "completed" => Some(ActivityStatus::Completed),
            "failed" => Some(ActivityStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityStatus::Completed | ActivityStatus::Failed)
    }
}

/// How a recording-backed activity came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingOrigin {
    Manual,
    Scheduled,
}

/// Activity metadata: known fields are typed, the rest is an open bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_origin: Option<RecordingOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_created: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ActivityMetadata {
    /// Metadata stamped on activities created implicitly by a recording start
    pub fn implicit_recording() -> Self {
        Self {
            recording_origin: Some(RecordingOrigin::Manual),
            auto_created: Some(true),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ActivityStatus,
    pub tags: Vec<String>,
    pub metadata: ActivityMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn new(user_id: impl Into<String>, activity_type: ActivityType, title: impl Into<String>) -> Self {
        let now = crate::database::codec::utc_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            activity_type,
            title: title.into(),
            start_time: now,
            end_time: None,
            status: ActivityStatus::Scheduled,
            tags: Vec::new(),
            metadata: ActivityMetadata::default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Wall-clock length, once the activity has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Paging and visibility options for activity listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
