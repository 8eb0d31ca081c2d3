// Database models - User
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user preferences. Known keys are typed; anything else rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_audio_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_recording: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The local user of this install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub settings: UserSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let now = crate::database::codec::utc_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            settings: UserSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_keep_unknown_keys() {
        let json = r#"{"theme":"dark","privacy_mode":true,"hotkey":"F9"}"#;
        let settings: UserSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.theme.as_deref(), Some("dark"));
        assert_eq!(settings.extra.get("privacy_mode"), Some(&serde_json::Value::Bool(true)));

        let back: serde_json::Value = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["hotkey"], "F9");
        assert!(back.get("audio_quality").is_none());
    }
}
