// Database models - Re-exports all domain-specific models
//
// This module is split into focused files by domain:
// - user.rs: The local user and their settings
// - activity.rs: Activities and their lifecycle status
// - audio_recording.rs: Audio takes, capture devices and recording config
// - transcript.rs: Transcript chunks and search results

mod user;
mod activity;
mod audio_recording;
mod transcript;

pub use user::{User, UserSettings};
pub use activity::{
    Activity, ActivityMetadata, ActivityStatus, ActivityType, ListOptions, RecordingOrigin,
};
pub use audio_recording::{
    AudioDeviceInfo, AudioRecording, DeviceType, FailureReason, RecordingConfig,
    RecordingMetadata, RecordingStatus, SUPPORTED_AUDIO_FORMATS,
};
pub use transcript::{NewTranscriptChunk, SearchOptions, TranscriptChunk, TranscriptMatch};
