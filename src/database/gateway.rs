// Persistence gateway
// The CRUD contract the lifecycle services depend on. `DatabaseManager` is the
// SQLite-backed implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::models::{
    Activity, AudioRecording, ListOptions, RecordingStatus, SearchOptions, TranscriptChunk,
    TranscriptMatch, User, UserSettings,
};
use super::DatabaseManager;

pub trait PersistenceGateway: Send + Sync {
    // Users
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_first_user(&self) -> Result<Option<User>>;
    fn update_user_settings(&self, id: &str, settings: &UserSettings) -> Result<()>;

    // Activities
    fn insert_activity(&self, activity: &Activity) -> Result<()>;
    fn get_activity(&self, id: &str) -> Result<Option<Activity>>;
    fn list_activities(&self, user_id: &str, options: &ListOptions) -> Result<Vec<Activity>>;
    fn update_activity(&self, activity: &Activity) -> Result<()>;
    fn soft_delete_activity(&self, id: &str, deleted_at: &DateTime<Utc>) -> Result<bool>;
    fn list_deleted_activity_ids(&self) -> Result<Vec<String>>;

    // Audio recordings
    fn insert_recording(&self, recording: &AudioRecording) -> Result<()>;
    fn get_recording(&self, id: &str) -> Result<Option<AudioRecording>>;
    fn update_recording(&self, recording: &AudioRecording) -> Result<()>;
    fn list_recordings_for_activity(&self, activity_id: &str) -> Result<Vec<AudioRecording>>;
    fn list_recordings_by_status(
        &self,
        user_id: Option<&str>,
        status: RecordingStatus,
    ) -> Result<Vec<AudioRecording>>;
    fn list_live_recording_paths(&self) -> Result<Vec<String>>;

    // Transcript chunks
    fn insert_transcript_chunks(&self, chunks: &[TranscriptChunk]) -> Result<()>;
    fn last_transcript_chunk(&self, recording_id: &str) -> Result<Option<TranscriptChunk>>;
    fn list_chunks_for_recording(&self, recording_id: &str) -> Result<Vec<TranscriptChunk>>;
    fn list_chunks_for_activity(&self, activity_id: &str) -> Result<Vec<TranscriptChunk>>;
    fn search_transcripts(
        &self,
        user_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<TranscriptMatch>>;
}

impl PersistenceGateway for DatabaseManager {
    fn create_user(&self, user: &User) -> Result<()> {
        DatabaseManager::create_user(self, user)
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        DatabaseManager::get_user(self, id)
    }

    fn get_first_user(&self) -> Result<Option<User>> {
        DatabaseManager::get_first_user(self)
    }

    fn update_user_settings(&self, id: &str, settings: &UserSettings) -> Result<()> {
        DatabaseManager::update_user_settings(self, id, settings)
    }

    fn insert_activity(&self, activity: &Activity) -> Result<()> {
        DatabaseManager::insert_activity(self, activity)
    }

    fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        DatabaseManager::get_activity(self, id)
    }

    fn list_activities(&self, user_id: &str, options: &ListOptions) -> Result<Vec<Activity>> {
        DatabaseManager::list_activities(self, user_id, options)
    }

    fn update_activity(&self, activity: &Activity) -> Result<()> {
        DatabaseManager::update_activity(self, activity)
    }

    fn soft_delete_activity(&self, id: &str, deleted_at: &DateTime<Utc>) -> Result<bool> {
        DatabaseManager::soft_delete_activity(self, id, deleted_at)
    }

    fn list_deleted_activity_ids(&self) -> Result<Vec<String>> {
        DatabaseManager::list_deleted_activity_ids(self)
    }

    fn insert_recording(&self, recording: &AudioRecording) -> Result<()> {
        DatabaseManager::insert_recording(self, recording)
    }

    fn get_recording(&self, id: &str) -> Result<Option<AudioRecording>> {
        DatabaseManager::get_recording(self, id)
    }

    fn update_recording(&self, recording: &AudioRecording) -> Result<()> {
        DatabaseManager::update_recording(self, recording)
    }

    fn list_recordings_for_activity(&self, activity_id: &str) -> Result<Vec<AudioRecording>> {
        DatabaseManager::list_recordings_for_activity(self, activity_id)
    }

    fn list_recordings_by_status(
        &self,
        user_id: Option<&str>,
        status: RecordingStatus,
    ) -> Result<Vec<AudioRecording>> {
        DatabaseManager::list_recordings_by_status(self, user_id, status)
    }

    fn list_live_recording_paths(&self) -> Result<Vec<String>> {
        DatabaseManager::list_live_recording_paths(self)
    }

    fn insert_transcript_chunks(&self, chunks: &[TranscriptChunk]) -> Result<()> {
        DatabaseManager::insert_transcript_chunks(self, chunks)
    }

    fn last_transcript_chunk(&self, recording_id: &str) -> Result<Option<TranscriptChunk>> {
        DatabaseManager::last_transcript_chunk(self, recording_id)
    }

    fn list_chunks_for_recording(&self, recording_id: &str) -> Result<Vec<TranscriptChunk>> {
        DatabaseManager::list_chunks_for_recording(self, recording_id)
    }

    fn list_chunks_for_activity(&self, activity_id: &str) -> Result<Vec<TranscriptChunk>> {
        DatabaseManager::list_chunks_for_activity(self, activity_id)
    }

    fn search_transcripts(
        &self,
        user_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<TranscriptMatch>> {
        DatabaseManager::search_transcripts(self, user_id, query, options)
    }
}
