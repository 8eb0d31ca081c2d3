//! Async command surface
//!
//! Every command runs its blocking work on the tokio blocking pool and hands
//! back either the value or an [`ErrorResponse`].

use std::sync::Arc;
use std::time::Instant;

use crate::database::{
    Activity, AudioDeviceInfo, AudioRecording, ListOptions, NewTranscriptChunk, SearchOptions,
    TranscriptChunk, TranscriptMatch, UserSettings,
};
use crate::error::{CoreResult, ErrorResponse};
use crate::perf_trace;
use crate::services::{DeleteOutcome, RecordingSession};
use crate::state::{AppState, AppStatus, MaintenanceReport};

async fn run_blocking<T, F>(state: &Arc<AppState>, name: &'static str, f: F) -> Result<T, ErrorResponse>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> CoreResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            log::error!("Command {} panicked or was cancelled: {}", name, e);
            ErrorResponse {
                code: "INTERNAL_ERROR".to_string(),
                message: format!("Task failed: {}", e),
            }
        })?;
    perf_trace!("Command {} took {:?}", name, started.elapsed());

    result.map_err(|e| {
        log::warn!("Command {} failed: {}", name, e);
        ErrorResponse::from(e)
    })
}

// ============== Activities ==============

pub async fn create_activity(
    state: &Arc<AppState>,
    activity_type: String,
    title: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "create_activity", move |s| s.create_activity(&activity_type, &title)).await
}

pub async fn get_activities(state: &Arc<AppState>) -> Result<Vec<Activity>, ErrorResponse> {
    run_blocking(state, "get_activities", |s| s.get_activities()).await
}

pub async fn list_activities(
    state: &Arc<AppState>,
    options: ListOptions,
) -> Result<Vec<Activity>, ErrorResponse> {
    run_blocking(state, "list_activities", move |s| s.list_activities(&options)).await
}

pub async fn get_activity(state: &Arc<AppState>, id: String) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "get_activity", move |s| s.get_activity(&id)).await
}

pub async fn start_activity(state: &Arc<AppState>, id: String) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "start_activity", move |s| s.start_activity(&id)).await
}

pub async fn stop_activity(state: &Arc<AppState>, id: String) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "stop_activity", move |s| s.stop_activity(&id)).await
}

pub async fn delete_activity(state: &Arc<AppState>, id: String) -> Result<DeleteOutcome, ErrorResponse> {
    run_blocking(state, "delete_activity", move |s| s.delete_activity(&id)).await
}

pub async fn update_activity_title(
    state: &Arc<AppState>,
    id: String,
    title: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "update_activity_title", move |s| s.update_activity_title(&id, &title)).await
}

pub async fn update_activity_type(
    state: &Arc<AppState>,
    id: String,
    activity_type: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "update_activity_type", move |s| s.update_activity_type(&id, &activity_type)).await
}

pub async fn add_activity_tag(
    state: &Arc<AppState>,
    id: String,
    tag: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "add_activity_tag", move |s| s.add_activity_tag(&id, &tag)).await
}

pub async fn remove_activity_tag(
    state: &Arc<AppState>,
    id: String,
    tag: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "remove_activity_tag", move |s| s.remove_activity_tag(&id, &tag)).await
}

pub async fn set_activity_metadata(
    state: &Arc<AppState>,
    id: String,
    key: String,
    value: serde_json::Value,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "set_activity_metadata", move |s| s.set_activity_metadata(&id, &key, value)).await
}

pub async fn complete_activity_processing(
    state: &Arc<AppState>,
    id: String,
) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "complete_activity_processing", move |s| s.complete_activity_processing(&id)).await
}

pub async fn fail_activity(state: &Arc<AppState>, id: String) -> Result<Activity, ErrorResponse> {
    run_blocking(state, "fail_activity", move |s| s.fail_activity(&id)).await
}

// ============== Recording ==============

/// Start recording, optionally into an existing activity. The recording
/// indicator is raised only once the session exists.
pub async fn start_recording(
    state: &Arc<AppState>,
    activity_id: Option<String>,
    device_id: Option<String>,
) -> Result<RecordingSession, ErrorResponse> {
    let session = run_blocking(state, "start_recording", move |s| {
        s.start_recording_with_device(activity_id.as_deref(), device_id.as_deref())
    })
    .await?;
    state.indicator().set(true);
    Ok(session)
}

/// Stop a recording. The indicator is cleared whatever the outcome.
pub async fn stop_recording(
    state: &Arc<AppState>,
    recording_id: String,
) -> Result<AudioRecording, ErrorResponse> {
    let result = run_blocking(state, "stop_recording", move |s| s.stop_recording(&recording_id)).await;
    state.indicator().set(false);
    result
}

pub async fn get_active_recording(state: &Arc<AppState>) -> Result<Option<AudioRecording>, ErrorResponse> {
    run_blocking(state, "get_active_recording", |s| s.get_active_recording()).await
}

pub async fn is_recording(state: &Arc<AppState>) -> bool {
    state.indicator().is_recording()
}

pub async fn list_recordings(
    state: &Arc<AppState>,
    activity_id: String,
) -> Result<Vec<AudioRecording>, ErrorResponse> {
    run_blocking(state, "list_recordings", move |s| s.list_recordings(&activity_id)).await
}

pub async fn get_audio_devices(state: &Arc<AppState>) -> Result<Vec<AudioDeviceInfo>, ErrorResponse> {
    run_blocking(state, "get_audio_devices", |s| Ok(s.get_audio_devices())).await
}

// ============== Transcripts ==============

pub async fn append_transcript(
    state: &Arc<AppState>,
    recording_id: String,
    chunks: Vec<NewTranscriptChunk>,
) -> Result<Vec<TranscriptChunk>, ErrorResponse> {
    run_blocking(state, "append_transcript", move |s| s.append_transcript(&recording_id, &chunks)).await
}

pub async fn get_transcript(
    state: &Arc<AppState>,
    activity_id: String,
) -> Result<Vec<TranscriptChunk>, ErrorResponse> {
    run_blocking(state, "get_transcript", move |s| s.get_transcript(&activity_id)).await
}

pub async fn search_transcripts(
    state: &Arc<AppState>,
    query: String,
    options: Option<SearchOptions>,
) -> Result<Vec<TranscriptMatch>, ErrorResponse> {
    run_blocking(state, "search_transcripts", move |s| {
        s.search_transcripts_with(&query, &options.unwrap_or_default())
    })
    .await
}

// ============== User & status ==============

pub async fn get_user_settings(state: &Arc<AppState>) -> Result<UserSettings, ErrorResponse> {
    run_blocking(state, "get_user_settings", |s| Ok(s.get_user_settings())).await
}

pub async fn update_user_settings(
    state: &Arc<AppState>,
    settings: UserSettings,
) -> Result<UserSettings, ErrorResponse> {
    run_blocking(state, "update_user_settings", move |s| s.update_user_settings(settings)).await
}

pub async fn get_app_status(state: &Arc<AppState>) -> Result<AppStatus, ErrorResponse> {
    run_blocking(state, "get_app_status", |s| s.get_app_status()).await
}

pub async fn run_maintenance(state: &Arc<AppState>) -> Result<MaintenanceReport, ErrorResponse> {
    run_blocking(state, "run_maintenance", |s| s.run_maintenance()).await
}
