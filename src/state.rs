// Application state
// Wires the lifecycle services together and exposes the operations the
// presentation layer calls

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::database::{
    Activity, AudioDeviceInfo, AudioRecording, DatabaseManager, ListOptions, NewTranscriptChunk,
    PersistenceGateway, RecordingConfig, SearchOptions, TranscriptChunk, TranscriptMatch, User,
    UserSettings,
};
use crate::devices::{DeviceProvider, StaticDeviceProvider};
use crate::error::{CoreError, CoreResult};
use crate::logging::LogContext;
use crate::perf_debug;
use crate::services::{
    ActivityManager, DeleteOutcome, RecordingCoordinator, RecordingSession, TranscriptStore,
    UserLocks,
};
use crate::storage::{CleanupReport, FileStore};

/// Orphaned files younger than this are left alone by maintenance
const ORPHAN_MIN_AGE: Duration = Duration::from_secs(60);

/// Caller-side "is recording" flag. Cleared on every stop attempt, whatever
/// the backend reports.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    flag: AtomicBool,
}

impl RecordingIndicator {
    pub fn is_recording(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool) {
        self.flag.store(value, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub deleted_dirs_removed: usize,
    pub deleted_dir_failures: usize,
    pub orphans: CleanupReport,
    pub expired: Option<CleanupReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatus {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub disk_usage_bytes: u64,
    pub user: User,
    pub active_recording: Option<AudioRecording>,
    pub is_recording: bool,
}

pub struct AppState {
    config: AppConfig,
    db: Arc<DatabaseManager>,
    files: Arc<FileStore>,
    activities: Arc<ActivityManager>,
    recordings: RecordingCoordinator,
    transcripts: TranscriptStore,
    user: RwLock<User>,
    indicator: RecordingIndicator,
    recovered_recordings: usize,
    log: LogContext,
}

impl AppState {
    /// Open the data directory and database with the built-in device list
    pub fn open(config: AppConfig) -> CoreResult<Self> {
        Self::open_with_devices(config, Arc::new(StaticDeviceProvider::default()))
    }

    /// Open with a custom device provider. Recordings a previous process left
    /// in `recording` are failed here, before any session can start.
    pub fn open_with_devices(config: AppConfig, devices: Arc<dyn DeviceProvider>) -> CoreResult<Self> {
        let log = LogContext::new("app_state");

        let files = Arc::new(FileStore::new(&config.data_dir, LogContext::new("file_store")));
        files.ensure_directories()?;

        let db = Arc::new(DatabaseManager::init_with_config(&config)?);
        let user = load_or_create_user(db.as_ref())?;
        log::info!(target: log.target(), "Current user: {} ({})", user.username, user.id);

        let gateway: Arc<dyn PersistenceGateway> = db.clone();
        let user_locks = Arc::new(UserLocks::new("user"));
        let activities = Arc::new(ActivityManager::new(
            gateway.clone(),
            files.clone(),
            user_locks.clone(),
            LogContext::new("activity_manager"),
        ));
        let recordings = RecordingCoordinator::new(
            gateway.clone(),
            files.clone(),
            activities.clone(),
            devices,
            user_locks,
            RecordingConfig {
                format: config.default_format.clone(),
                ..RecordingConfig::default()
            },
            LogContext::new("recording_coordinator"),
        );
        let transcripts = TranscriptStore::new(gateway, LogContext::new("transcript_store"));

        let recovered_recordings = recordings.reconcile_stale_recordings()?;
        if recovered_recordings > 0 {
            log::warn!(
                target: log.target(),
                "Recovered {} recordings interrupted by a previous run",
                recovered_recordings
            );
        }

        Ok(Self {
            config,
            db,
            files,
            activities,
            recordings,
            transcripts,
            user: RwLock::new(user),
            indicator: RecordingIndicator::default(),
            recovered_recordings,
            log,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn indicator(&self) -> &RecordingIndicator {
        &self.indicator
    }

    /// Recordings failed as `stale_on_startup` when this state was opened
    pub fn recovered_recordings(&self) -> usize {
        self.recovered_recordings
    }

    pub fn current_user(&self) -> User {
        self.user.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn user_id(&self) -> String {
        self.user.read().unwrap_or_else(|p| p.into_inner()).id.clone()
    }

    // ===== Activities =====

    pub fn create_activity(&self, activity_type: &str, title: &str) -> CoreResult<Activity> {
        self.activities.create(&self.user_id(), activity_type, title)
    }

    pub fn get_activities(&self) -> CoreResult<Vec<Activity>> {
        self.list_activities(&ListOptions::default())
    }

    pub fn list_activities(&self, options: &ListOptions) -> CoreResult<Vec<Activity>> {
        self.activities.list(&self.user_id(), options)
    }

    pub fn get_activity(&self, id: &str) -> CoreResult<Activity> {
        self.activities.get(id)
    }

    pub fn start_activity(&self, id: &str) -> CoreResult<Activity> {
        self.activities.start(id)
    }

    pub fn stop_activity(&self, id: &str) -> CoreResult<Activity> {
        self.activities.stop(id)
    }

    pub fn delete_activity(&self, id: &str) -> CoreResult<DeleteOutcome> {
        self.activities.delete(id)
    }

    pub fn update_activity_title(&self, id: &str, title: &str) -> CoreResult<Activity> {
        self.activities.update_title(id, title)
    }

    pub fn update_activity_type(&self, id: &str, activity_type: &str) -> CoreResult<Activity> {
        self.activities.update_type(id, activity_type)
    }

    pub fn add_activity_tag(&self, id: &str, tag: &str) -> CoreResult<Activity> {
        self.activities.add_tag(id, tag)
    }

    pub fn remove_activity_tag(&self, id: &str, tag: &str) -> CoreResult<Activity> {
        self.activities.remove_tag(id, tag)
    }

    pub fn set_activity_metadata(&self, id: &str, key: &str, value: serde_json::Value) -> CoreResult<Activity> {
        self.activities.set_metadata(id, key, value)
    }

    pub fn complete_activity_processing(&self, id: &str) -> CoreResult<Activity> {
        self.activities.complete_processing(id)
    }

    pub fn fail_activity(&self, id: &str) -> CoreResult<Activity> {
        self.activities.fail(id)
    }

    pub fn activity_disk_usage(&self, id: &str) -> CoreResult<u64> {
        self.activities.get(id)?;
        Ok(self.files.activity_disk_usage(id))
    }

    pub fn list_audio_files(&self, id: &str) -> CoreResult<Vec<PathBuf>> {
        self.activities.get(id)?;
        self.files.list_audio_files(id)
    }

    // ===== Recordings =====

    pub fn start_recording(&self, activity_id: Option<&str>) -> CoreResult<RecordingSession> {
        self.start_recording_with_device(activity_id, None)
    }

    /// Start recording on a specific device. Without one, the user's preferred
    /// device is used when it is still available, else the provider default.
    pub fn start_recording_with_device(
        &self,
        activity_id: Option<&str>,
        device_id: Option<&str>,
    ) -> CoreResult<RecordingSession> {
        let user = self.current_user();
        let preferred = match device_id {
            Some(id) => Some(id.to_string()),
            None => user
                .settings
                .preferred_audio_device
                .filter(|id| self.recordings.resolve_device(Some(id.as_str())).is_ok()),
        };
        self.recordings
            .start_recording(&user.id, activity_id, preferred.as_deref())
    }

    pub fn stop_recording(&self, recording_id: &str) -> CoreResult<AudioRecording> {
        self.recordings.stop_recording(recording_id)
    }

    pub fn get_active_recording(&self) -> CoreResult<Option<AudioRecording>> {
        self.recordings.get_active_recording(&self.user_id())
    }

    pub fn get_recording(&self, id: &str) -> CoreResult<AudioRecording> {
        self.recordings.get_recording(id)
    }

    pub fn list_recordings(&self, activity_id: &str) -> CoreResult<Vec<AudioRecording>> {
        self.recordings.list_recordings(activity_id)
    }

    pub fn get_audio_devices(&self) -> Vec<AudioDeviceInfo> {
        self.recordings.list_devices()
    }

    // ===== Transcripts =====

    pub fn append_transcript(
        &self,
        recording_id: &str,
        chunks: &[NewTranscriptChunk],
    ) -> CoreResult<Vec<TranscriptChunk>> {
        self.transcripts.append(recording_id, chunks)
    }

    pub fn get_transcript(&self, activity_id: &str) -> CoreResult<Vec<TranscriptChunk>> {
        self.transcripts.get_for_activity(activity_id)
    }

    pub fn get_recording_transcript(&self, recording_id: &str) -> CoreResult<Vec<TranscriptChunk>> {
        self.transcripts.get_for_recording(recording_id)
    }

    pub fn search_transcripts(&self, query: &str) -> CoreResult<Vec<TranscriptMatch>> {
        self.search_transcripts_with(query, &SearchOptions::default())
    }

    pub fn search_transcripts_with(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> CoreResult<Vec<TranscriptMatch>> {
        self.transcripts.search(&self.user_id(), query, options)
    }

    // ===== User =====

    pub fn get_user_settings(&self) -> UserSettings {
        self.current_user().settings
    }

    pub fn update_user_settings(&self, settings: UserSettings) -> CoreResult<UserSettings> {
        let mut user = self
            .user
            .write()
            .map_err(|e| CoreError::Storage(anyhow!("User state lock poisoned: {}", e)))?;
        self.db.update_user_settings(&user.id, &settings)?;
        user.settings = settings.clone();
        log::info!(target: self.log.target(), "Updated settings for user {}", user.id);
        Ok(settings)
    }

    // ===== Status & maintenance =====

    pub fn get_app_status(&self) -> CoreResult<AppStatus> {
        Ok(AppStatus {
            data_dir: self.config.data_dir.clone(),
            db_path: self.db.db_path().to_path_buf(),
            disk_usage_bytes: self.files.disk_usage(),
            user: self.current_user(),
            active_recording: self.get_active_recording()?,
            is_recording: self.indicator.is_recording(),
        })
    }

    /// File sweep: retry directory removal for deleted activities, reclaim
    /// orphaned audio and expire old files. Safe while recording; recording
    /// rows are never touched here.
    pub fn run_maintenance(&self) -> CoreResult<MaintenanceReport> {
        let started = Instant::now();
        let mut report = MaintenanceReport::default();

        for activity_id in self.db.list_deleted_activity_ids()? {
            if !self.files.activity_files_exist(&activity_id) {
                continue;
            }
            match self.files.delete_activity_files(&activity_id) {
                Ok(()) => report.deleted_dirs_removed += 1,
                Err(e) => {
                    log::warn!(
                        target: self.log.target(),
                        "Still unable to remove files of deleted activity {}: {}",
                        activity_id, e
                    );
                    report.deleted_dir_failures += 1;
                }
            }
        }

        let live: HashSet<PathBuf> = self
            .db
            .list_live_recording_paths()?
            .iter()
            .map(|relative| self.files.absolute_path(relative))
            .collect();

        report.orphans = self.files.reclaim_orphans(&live, ORPHAN_MIN_AGE);
        if let Some(retention) = self.config.file_retention {
            report.expired = Some(self.files.cleanup_old_files(retention, &live));
        }

        perf_debug!("Maintenance finished in {:?}: {:?}", started.elapsed(), report);
        Ok(report)
    }
}

/// The first user of this install, created on first launch
fn load_or_create_user(db: &DatabaseManager) -> CoreResult<User> {
    if let Some(user) = db.get_first_user()? {
        return Ok(user);
    }

    let username = dirs::home_dir()
        .and_then(|home| home.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "User".to_string());
    let user = User::new(username);
    db.create_user(&user)?;
    log::info!("Created user {} ({})", user.username, user.id);
    Ok(user)
}
