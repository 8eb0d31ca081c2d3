//! Recording sessions
//!
//! A user has at most one recording in status `recording`. The check and the
//! allocation happen in one critical section on the user's lock, with the
//! active recording id cached in the user's [`RecordingSlot`]. The slot is
//! loaded from the database the first time a user is seen, and rebuilt if the
//! lock was poisoned.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::database::codec::utc_now;
use crate::database::{
    Activity, ActivityMetadata, ActivityStatus, ActivityType, AudioDeviceInfo, AudioRecording,
    FailureReason, PersistenceGateway, RecordingConfig, RecordingStatus,
};
use crate::devices::{fallback_device, DeviceProvider};
use crate::error::{CoreError, CoreResult};
use crate::logging::LogContext;
use crate::storage::FileStore;

use super::{ActivityManager, RecordingSlot, UserLocks};

/// Handle returned when a recording starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    pub activity: Activity,
    pub recording: AudioRecording,
    /// Absolute path the capture process should write to
    pub file_path: PathBuf,
}

pub struct RecordingCoordinator {
    db: Arc<dyn PersistenceGateway>,
    files: Arc<FileStore>,
    activities: Arc<ActivityManager>,
    devices: Arc<dyn DeviceProvider>,
    user_locks: Arc<UserLocks>,
    default_config: RecordingConfig,
    log: LogContext,
}

impl RecordingCoordinator {
    pub fn new(
        db: Arc<dyn PersistenceGateway>,
        files: Arc<FileStore>,
        activities: Arc<ActivityManager>,
        devices: Arc<dyn DeviceProvider>,
        user_locks: Arc<UserLocks>,
        default_config: RecordingConfig,
        log: LogContext,
    ) -> Self {
        Self {
            db,
            files,
            activities,
            devices,
            user_locks,
            default_config,
            log,
        }
    }

    /// Start recording for `user_id`.
    ///
    /// Without an activity id a new `other` activity is created for the take.
    /// Fails with `Conflict` and changes nothing if the user already has a
    /// recording in progress.
    pub fn start_recording(
        &self,
        user_id: &str,
        activity_id: Option<&str>,
        device_id: Option<&str>,
    ) -> CoreResult<RecordingSession> {
        let device = self.resolve_device(device_id)?;

        self.user_locks.with_lock(user_id, |slot| {
            self.load_slot(user_id, slot)?;
            if let Some(active) = &slot.active_recording_id {
                log::debug!(
                    target: self.log.target(),
                    "Refusing to start: recording {} already in progress for user {}",
                    active, user_id
                );
                return Err(CoreError::Conflict("recording already in progress".into()));
            }

            let (activity, implicit) = match activity_id {
                Some(id) => (self.prepare_activity(user_id, id)?, false),
                None => (self.create_implicit_activity(user_id)?, true),
            };
            let owning_activity_id = activity.id.clone();

            match self.begin(activity, device) {
                Ok(session) => {
                    slot.active_recording_id = Some(session.recording.id.clone());
                    log::info!(
                        target: self.log.target(),
                        "Recording {} started for activity {} -> {:?}",
                        session.recording.id, session.activity.id, session.file_path
                    );
                    Ok(session)
                }
                Err(e) => {
                    log::error!(
                        target: self.log.target(),
                        "Failed to start recording for activity {}: {}",
                        owning_activity_id, e
                    );
                    if implicit {
                        self.abandon_activity(&owning_activity_id);
                    }
                    Err(e)
                }
            }
        })
    }

    /// Finalize a recording. Idempotent: stopping a recording that already
    /// ended succeeds and only reconciles its activity.
    pub fn stop_recording(&self, recording_id: &str) -> CoreResult<AudioRecording> {
        let user_id = self.get_recording(recording_id)?.user_id;

        self.user_locks.with_lock(&user_id, |slot| {
            self.load_slot(&user_id, slot)?;
            let recording = self.get_recording(recording_id)?;

            if recording.status.is_terminal() {
                if slot.active_recording_id.as_deref() == Some(recording_id) {
                    slot.active_recording_id = None;
                }
                self.reconcile_activity(&recording.activity_id);
                return Ok(recording);
            }

            let recording = self.finalize(recording)?;
            slot.active_recording_id = None;

            log::info!(
                target: self.log.target(),
                "Recording {} stopped: {} ({:.1}s, {} bytes)",
                recording.id, recording.status.as_str(), recording.duration_seconds, recording.file_size
            );

            self.reconcile_activity(&recording.activity_id);
            Ok(recording)
        })
    }

    /// The user's in-flight recording, if any
    pub fn get_active_recording(&self, user_id: &str) -> CoreResult<Option<AudioRecording>> {
        self.user_locks.with_lock(user_id, |slot| {
            self.load_slot(user_id, slot)?;
            match &slot.active_recording_id {
                Some(id) => Ok(self.db.get_recording(id)?),
                None => Ok(None),
            }
        })
    }

    pub fn get_recording(&self, recording_id: &str) -> CoreResult<AudioRecording> {
        self.db
            .get_recording(recording_id)?
            .ok_or_else(|| CoreError::not_found("AudioRecording", recording_id))
    }

    pub fn list_recordings(&self, activity_id: &str) -> CoreResult<Vec<AudioRecording>> {
        self.activities.get(activity_id)?;
        Ok(self.db.list_recordings_for_activity(activity_id)?)
    }

    /// Devices known to the provider, or the built-in fallback if it fails
    pub fn list_devices(&self) -> Vec<AudioDeviceInfo> {
        match self.devices.list_devices() {
            Ok(devices) if !devices.is_empty() => devices,
            Ok(_) => vec![fallback_device()],
            Err(e) => {
                log::warn!(target: self.log.target(), "Failed to list audio devices: {:#}", e);
                vec![fallback_device()]
            }
        }
    }

    pub fn resolve_device(&self, device_id: Option<&str>) -> CoreResult<AudioDeviceInfo> {
        match device_id {
            Some(id) => self
                .list_devices()
                .into_iter()
                .find(|d| d.device_id == id)
                .ok_or_else(|| CoreError::not_found("AudioDevice", id)),
            None => Ok(self.devices.default_device().unwrap_or_else(|e| {
                log::warn!(target: self.log.target(), "No default audio device ({:#}), using fallback", e);
                fallback_device()
            })),
        }
    }

    /// Mark every recording left in `recording` by a previous process as
    /// failed, and fail activities that were left recording because of it.
    /// Returns the number of recordings reconciled.
    ///
    /// Meant to run once at startup, before any session is started. A
    /// recording this coordinator is tracking as in progress is never touched.
    pub(crate) fn reconcile_stale_recordings(&self) -> CoreResult<usize> {
        let stale = self.db.list_recordings_by_status(None, RecordingStatus::Recording)?;
        let mut reconciled = 0;

        for candidate in stale {
            let user_id = candidate.user_id.clone();
            let result = self.user_locks.with_lock(&user_id, |slot| {
                if slot.loaded && slot.active_recording_id.as_deref() == Some(candidate.id.as_str()) {
                    log::debug!(
                        target: self.log.target(),
                        "Recording {} is in progress in this process, not stale",
                        candidate.id
                    );
                    return Ok(false);
                }
                let changed = self.fail_stale(&candidate.id)?;
                if changed {
                    *slot = RecordingSlot::default();
                }
                Ok::<_, CoreError>(changed)
            });

            match result {
                Ok(true) => reconciled += 1,
                Ok(false) => {}
                Err(e) => log::error!(
                    target: self.log.target(),
                    "Failed to reconcile stale recording {}: {}",
                    candidate.id, e
                ),
            }
        }

        if reconciled > 0 {
            log::warn!(target: self.log.target(), "Marked {} stale recordings as failed", reconciled);
        }
        Ok(reconciled)
    }

    fn load_slot(&self, user_id: &str, slot: &mut RecordingSlot) -> CoreResult<()> {
        if slot.loaded {
            return Ok(());
        }

        let live = self.db.list_recordings_by_status(Some(user_id), RecordingStatus::Recording)?;
        if live.len() > 1 {
            log::error!(
                target: self.log.target(),
                "User {} has {} recordings in progress; tracking the newest",
                user_id, live.len()
            );
        }
        slot.active_recording_id = live.last().map(|r| r.id.clone());
        slot.loaded = true;
        Ok(())
    }

    /// Resolve a caller-supplied activity and bring it to `active`
    fn prepare_activity(&self, user_id: &str, activity_id: &str) -> CoreResult<Activity> {
        let activity = self.activities.get(activity_id)?;
        if activity.user_id != user_id {
            return Err(CoreError::not_found("Activity", activity_id));
        }

        match activity.status {
            ActivityStatus::Scheduled | ActivityStatus::Active => self.activities.start_locked(activity),
            other => Err(CoreError::InvalidState(format!(
                "cannot record into activity {} in status {}",
                activity.id,
                other.as_str()
            ))),
        }
    }

    fn create_implicit_activity(&self, user_id: &str) -> CoreResult<Activity> {
        let title = format!("Recording {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let activity = self.activities.create_with(
            user_id,
            ActivityType::Other,
            title,
            ActivityMetadata::implicit_recording(),
        )?;
        self.activities.start_locked(activity)
    }

    /// Allocate the file, write the row, flip the activity to `recording`
    fn begin(&self, activity: Activity, device: AudioDeviceInfo) -> CoreResult<RecordingSession> {
        let allocated = self
            .files
            .allocate_audio_path(&activity.id, &self.default_config.format)?;

        let config = RecordingConfig {
            sample_rate: device.sample_rate,
            channels: device.channels,
            ..self.default_config.clone()
        };
        let recording = AudioRecording::new(
            &activity.id,
            &activity.user_id,
            device,
            allocated.relative.clone(),
            config,
        );

        if let Err(e) = self.db.insert_recording(&recording) {
            if let Err(remove_err) = std::fs::remove_file(&allocated.absolute) {
                log::warn!(
                    target: self.log.target(),
                    "Failed to remove reserved file {:?}: {}",
                    allocated.absolute, remove_err
                );
            }
            return Err(e.into());
        }

        let activity = match self.activities.mark_recording_locked(activity) {
            Ok(activity) => activity,
            Err(e) => {
                let mut failed = recording;
                failed.status = RecordingStatus::Failed;
                failed.metadata.failure_reason = Some(FailureReason::StartFailed);
                failed.end_time = Some(utc_now());
                failed.updated_at = utc_now();
                if let Err(update_err) = self.db.update_recording(&failed) {
                    log::error!(
                        target: self.log.target(),
                        "Failed to mark recording {} as failed: {}",
                        failed.id, update_err
                    );
                }
                return Err(e);
            }
        };

        Ok(RecordingSession {
            activity,
            recording,
            file_path: allocated.absolute,
        })
    }

    /// Fill in end time, duration and size; a missing or empty file fails the take
    fn finalize(&self, mut recording: AudioRecording) -> CoreResult<AudioRecording> {
        let end = utc_now();
        recording.end_time = Some(end);
        recording.duration_seconds = elapsed_seconds(&recording, end);
        recording.updated_at = end;

        match self.files.file_size(&recording.file_path) {
            Ok(Some(size)) if size > 0 => {
                recording.file_size = i64::try_from(size).unwrap_or(i64::MAX);
                recording.status = RecordingStatus::Completed;
            }
            Ok(_) => {
                log::warn!(
                    target: self.log.target(),
                    "Recording {} has no audio at {}",
                    recording.id, recording.file_path
                );
                recording.file_size = 0;
                recording.status = RecordingStatus::Failed;
                recording.metadata.failure_reason = Some(FailureReason::EmptyRecording);
            }
            Err(e) => {
                log::warn!(
                    target: self.log.target(),
                    "Recording {} file could not be read: {}",
                    recording.id, e
                );
                recording.status = RecordingStatus::Failed;
                recording.metadata.failure_reason = Some(FailureReason::FileUnreadable);
            }
        }

        self.db.update_recording(&recording)?;
        Ok(recording)
    }

    fn fail_stale(&self, recording_id: &str) -> CoreResult<bool> {
        let mut recording = match self.db.get_recording(recording_id)? {
            Some(r) if r.is_live() => r,
            _ => return Ok(false),
        };

        let end = utc_now();
        recording.end_time = Some(end);
        recording.duration_seconds = elapsed_seconds(&recording, end);
        recording.updated_at = end;
        recording.file_size = match self.files.file_size(&recording.file_path) {
            Ok(Some(size)) => i64::try_from(size).unwrap_or(i64::MAX),
            _ => 0,
        };
        recording.status = RecordingStatus::Failed;
        recording.metadata.failure_reason = Some(FailureReason::StaleOnStartup);
        self.db.update_recording(&recording)?;

        if let Some(activity) = self.db.get_activity(&recording.activity_id)? {
            let still_recording = activity.status == ActivityStatus::Recording
                || activity.status == ActivityStatus::Processing;
            if still_recording && !self.activities.has_live_recording(&activity.id)? {
                self.activities.mark_failed_locked(activity)?;
            }
        }

        log::warn!(
            target: self.log.target(),
            "Recording {} was still marked recording at startup; marked failed",
            recording.id
        );
        Ok(true)
    }

    /// Bring the owning activity in line after a recording ended. Best-effort:
    /// a later stop call will try again.
    fn reconcile_activity(&self, activity_id: &str) {
        let activity = match self.db.get_activity(activity_id) {
            Ok(Some(activity)) if !activity.is_deleted() => activity,
            Ok(_) => return,
            Err(e) => {
                log::warn!(target: self.log.target(), "Failed to load activity {}: {:#}", activity_id, e);
                return;
            }
        };

        if !matches!(activity.status, ActivityStatus::Recording | ActivityStatus::Processing) {
            return;
        }
        if let Err(e) = self.activities.stop_locked(activity) {
            log::warn!(target: self.log.target(), "Failed to stop activity {}: {}", activity_id, e);
        }
    }

    /// Mark an activity created for a failed start as failed
    fn abandon_activity(&self, activity_id: &str) {
        let result = self
            .activities
            .get(activity_id)
            .and_then(|activity| self.activities.mark_failed_locked(activity));
        if let Err(e) = result {
            log::error!(
                target: self.log.target(),
                "Failed to mark activity {} as failed: {}",
                activity_id, e
            );
        }
    }
}

fn elapsed_seconds(recording: &AudioRecording, end: chrono::DateTime<chrono::Utc>) -> f64 {
    let millis = (end - recording.start_time).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseManager, DeviceType, User};
    use crate::devices::StaticDeviceProvider;
    use std::fs;
    use std::sync::Barrier;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        db: Arc<DatabaseManager>,
        files: Arc<FileStore>,
        activities: Arc<ActivityManager>,
        coordinator: RecordingCoordinator,
        user: User,
    }

    fn setup_with_devices(devices: Arc<dyn DeviceProvider>) -> Fixture {
        let dir = tempdir().unwrap();
        let db = Arc::new(DatabaseManager::new(dir.path().join("test.db")).unwrap());
        let files = Arc::new(FileStore::new(dir.path().join("data"), LogContext::new("files")));
        files.ensure_directories().unwrap();
        let user = User::new("tester");
        db.create_user(&user).unwrap();

        let locks = Arc::new(UserLocks::new("user"));
        let activities = Arc::new(ActivityManager::new(
            db.clone(),
            files.clone(),
            locks.clone(),
            LogContext::new("activities"),
        ));
        let coordinator = RecordingCoordinator::new(
            db.clone(),
            files.clone(),
            activities.clone(),
            devices,
            locks,
            RecordingConfig::default(),
            LogContext::new("recordings"),
        );
        Fixture { _dir: dir, db, files, activities, coordinator, user }
    }

    fn setup() -> Fixture {
        setup_with_devices(Arc::new(StaticDeviceProvider::default()))
    }

    fn write_audio(session: &RecordingSession) {
        fs::write(&session.file_path, vec![7u8; 2048]).unwrap();
    }

    #[test]
    fn test_start_and_stop_round_trip() {
        let f = setup();
        let activity = f.activities.create(&f.user.id, "meeting", "Standup").unwrap();

        let session = f.coordinator.start_recording(&f.user.id, Some(&activity.id), None).unwrap();
        assert_eq!(session.recording.status, RecordingStatus::Recording);
        assert_eq!(session.activity.status, ActivityStatus::Recording);
        assert!(session.file_path.is_file());
        assert_eq!(f.activities.get(&activity.id).unwrap().status, ActivityStatus::Recording);

        write_audio(&session);
        let stopped = f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(stopped.status, RecordingStatus::Completed);
        assert_eq!(stopped.file_size, 2048);
        assert!(stopped.end_time.is_some());
        assert!(stopped.duration_seconds >= 0.0);

        let activity = f.activities.get(&activity.id).unwrap();
        assert_eq!(activity.status, ActivityStatus::Completed);
        assert!(f.coordinator.get_active_recording(&f.user.id).unwrap().is_none());
    }

    #[test]
    fn test_second_start_conflicts_without_mutation() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        let before = f.activities.list(&f.user.id, &Default::default()).unwrap().len();

        let other = f.activities.create(&f.user.id, "call", "Other").unwrap();
        let err = f.coordinator.start_recording(&f.user.id, Some(&other.id), None).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(ref m) if m == "recording already in progress"));
        assert!(matches!(
            f.coordinator.start_recording(&f.user.id, None, None),
            Err(CoreError::Conflict(_))
        ));

        assert_eq!(f.activities.get(&other.id).unwrap().status, ActivityStatus::Scheduled);
        assert_eq!(f.activities.list(&f.user.id, &Default::default()).unwrap().len(), before + 1);
        assert_eq!(
            f.coordinator.get_active_recording(&f.user.id).unwrap().unwrap().id,
            session.recording.id
        );
    }

    #[test]
    fn test_concurrent_starts_yield_exactly_one_success() {
        let f = setup();
        let activity = f.activities.create(&f.user.id, "meeting", "Race").unwrap();
        let barrier = Barrier::new(8);

        let results: Vec<CoreResult<RecordingSession>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let f = &f;
                    let barrier = &barrier;
                    let activity_id = activity.id.clone();
                    s.spawn(move || {
                        barrier.wait();
                        if i % 2 == 0 {
                            f.coordinator.start_recording(&f.user.id, Some(&activity_id), None)
                        } else {
                            f.coordinator.start_recording(&f.user.id, None, None)
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);

        let live = f.db.list_recordings_by_status(Some(&f.user.id), RecordingStatus::Recording).unwrap();
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn test_users_record_independently() {
        let f = setup();
        let other = User::new("second");
        f.db.create_user(&other).unwrap();

        f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        f.coordinator.start_recording(&other.id, None, None).unwrap();
        assert!(f.coordinator.get_active_recording(&other.id).unwrap().is_some());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        write_audio(&session);

        let first = f.coordinator.stop_recording(&session.recording.id).unwrap();
        let second = f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.activities.get(&session.activity.id).unwrap().status, ActivityStatus::Completed);
    }

    #[test]
    fn test_stop_unknown_recording() {
        let f = setup();
        assert!(matches!(f.coordinator.stop_recording("nope"), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_empty_file_fails_recording_but_not_activity() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();

        let stopped = f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(stopped.status, RecordingStatus::Failed);
        assert_eq!(stopped.failure_reason(), Some(FailureReason::EmptyRecording));
        assert_eq!(f.activities.get(&session.activity.id).unwrap().status, ActivityStatus::Completed);

        // The user is free to record again
        assert!(f.coordinator.start_recording(&f.user.id, None, None).is_ok());
    }

    #[test]
    fn test_missing_file_counts_as_empty() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        fs::remove_file(&session.file_path).unwrap();

        let stopped = f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(stopped.failure_reason(), Some(FailureReason::EmptyRecording));
    }

    #[test]
    fn test_implicit_activity_metadata() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        assert_eq!(session.activity.activity_type, ActivityType::Other);
        assert!(session.activity.title.starts_with("Recording "));
        assert_eq!(session.activity.metadata, ActivityMetadata::implicit_recording());
        assert!(session.recording.file_path.starts_with(&format!("activities/{}/audio/", session.activity.id)));
        assert_eq!(session.recording.device, fallback_device());
    }

    #[test]
    fn test_start_rejects_terminal_or_deleted_activity() {
        let f = setup();
        let done = f.activities.create(&f.user.id, "call", "Done").unwrap();
        f.activities.stop(&done.id).unwrap();
        assert!(matches!(
            f.coordinator.start_recording(&f.user.id, Some(&done.id), None),
            Err(CoreError::InvalidState(_))
        ));

        let gone = f.activities.create(&f.user.id, "call", "Gone").unwrap();
        f.activities.delete(&gone.id).unwrap();
        assert!(matches!(
            f.coordinator.start_recording(&f.user.id, Some(&gone.id), None),
            Err(CoreError::NotFound { .. })
        ));
        assert!(f.coordinator.get_active_recording(&f.user.id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let f = setup();
        assert!(matches!(
            f.coordinator.start_recording(&f.user.id, None, Some("usb-42")),
            Err(CoreError::NotFound { entity: "AudioDevice", .. })
        ));
        assert!(f.activities.list(&f.user.id, &Default::default()).unwrap().is_empty());
    }

    #[test]
    fn test_selected_device_is_recorded() {
        let usb = AudioDeviceInfo {
            device_id: "usb-1".into(),
            name: "USB Mic".into(),
            sample_rate: 48000,
            channels: 1,
            device_type: DeviceType::Microphone,
        };
        let f = setup_with_devices(Arc::new(StaticDeviceProvider::new(vec![fallback_device(), usb.clone()])));
        let session = f.coordinator.start_recording(&f.user.id, None, Some("usb-1")).unwrap();
        assert_eq!(session.recording.device, usb);
        assert_eq!(session.recording.sample_rate, 48000);
        assert_eq!(session.recording.channels, 1);
    }

    #[test]
    fn test_failed_allocation_marks_implicit_activity_failed() {
        let f = setup();
        // A file where the activities directory should be makes allocation fail
        fs::remove_dir_all(f.files.activities_dir()).unwrap();
        fs::write(f.files.activities_dir(), b"blocker").unwrap();

        let err = f.coordinator.start_recording(&f.user.id, None, None).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));

        let activities = f.activities.list(&f.user.id, &Default::default()).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].status, ActivityStatus::Failed);
        assert!(f.coordinator.get_active_recording(&f.user.id).unwrap().is_none());
    }

    #[test]
    fn test_stop_activity_mid_recording_then_stop_recording() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        assert_eq!(
            f.activities.stop(&session.activity.id).unwrap().status,
            ActivityStatus::Processing
        );

        write_audio(&session);
        f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(f.activities.get(&session.activity.id).unwrap().status, ActivityStatus::Completed);
    }

    #[test]
    fn test_terminal_stop_reconciles_lagging_activity() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();

        // Simulate a crash between finalizing the row and updating the activity
        let mut recording = session.recording.clone();
        recording.status = RecordingStatus::Completed;
        f.db.update_recording(&recording).unwrap();

        f.coordinator.stop_recording(&recording.id).unwrap();
        assert_eq!(f.activities.get(&session.activity.id).unwrap().status, ActivityStatus::Completed);
        assert!(f.coordinator.get_active_recording(&f.user.id).unwrap().is_none());
    }

    #[test]
    fn test_reconcile_stale_recordings() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        write_audio(&session);

        // A fresh coordinator over the same database stands in for a restart
        let restarted = setup_like(&f);
        assert_eq!(restarted.reconcile_stale_recordings().unwrap(), 1);
        assert_eq!(restarted.reconcile_stale_recordings().unwrap(), 0);

        let recording = f.db.get_recording(&session.recording.id).unwrap().unwrap();
        assert_eq!(recording.status, RecordingStatus::Failed);
        assert_eq!(recording.failure_reason(), Some(FailureReason::StaleOnStartup));
        assert_eq!(recording.file_size, 2048);

        let activity = f.db.get_activity(&session.activity.id).unwrap().unwrap();
        assert_eq!(activity.status, ActivityStatus::Failed);
        assert!(restarted.get_active_recording(&f.user.id).unwrap().is_none());
    }

    #[test]
    fn test_reconcile_leaves_own_session_alone() {
        let f = setup();
        let session = f.coordinator.start_recording(&f.user.id, None, None).unwrap();
        write_audio(&session);

        assert_eq!(f.coordinator.reconcile_stale_recordings().unwrap(), 0);

        let recording = f.db.get_recording(&session.recording.id).unwrap().unwrap();
        assert_eq!(recording.status, RecordingStatus::Recording);
        assert_eq!(f.activities.get(&session.activity.id).unwrap().status, ActivityStatus::Recording);
        assert!(matches!(
            f.coordinator.start_recording(&f.user.id, None, None),
            Err(CoreError::Conflict(_))
        ));

        let stopped = f.coordinator.stop_recording(&session.recording.id).unwrap();
        assert_eq!(stopped.status, RecordingStatus::Completed);
    }

    fn setup_like(f: &Fixture) -> RecordingCoordinator {
        let locks = Arc::new(UserLocks::new("user"));
        let activities = Arc::new(ActivityManager::new(
            f.db.clone(),
            f.files.clone(),
            locks.clone(),
            LogContext::new("activities"),
        ));
        RecordingCoordinator::new(
            f.db.clone(),
            f.files.clone(),
            activities,
            Arc::new(StaticDeviceProvider::default()),
            locks,
            RecordingConfig::default(),
            LogContext::new("recordings"),
        )
    }
}
