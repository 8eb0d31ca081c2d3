//! Activity lifecycle
//!
//! ```text
//! scheduled -> active -> recording -> processing -> completed | failed
//! scheduled -> completed                (stopped without ever recording)
//! ```
//!
//! Transitions only move forward; `completed` and `failed` are terminal.
//! Methods suffixed `_locked` expect the caller to already hold the owning
//! user's lock and are used by the recording coordinator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::database::codec::utc_now;
use crate::database::{
    Activity, ActivityMetadata, ActivityStatus, ActivityType, ListOptions, PersistenceGateway,
};
use crate::error::{CoreError, CoreResult};
use crate::logging::LogContext;
use crate::storage::FileStore;

use super::UserLocks;

/// Result of deleting an activity. The row is always soft-deleted; directory
/// removal is best-effort and retried by maintenance when it fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub activity_id: String,
    pub files_removed: bool,
    pub cleanup_error: Option<String>,
}

pub struct ActivityManager {
    db: Arc<dyn PersistenceGateway>,
    files: Arc<FileStore>,
    user_locks: Arc<UserLocks>,
    log: LogContext,
}

impl ActivityManager {
    pub fn new(
        db: Arc<dyn PersistenceGateway>,
        files: Arc<FileStore>,
        user_locks: Arc<UserLocks>,
        log: LogContext,
    ) -> Self {
        Self {
            db,
            files,
            user_locks,
            log,
        }
    }

    pub fn create(&self, user_id: &str, activity_type: &str, title: &str) -> CoreResult<Activity> {
        let activity_type = parse_activity_type(activity_type)?;
        let title = validate_title(title)?;
        self.create_with(user_id, activity_type, title, ActivityMetadata::default())
    }

    pub(crate) fn create_with(
        &self,
        user_id: &str,
        activity_type: ActivityType,
        title: String,
        metadata: ActivityMetadata,
    ) -> CoreResult<Activity> {
        let mut activity = Activity::new(user_id, activity_type, title);
        activity.metadata = metadata;
        self.db.insert_activity(&activity)?;

        log::info!(
            target: self.log.target(),
            "Created {} activity {} ({})",
            activity.activity_type.as_str(), activity.id, activity.title
        );
        Ok(activity)
    }

    /// Fetch a live activity; soft-deleted rows are reported as not found
    pub fn get(&self, id: &str) -> CoreResult<Activity> {
        self.db
            .get_activity(id)?
            .filter(|a| !a.is_deleted())
            .ok_or_else(|| CoreError::not_found("Activity", id))
    }

    pub fn list(&self, user_id: &str, options: &ListOptions) -> CoreResult<Vec<Activity>> {
        Ok(self.db.list_activities(user_id, options)?)
    }

    /// `scheduled -> active`; already active is a no-op
    pub fn start(&self, id: &str) -> CoreResult<Activity> {
        self.with_activity_locked(id, |activity| self.start_locked(activity))
    }

    pub(crate) fn start_locked(&self, activity: Activity) -> CoreResult<Activity> {
        match activity.status {
            ActivityStatus::Active => Ok(activity),
            ActivityStatus::Scheduled => self.transition(activity, ActivityStatus::Active),
            other => Err(CoreError::InvalidState(format!(
                "cannot start activity {} in status {}",
                activity.id,
                other.as_str()
            ))),
        }
    }

    /// Move a running activity to `completed`, or to `processing` while one of
    /// its recordings is still live. Terminal activities are left untouched.
    pub fn stop(&self, id: &str) -> CoreResult<Activity> {
        self.with_activity_locked(id, |activity| self.stop_locked(activity))
    }

    pub(crate) fn stop_locked(&self, mut activity: Activity) -> CoreResult<Activity> {
        if activity.status.is_terminal() {
            return Ok(activity);
        }

        let next = if self.has_live_recording(&activity.id)? {
            ActivityStatus::Processing
        } else {
            ActivityStatus::Completed
        };
        if activity.status == next {
            return Ok(activity);
        }

        activity.end_time.get_or_insert_with(utc_now);
        self.transition(activity, next)
    }

    /// `processing -> completed`, once transcription has finished
    pub fn complete_processing(&self, id: &str) -> CoreResult<Activity> {
        self.with_activity_locked(id, |activity| match activity.status {
            ActivityStatus::Completed => Ok(activity),
            ActivityStatus::Processing => self.transition(activity, ActivityStatus::Completed),
            other => Err(CoreError::InvalidState(format!(
                "activity {} is {}, not processing",
                activity.id,
                other.as_str()
            ))),
        })
    }

    /// Mark a non-terminal activity as failed. A live recording must be
    /// stopped first.
    pub fn fail(&self, id: &str) -> CoreResult<Activity> {
        self.with_activity_locked(id, |activity| match activity.status {
            ActivityStatus::Failed => Ok(activity),
            ActivityStatus::Completed | ActivityStatus::Recording => {
                Err(CoreError::InvalidState(format!(
                    "cannot fail activity {} in status {}",
                    activity.id,
                    activity.status.as_str()
                )))
            }
            _ if self.has_live_recording(&activity.id)? => Err(CoreError::InvalidState(format!(
                "activity {} still has a recording in progress",
                activity.id
            ))),
            _ => self.mark_failed_locked(activity),
        })
    }

    pub(crate) fn mark_recording_locked(&self, activity: Activity) -> CoreResult<Activity> {
        match activity.status {
            ActivityStatus::Recording => Ok(activity),
            ActivityStatus::Active => self.transition(activity, ActivityStatus::Recording),
            other => Err(CoreError::InvalidState(format!(
                "activity {} must be active to record, found {}",
                activity.id,
                other.as_str()
            ))),
        }
    }

    pub(crate) fn mark_failed_locked(&self, mut activity: Activity) -> CoreResult<Activity> {
        if activity.status.is_terminal() {
            return Ok(activity);
        }
        activity.end_time.get_or_insert_with(utc_now);
        self.transition(activity, ActivityStatus::Failed)
    }

    pub fn update_title(&self, id: &str, title: &str) -> CoreResult<Activity> {
        let title = validate_title(title)?;
        self.with_activity_locked(id, |mut activity| {
            activity.title = title;
            self.save(activity)
        })
    }

    pub fn update_type(&self, id: &str, activity_type: &str) -> CoreResult<Activity> {
        let activity_type = parse_activity_type(activity_type)?;
        self.with_activity_locked(id, |mut activity| {
            activity.activity_type = activity_type;
            self.save(activity)
        })
    }

    pub fn add_tag(&self, id: &str, tag: &str) -> CoreResult<Activity> {
        let tag = normalize_tag(tag)?;
        self.with_activity_locked(id, |mut activity| {
            if activity.has_tag(&tag) {
                return Ok(activity);
            }
            activity.tags.push(tag);
            self.save(activity)
        })
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> CoreResult<Activity> {
        let tag = normalize_tag(tag)?;
        self.with_activity_locked(id, |mut activity| {
            if !activity.has_tag(&tag) {
                return Ok(activity);
            }
            activity.tags.retain(|t| t != &tag);
            self.save(activity)
        })
    }

    /// Set a key in the metadata extension bag
    pub fn set_metadata(&self, id: &str, key: &str, value: serde_json::Value) -> CoreResult<Activity> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CoreError::Validation("metadata key must not be empty".into()));
        }
        if matches!(key, "recording_origin" | "auto_created") {
            return Err(CoreError::Validation(format!("metadata key '{}' is reserved", key)));
        }
        self.with_activity_locked(id, |mut activity| {
            activity.metadata.extra.insert(key.to_string(), value);
            self.save(activity)
        })
    }

    /// Soft-delete the activity, then remove its directory best-effort.
    /// Refused while the activity owns a live recording.
    pub fn delete(&self, id: &str) -> CoreResult<DeleteOutcome> {
        self.with_activity_locked(id, |activity| {
            if self.has_live_recording(&activity.id)? {
                return Err(CoreError::Conflict(format!(
                    "activity {} has a recording in progress",
                    activity.id
                )));
            }
            if !self.db.soft_delete_activity(&activity.id, &utc_now())? {
                return Err(CoreError::not_found("Activity", &activity.id));
            }
            Ok(())
        })?;

        log::info!(target: self.log.target(), "Deleted activity {}", id);

        let outcome = match self.files.delete_activity_files(id) {
            Ok(()) => DeleteOutcome {
                activity_id: id.to_string(),
                files_removed: true,
                cleanup_error: None,
            },
            Err(e) => {
                log::warn!(
                    target: self.log.target(),
                    "Activity {} deleted but its files could not be removed: {}",
                    id, e
                );
                DeleteOutcome {
                    activity_id: id.to_string(),
                    files_removed: false,
                    cleanup_error: Some(e.to_string()),
                }
            }
        };
        Ok(outcome)
    }

    pub(crate) fn has_live_recording(&self, activity_id: &str) -> CoreResult<bool> {
        Ok(self
            .db
            .list_recordings_for_activity(activity_id)?
            .iter()
            .any(|r| r.is_live()))
    }

    /// Run `f` on a fresh copy of the activity while holding its owner's lock
    fn with_activity_locked<R>(
        &self,
        id: &str,
        f: impl FnOnce(Activity) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let user_id = self.get(id)?.user_id;
        self.user_locks.with_lock(&user_id, |_slot| {
            let activity = self.get(id)?;
            f(activity)
        })
    }

    fn transition(&self, mut activity: Activity, next: ActivityStatus) -> CoreResult<Activity> {
        let previous = activity.status;
        activity.status = next;
        let activity = self.save(activity)?;
        log::info!(
            target: self.log.target(),
            "Activity {}: {} -> {}",
            activity.id, previous.as_str(), next.as_str()
        );
        Ok(activity)
    }

    fn save(&self, mut activity: Activity) -> CoreResult<Activity> {
        activity.updated_at = utc_now();
        self.db.update_activity(&activity)?;
        Ok(activity)
    }
}

fn parse_activity_type(value: &str) -> CoreResult<ActivityType> {
    ActivityType::from_str(value).ok_or_else(|| {
        CoreError::Validation(format!(
            "invalid activity type '{}': expected meeting, work_session, call or other",
            value
        ))
    })
}

fn validate_title(title: &str) -> CoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::Validation("title must not be empty".into()));
    }
    Ok(title.to_string())
}

fn normalize_tag(tag: &str) -> CoreResult<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(CoreError::Validation("tag must not be empty".into()));
    }
    Ok(tag.to_string())
}
