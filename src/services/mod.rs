//! Lifecycle services: activities, recording sessions and transcripts
//!
//! Every mutation of an activity or of a recording's status happens while
//! holding the owning user's entry in a shared [`UserLocks`] registry.

pub mod activity_manager;
pub mod keyed_locks;
pub mod recording_coordinator;
pub mod transcript_store;

pub use activity_manager::{ActivityManager, DeleteOutcome};
pub use keyed_locks::KeyedLocks;
pub use recording_coordinator::{RecordingCoordinator, RecordingSession};
pub use transcript_store::TranscriptStore;

/// Per-user recording state, guarded by the user's lock
#[derive(Debug, Default)]
pub struct RecordingSlot {
    /// Whether `active_recording_id` has been loaded from the database
    loaded: bool,
    active_recording_id: Option<String>,
}

pub type UserLocks = KeyedLocks<RecordingSlot>;
