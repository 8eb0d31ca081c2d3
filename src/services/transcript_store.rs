//! Transcript chunk storage and search
//!
//! Chunks of one recording must not overlap: each chunk has to start at or
//! after the end of the chunk before it, including chunks stored by earlier
//! appends. Violations are rejected, never clamped or reordered.

use std::sync::Arc;

use crate::database::codec::utc_now;
use crate::database::{
    AudioRecording, NewTranscriptChunk, PersistenceGateway, SearchOptions, TranscriptChunk,
    TranscriptMatch,
};
use crate::error::{CoreError, CoreResult};
use crate::logging::LogContext;

use super::KeyedLocks;

pub struct TranscriptStore {
    db: Arc<dyn PersistenceGateway>,
    recording_locks: KeyedLocks<()>,
    log: LogContext,
}

impl TranscriptStore {
    pub fn new(db: Arc<dyn PersistenceGateway>, log: LogContext) -> Self {
        Self {
            db,
            recording_locks: KeyedLocks::new("transcript"),
            log,
        }
    }

    /// Validate and store a batch of chunks for a recording. Either every
    /// chunk is stored or none is.
    pub fn append(
        &self,
        recording_id: &str,
        chunks: &[NewTranscriptChunk],
    ) -> CoreResult<Vec<TranscriptChunk>> {
        let recording = self.live_recording(recording_id)?;
        for (index, chunk) in chunks.iter().enumerate() {
            validate_chunk(index, chunk)?;
        }
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        self.recording_locks.with_lock(recording_id, |_| {
            let mut previous_end = self
                .db
                .last_transcript_chunk(recording_id)?
                .map(|c| c.end_offset);

            let created_at = utc_now();
            let mut stored = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                if let Some(end) = previous_end {
                    if chunk.start_offset < end {
                        return Err(CoreError::Validation(format!(
                            "chunk {} starts at {:.3}s, before the previous chunk ends at {:.3}s",
                            index, chunk.start_offset, end
                        )));
                    }
                }
                previous_end = Some(chunk.end_offset);

                stored.push(TranscriptChunk {
                    id: uuid::Uuid::new_v4().to_string(),
                    recording_id: recording.id.clone(),
                    activity_id: recording.activity_id.clone(),
                    user_id: recording.user_id.clone(),
                    start_offset: chunk.start_offset,
                    end_offset: chunk.end_offset,
                    text: chunk.text.clone(),
                    confidence: chunk.confidence,
                    speaker: chunk.speaker.clone(),
                    language: chunk.language.clone(),
                    created_at,
                });
            }

            self.db.insert_transcript_chunks(&stored)?;
            log::debug!(
                target: self.log.target(),
                "Appended {} transcript chunks to recording {}",
                stored.len(), recording_id
            );
            Ok(stored)
        })
    }

    /// Every chunk of an activity, by recording start then chunk start
    pub fn get_for_activity(&self, activity_id: &str) -> CoreResult<Vec<TranscriptChunk>> {
        self.db
            .get_activity(activity_id)?
            .filter(|a| !a.is_deleted())
            .ok_or_else(|| CoreError::not_found("Activity", activity_id))?;
        Ok(self.db.list_chunks_for_activity(activity_id)?)
    }

    pub fn get_for_recording(&self, recording_id: &str) -> CoreResult<Vec<TranscriptChunk>> {
        self.live_recording(recording_id)?;
        Ok(self.db.list_chunks_for_recording(recording_id)?)
    }

    /// Case-insensitive substring search over the user's chunks
    pub fn search(
        &self,
        user_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> CoreResult<Vec<TranscriptMatch>> {
        let matches = self.db.search_transcripts(user_id, query, options)?;
        log::debug!(
            target: self.log.target(),
            "Transcript search for {:?} returned {} matches",
            query, matches.len()
        );
        Ok(matches)
    }

    /// A recording whose activity has not been deleted
    fn live_recording(&self, recording_id: &str) -> CoreResult<AudioRecording> {
        let recording = self
            .db
            .get_recording(recording_id)?
            .ok_or_else(|| CoreError::not_found("AudioRecording", recording_id))?;
        let activity_visible = self
            .db
            .get_activity(&recording.activity_id)?
            .map(|a| !a.is_deleted())
            .unwrap_or(false);
        if !activity_visible {
            return Err(CoreError::not_found("Activity", &recording.activity_id));
        }
        Ok(recording)
    }
}

fn validate_chunk(index: usize, chunk: &NewTranscriptChunk) -> CoreResult<()> {
    if !chunk.start_offset.is_finite() || !chunk.end_offset.is_finite() {
        return Err(CoreError::Validation(format!("chunk {} has a non-finite offset", index)));
    }
    if chunk.start_offset < 0.0 {
        return Err(CoreError::Validation(format!(
            "chunk {} starts at a negative offset ({:.3}s)",
            index, chunk.start_offset
        )));
    }
    if chunk.end_offset < chunk.start_offset {
        return Err(CoreError::Validation(format!(
            "chunk {} ends ({:.3}s) before it starts ({:.3}s)",
            index, chunk.end_offset, chunk.start_offset
        )));
    }
    if let Some(confidence) = chunk.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CoreError::Validation(format!(
                "chunk {} confidence {} is outside [0, 1]",
                index, confidence
            )));
        }
    }
    Ok(())
}
