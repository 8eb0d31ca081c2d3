//! Filesystem storage for recordings

pub mod files;

pub use files::{AllocatedAudioPath, CleanupReport, FileStore};
