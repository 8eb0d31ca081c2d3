//! On-disk layout for activity audio
//!
//! ```text
//! <data_root>/
//!   activities/<activity_id>/audio/<generated file name>
//!   models/                      (opaque, managed elsewhere)
//! ```
//!
//! Paths stored in the database are relative to the data root and always
//! `/`-separated. Every generated audio name is unique per recording, so no
//! locking is needed around a single path.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::database::SUPPORTED_AUDIO_FORMATS;
use crate::error::{CoreError, CoreResult};
use crate::logging::LogContext;

const ACTIVITIES_DIR: &str = "activities";
const MODELS_DIR: &str = "models";
const AUDIO_DIR: &str = "audio";
const ACTIVITY_PREFIX_LEN: usize = 8;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Names produced by `generate_audio_file_name`, with or without a collision suffix
static GENERATED_AUDIO_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Za-z-]{1,8}_\d{8}_\d{6}_\d{3}(?:_\d+)?\.(?:wav|mp3|m4a|aac|flac|ogg)$")
        .expect("generated audio name pattern is valid")
});

/// Outcome of a best-effort sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub failures: usize,
}

/// A reserved, empty audio file for a new recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedAudioPath {
    /// Path relative to the data root, as stored in the database
    pub relative: String,
    pub absolute: PathBuf,
}

pub struct FileStore {
    data_root: PathBuf,
    log: LogContext,
}

impl FileStore {
    pub fn new(data_root: impl Into<PathBuf>, log: LogContext) -> Self {
        Self {
            data_root: data_root.into(),
            log,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn activities_dir(&self) -> PathBuf {
        self.data_root.join(ACTIVITIES_DIR)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_root.join(MODELS_DIR)
    }

    pub fn activity_dir(&self, activity_id: &str) -> PathBuf {
        self.activities_dir().join(activity_id)
    }

    pub fn activity_audio_dir(&self, activity_id: &str) -> PathBuf {
        self.activity_dir(activity_id).join(AUDIO_DIR)
    }

    /// Create the data root and its fixed subtrees
    pub fn ensure_directories(&self) -> CoreResult<()> {
        for dir in [self.data_root.clone(), self.activities_dir(), self.models_dir()] {
            fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Create `activities/<id>/audio`, returning the audio directory
    pub fn ensure_activity_directories(&self, activity_id: &str) -> CoreResult<PathBuf> {
        validate_component(activity_id)?;
        let dir = self.activity_audio_dir(activity_id);
        fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        Ok(dir)
    }

    /// `{first 8 chars of the activity id}_{YYYYmmdd_HHMMSS_mmm}.{ext}`
    pub fn generate_audio_file_name(activity_id: &str, extension: &str, at: &DateTime<Utc>) -> String {
        let prefix: String = activity_id.chars().take(ACTIVITY_PREFIX_LEN).collect();
        format!(
            "{}_{}.{}",
            prefix,
            at.format("%Y%m%d_%H%M%S_%3f"),
            extension.trim_start_matches('.').to_lowercase()
        )
    }

    pub fn relative_audio_path(activity_id: &str, file_name: &str) -> String {
        format!("{}/{}/{}/{}", ACTIVITIES_DIR, activity_id, AUDIO_DIR, file_name)
    }

    /// Resolve a stored relative path against the data root
    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.data_root.clone(), |path, part| path.join(part))
    }

    /// Ensure the activity directories exist and reserve a fresh audio file.
    ///
    /// The file is created empty with `create_new`, so two allocations can
    /// never hand out the same path; on a name clash a numeric suffix is added.
    pub fn allocate_audio_path(&self, activity_id: &str, extension: &str) -> CoreResult<AllocatedAudioPath> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        if !is_audio_extension(&extension) {
            return Err(CoreError::Validation(format!(
                "unsupported audio format '{}'",
                extension
            )));
        }

        let audio_dir = self.ensure_activity_directories(activity_id)?;
        let base = Self::generate_audio_file_name(activity_id, &extension, &Utc::now());
        let suffix = format!(".{}", extension);
        let stem = base.strip_suffix(suffix.as_str()).unwrap_or(&base).to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}_{}.{}", stem, attempt, extension)
            };
            let absolute = audio_dir.join(&file_name);

            match OpenOptions::new().write(true).create_new(true).open(&absolute) {
                Ok(_) => {
                    log::debug!(target: self.log.target(), "Reserved audio file {:?}", absolute);
                    return Ok(AllocatedAudioPath {
                        relative: Self::relative_audio_path(activity_id, &file_name),
                        absolute,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(CoreError::io(&absolute, e)),
            }
        }

        Err(CoreError::Conflict(format!(
            "could not allocate a unique audio file name for activity {}",
            activity_id
        )))
    }

    /// Size of a stored file. `Ok(None)` if it does not exist.
    pub fn file_size(&self, relative: &str) -> CoreResult<Option<u64>> {
        let path = self.absolute_path(relative);
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::io(&path, e)),
        }
    }

    /// Copy and flush the destination to disk before returning
    pub fn copy_file(&self, src: &Path, dst: &Path) -> CoreResult<u64> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }

        let mut reader = File::open(src).map_err(|e| CoreError::io(src, e))?;
        let mut writer = File::create(dst).map_err(|e| CoreError::io(dst, e))?;
        let copied = io::copy(&mut reader, &mut writer).map_err(|e| CoreError::io(dst, e))?;
        writer.sync_all().map_err(|e| CoreError::io(dst, e))?;

        Ok(copied)
    }

    /// Rename when possible, otherwise copy, sync and remove the source
    pub fn move_file(&self, src: &Path, dst: &Path) -> CoreResult<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }

        match fs::rename(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CoreError::io(src, e)),
            Err(e) => {
                log::debug!(
                    target: self.log.target(),
                    "Rename {:?} -> {:?} failed ({}), falling back to copy",
                    src, dst, e
                );
            }
        }

        self.copy_file(src, dst)?;
        fs::remove_file(src).map_err(|e| CoreError::io(src, e))?;
        Ok(())
    }

    /// Remove an activity's directory tree. Missing directories count as removed.
    pub fn delete_activity_files(&self, activity_id: &str) -> CoreResult<()> {
        validate_component(activity_id)?;
        let dir = self.activity_dir(activity_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::info!(target: self.log.target(), "Deleted activity files: {:?}", dir);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io(&dir, e)),
        }
    }

    pub fn activity_files_exist(&self, activity_id: &str) -> bool {
        self.activity_dir(activity_id).exists()
    }

    /// Audio files of an activity, sorted by name. Unknown extensions are skipped.
    pub fn list_audio_files(&self, activity_id: &str) -> CoreResult<Vec<PathBuf>> {
        let dir = self.activity_audio_dir(activity_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::io(&dir, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_audio_extension(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Total bytes under the data root; unreadable entries are skipped
    pub fn disk_usage(&self) -> u64 {
        dir_size(&self.data_root)
    }

    pub fn activity_disk_usage(&self, activity_id: &str) -> u64 {
        dir_size(&self.activity_dir(activity_id))
    }

    /// Delete files under the activities tree older than `max_age`, except
    /// any path in `protected`. Per-file failures are logged and counted.
    pub fn cleanup_old_files(&self, max_age: Duration, protected: &HashSet<PathBuf>) -> CleanupReport {
        let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanupReport::default();

        for path in walk_files(&self.activities_dir()) {
            if protected.contains(&path) {
                continue;
            }
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!(target: self.log.target(), "Skipping {:?}: {}", path, e);
                    report.failures += 1;
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
            if modified >= cutoff {
                continue;
            }
            self.remove_counted(&path, meta.len(), &mut report);
        }

        if report.files_removed > 0 || report.failures > 0 {
            log::info!(
                target: self.log.target(),
                "Old file cleanup removed {} files ({} bytes), {} failures",
                report.files_removed, report.bytes_freed, report.failures
            );
        }
        report
    }

    /// Remove generated audio files that no live recording references and that
    /// have not been touched for at least `min_age`
    pub fn reclaim_orphans(&self, live: &HashSet<PathBuf>, min_age: Duration) -> CleanupReport {
        let cutoff = SystemTime::now().checked_sub(min_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanupReport::default();

        for path in walk_files(&self.activities_dir()) {
            let is_generated = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| GENERATED_AUDIO_NAME.is_match(n))
                .unwrap_or(false);
            if !is_generated || live.contains(&path) {
                continue;
            }
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!(target: self.log.target(), "Skipping {:?}: {}", path, e);
                    report.failures += 1;
                    continue;
                }
            };
            if meta.modified().map(|m| m > cutoff).unwrap_or(true) {
                continue;
            }
            self.remove_counted(&path, meta.len(), &mut report);
        }

        if report.files_removed > 0 {
            log::info!(
                target: self.log.target(),
                "Reclaimed {} orphaned audio files ({} bytes)",
                report.files_removed, report.bytes_freed
            );
        }
        report
    }

    fn remove_counted(&self, path: &Path, len: u64, report: &mut CleanupReport) {
        match fs::remove_file(path) {
            Ok(()) => {
                report.files_removed += 1;
                report.bytes_freed += len;
            }
            Err(e) => {
                log::warn!(target: self.log.target(), "Failed to remove {:?}: {}", path, e);
                report.failures += 1;
            }
        }
    }
}

pub fn is_audio_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_lowercase();
    SUPPORTED_AUDIO_FORMATS.contains(&ext.as_str())
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_audio_extension)
        .unwrap_or(false)
}

/// Activity ids become directory names; reject anything that could escape the tree
fn validate_component(activity_id: &str) -> CoreResult<()> {
    let bad = activity_id.is_empty()
        || activity_id == "."
        || activity_id == ".."
        || activity_id.contains(['/', '\\']);
    if bad {
        return Err(CoreError::Validation(format!("invalid activity id '{}'", activity_id)));
    }
    Ok(())
}

/// Regular files below `root`, without following symlinks. Unreadable
/// directories are skipped.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => stack.push(entry.path()),
                Ok(ft) if ft.is_file() => files.push(entry.path()),
                _ => {}
            }
        }
    }

    files
}

fn dir_size(root: &Path) -> u64 {
    walk_files(root)
        .iter()
        .filter_map(|path| fs::symlink_metadata(path).ok())
        .map(|meta| meta.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::{tempdir, TempDir};

    fn create_store() -> (TempDir, FileStore) {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"), LogContext::new("test"));
        store.ensure_directories().unwrap();
        (dir, store)
    }

    fn age_file(path: &Path, age: Duration) {
        let mtime = SystemTime::now() - age;
        File::options().write(true).open(path).unwrap().set_modified(mtime).unwrap();
    }

    #[test]
    fn test_ensure_directories_is_idempotent() {
        let (_dir, store) = create_store();
        store.ensure_directories().unwrap();
        assert!(store.activities_dir().is_dir());
        assert!(store.models_dir().is_dir());

        let audio = store.ensure_activity_directories("abc").unwrap();
        assert_eq!(audio, store.data_root().join("activities").join("abc").join("audio"));
        store.ensure_activity_directories("abc").unwrap();
    }

    #[test]
    fn test_ensure_directories_surfaces_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a dir").unwrap();

        let store = FileStore::new(&blocker, LogContext::new("test"));
        assert!(matches!(store.ensure_directories(), Err(CoreError::Io { .. })));
    }

    #[test]
    fn test_generated_file_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::milliseconds(42);
        let name = FileStore::generate_audio_file_name("0123456789abcdef", ".WAV", &at);
        assert_eq!(name, "01234567_20240506_070809_042.wav");
        assert!(GENERATED_AUDIO_NAME.is_match(&name));
        assert!(GENERATED_AUDIO_NAME.is_match("01234567_20240506_070809_042_3.ogg"));
        assert!(!GENERATED_AUDIO_NAME.is_match("notes.txt"));
    }

    #[test]
    fn test_allocate_never_reuses_a_path() {
        let (_dir, store) = create_store();
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let allocated = store.allocate_audio_path("activity-1", "wav").unwrap();
            assert!(allocated.absolute.is_file());
            assert!(allocated.relative.starts_with("activities/activity-1/audio/"));
            assert_eq!(store.absolute_path(&allocated.relative), allocated.absolute);
            assert!(seen.insert(allocated.relative));
        }
    }

    #[test]
    fn test_allocate_rejects_unknown_format_and_bad_id() {
        let (_dir, store) = create_store();
        assert!(matches!(store.allocate_audio_path("a", "exe"), Err(CoreError::Validation(_))));
        assert!(matches!(store.allocate_audio_path("../x", "wav"), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_file_size_missing_and_present() {
        let (_dir, store) = create_store();
        let allocated = store.allocate_audio_path("a1", "wav").unwrap();
        assert_eq!(store.file_size(&allocated.relative).unwrap(), Some(0));
        fs::write(&allocated.absolute, vec![1u8; 128]).unwrap();
        assert_eq!(store.file_size(&allocated.relative).unwrap(), Some(128));
        assert_eq!(store.file_size("activities/a1/audio/none.wav").unwrap(), None);
    }

    #[test]
    fn test_copy_and_move() {
        let (dir, store) = create_store();
        let src = dir.path().join("src.wav");
        fs::write(&src, b"RIFFdata").unwrap();

        let copy = dir.path().join("out").join("copy.wav");
        assert_eq!(store.copy_file(&src, &copy).unwrap(), 8);
        assert_eq!(fs::read(&copy).unwrap(), b"RIFFdata");

        let moved = dir.path().join("moved").join("m.wav");
        store.move_file(&src, &moved).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"RIFFdata");

        assert!(matches!(store.move_file(&src, &moved), Err(CoreError::Io { .. })));
    }

    #[test]
    fn test_delete_activity_files_missing_is_ok() {
        let (_dir, store) = create_store();
        store.delete_activity_files("never-existed").unwrap();

        store.allocate_audio_path("gone", "wav").unwrap();
        assert!(store.activity_files_exist("gone"));
        store.delete_activity_files("gone").unwrap();
        assert!(!store.activity_files_exist("gone"));
    }

    #[test]
    fn test_list_audio_files_filters_extensions() {
        let (_dir, store) = create_store();
        let audio = store.ensure_activity_directories("a1").unwrap();
        fs::write(audio.join("b.mp3"), b"1").unwrap();
        fs::write(audio.join("a.WAV"), b"1").unwrap();
        fs::write(audio.join("notes.txt"), b"1").unwrap();

        let names: Vec<String> = store
            .list_audio_files("a1")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.mp3"]);
        assert!(store.list_audio_files("missing").unwrap().is_empty());
    }

    #[test]
    fn test_disk_usage_sums_tree() {
        let (_dir, store) = create_store();
        let audio = store.ensure_activity_directories("a1").unwrap();
        fs::write(audio.join("x.wav"), vec![0u8; 100]).unwrap();
        fs::write(store.models_dir().join("m.bin"), vec![0u8; 50]).unwrap();

        assert_eq!(store.disk_usage(), 150);
        assert_eq!(store.activity_disk_usage("a1"), 100);
        assert_eq!(store.activity_disk_usage("missing"), 0);
    }

    #[test]
    fn test_cleanup_old_files_respects_age_and_protection() {
        let (_dir, store) = create_store();
        let audio = store.ensure_activity_directories("a1").unwrap();
        let old = audio.join("old.wav");
        let old_live = audio.join("old_live.wav");
        let fresh = audio.join("fresh.wav");
        for p in [&old, &old_live, &fresh] {
            fs::write(p, vec![0u8; 10]).unwrap();
        }
        age_file(&old, Duration::from_secs(3 * 24 * 3600));
        age_file(&old_live, Duration::from_secs(3 * 24 * 3600));

        let protected: HashSet<PathBuf> = [old_live.clone()].into_iter().collect();
        let report = store.cleanup_old_files(Duration::from_secs(24 * 3600), &protected);

        assert_eq!(report.files_removed, 1);
        assert_eq!(report.bytes_freed, 10);
        assert!(!old.exists());
        assert!(old_live.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_reclaim_orphans_only_touches_unreferenced_generated_names() {
        let (_dir, store) = create_store();
        let live = store.allocate_audio_path("a1", "wav").unwrap();
        let orphan = store.allocate_audio_path("a1", "wav").unwrap();
        let audio = store.activity_audio_dir("a1");
        let foreign = audio.join("imported.wav");
        fs::write(&foreign, b"keep").unwrap();

        let live_set: HashSet<PathBuf> = [live.absolute.clone()].into_iter().collect();
        let report = store.reclaim_orphans(&live_set, Duration::ZERO);

        assert_eq!(report.files_removed, 1);
        assert!(live.absolute.exists());
        assert!(!orphan.absolute.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_reclaim_orphans_skips_recent_files() {
        let (_dir, store) = create_store();
        let orphan = store.allocate_audio_path("a1", "wav").unwrap();
        let report = store.reclaim_orphans(&HashSet::new(), Duration::from_secs(3600));
        assert_eq!(report.files_removed, 0);
        assert!(orphan.absolute.exists());
    }
}
