//! Dump directory lifecycle
//!
//! ```text
//! <log_dir>/
//! ├── threadDumps-freeze-20261018-101010-dev/       ← freeze in progress
//! │   ├── .pid  .appinfo  .duration                 ← markers
//! │   ├── dump001-20261018-101010-512.txt
//! │   └── dump002-20261018-101011-013.txt
//! └── threadDumps-freeze-20261017-090000-dev-12sec/ ← finalized
//!     ├── dump001-...txt
//!     ├── report-12s.txt
//!     └── dump-1.txt
//! ```
//!
//! A directory that still has a `.duration` marker was never finalized: the
//! process died mid-freeze. Those are replayed on the next start.

use chrono::{DateTime, Local};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use freezewatch_common::{
    APPINFO_MARKER, DUMP_DIR_PREFIX, DUMP_FILE_EXTENSION, DUMP_FILE_PREFIX, DURATION_MARKER,
    FREEZE_DIR_PREFIX, PID_MARKER,
};

use crate::config::WatcherConfig;
use crate::domain::{Pid, ReportError};

const FINAL_SUFFIX: &str = "sec";

// =============================================================================
// FREEZE DIRECTORY
// =============================================================================

/// Output directory of one freeze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeDir {
    path: PathBuf,
}

impl FreezeDir {
    /// Create `threadDumps-freeze-<YYYYMMDD-HHMMSS>-<build>` under `log_dir`.
    ///
    /// # Errors
    /// Returns an error if the directory can't be created.
    pub fn create(log_dir: &Path, build: &str, now: DateTime<Local>) -> io::Result<Self> {
        let base = format!("{FREEZE_DIR_PREFIX}{}-{build}", now.format("%Y%m%d-%H%M%S"));
        let mut path = log_dir.join(&base);
        let mut attempt = 1;
        while path.exists() {
            path = log_dir.join(format!("{base}-{attempt}"));
            attempt += 1;
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Handle on a directory created earlier, possibly by another process.
    #[must_use]
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `.pid` and `.appinfo`.
    ///
    /// # Errors
    /// Returns the first write failure.
    pub fn write_markers(&self, pid: Pid, appinfo: &str) -> io::Result<()> {
        fs::write(self.path.join(PID_MARKER), pid.0.to_string())?;
        fs::write(self.path.join(APPINFO_MARKER), appinfo)
    }

    /// Record how long the freeze has lasted so far, in whole seconds.
    ///
    /// # Errors
    /// Returns an error if the marker can't be written.
    pub fn update_duration(&self, elapsed: Duration) -> io::Result<()> {
        fs::write(self.path.join(DURATION_MARKER), elapsed.as_secs().to_string())
    }

    /// Path for the dump with capture index `index` (0-based).
    #[must_use]
    pub fn dump_path(&self, index: usize, now: DateTime<Local>) -> PathBuf {
        self.path.join(format!(
            "{DUMP_FILE_PREFIX}{:03}-{}.{DUMP_FILE_EXTENSION}",
            index + 1,
            now.format("%Y%m%d-%H%M%S-%3f")
        ))
    }

    /// Remove the markers and rename to `<name>-<secs>sec`.
    ///
    /// # Errors
    /// Returns [`ReportError::FinalizeFailed`] if the rename fails; marker
    /// removal is best-effort.
    pub fn finalize(self, duration: Duration) -> Result<PathBuf, ReportError> {
        for marker in [DURATION_MARKER, PID_MARKER, APPINFO_MARKER] {
            let path = self.path.join(marker);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {e}", path.display());
                }
            }
        }

        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let target = self.path.with_file_name(format!("{name}-{}{FINAL_SUFFIX}", duration.as_secs()));
        match fs::rename(&self.path, &target) {
            Ok(()) => Ok(target),
            Err(source) => Err(ReportError::FinalizeFailed { path: self.path, source }),
        }
    }
}

/// Seconds recorded in a `.duration` marker.
#[must_use]
pub fn read_duration_marker(dir: &Path) -> Option<Duration> {
    let text = fs::read_to_string(dir.join(DURATION_MARKER)).ok()?;
    text.trim().parse().ok().map(Duration::from_secs)
}

/// Process that wrote a freeze directory.
#[must_use]
pub fn read_pid_marker(dir: &Path) -> Option<Pid> {
    fs::read_to_string(dir.join(PID_MARKER)).ok()?.parse().ok()
}

/// Duration of a freeze directory: the marker while unfinished, the
/// `-<N>sec` name suffix once finalized.
#[must_use]
pub fn recorded_duration(dir: &Path) -> Option<Duration> {
    if let Some(duration) = read_duration_marker(dir) {
        return Some(duration);
    }
    let name = dir.file_name()?.to_str()?;
    let (_, tail) = name.rsplit_once('-')?;
    tail.strip_suffix(FINAL_SUFFIX)?.parse().ok().map(Duration::from_secs)
}

// =============================================================================
// CLEANUP
// =============================================================================

/// Bounds on what stays in the log directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Most recent dump directories kept
    pub max_dirs: usize,
    /// Anything older is deleted
    pub max_age: Duration,
    /// Levels below the log directory that are scanned for expired entries
    pub max_depth: usize,
}

impl RetentionPolicy {
    #[must_use]
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            max_dirs: config.max_dump_dirs,
            max_age: config.dump_max_age(),
            max_depth: config.cleanup_max_depth,
        }
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub removed: Vec<PathBuf>,
    pub kept_dirs: usize,
}

/// Apply `policy` to the dump directories under `log_dir`.
///
/// Dump directories are ranked by modification time; the `max_dirs` most
/// recent survive unless expired. Inside survivors, expired files and
/// subdirectories are removed down to `max_depth` levels. Failures are
/// logged and skipped.
pub fn cleanup_old_dumps(log_dir: &Path, policy: &RetentionPolicy, now: SystemTime) -> CleanupSummary {
    let mut summary = CleanupSummary::default();
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Nothing to clean in {}: {e}", log_dir.display());
            return summary;
        }
    };

    let mut dirs: Vec<(PathBuf, SystemTime)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(DUMP_DIR_PREFIX))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            (meta.is_dir()).then(|| (entry.path(), meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)))
        })
        .collect();
    dirs.sort_by(|a, b| b.1.cmp(&a.1));

    for (rank, (dir, modified)) in dirs.into_iter().enumerate() {
        if rank >= policy.max_dirs || is_expired(modified, now, policy.max_age) {
            remove_entry(&dir, true, &mut summary);
        } else {
            summary.kept_dirs += 1;
            prune_expired(&dir, 2, policy, now, &mut summary);
        }
    }

    summary
}

fn prune_expired(dir: &Path, depth: usize, policy: &RetentionPolicy, now: SystemTime, summary: &mut CleanupSummary) {
    if depth > policy.max_depth {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let path = entry.path();
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if is_expired(modified, now, policy.max_age) {
            remove_entry(&path, meta.is_dir(), summary);
        } else if meta.is_dir() {
            prune_expired(&path, depth + 1, policy, now, summary);
        }
    }
}

fn is_expired(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(modified).is_ok_and(|age| age > max_age)
}

fn remove_entry(path: &Path, is_dir: bool, summary: &mut CleanupSummary) {
    let result = if is_dir { fs::remove_dir_all(path) } else { fs::remove_file(path) };
    match result {
        Ok(()) => summary.removed.push(path.to_path_buf()),
        Err(e) => warn!("Failed to delete {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 10, 10, secs).unwrap()
    }

    fn age(path: &Path, now: SystemTime, days: u64) {
        File::open(path).unwrap().set_modified(now - Duration::from_secs(days * 86_400)).unwrap();
    }

    #[test]
    fn test_create_names_and_avoids_collisions() {
        let log = tempfile::tempdir().unwrap();
        let first = FreezeDir::create(log.path(), "IU-243", at(10)).unwrap();
        let second = FreezeDir::create(log.path(), "IU-243", at(10)).unwrap();
        assert_eq!(
            first.path().file_name().unwrap(),
            "threadDumps-freeze-20261018-101010-IU-243"
        );
        assert_eq!(
            second.path().file_name().unwrap(),
            "threadDumps-freeze-20261018-101010-IU-243-1"
        );
    }

    #[test]
    fn test_dump_paths_sort_in_capture_order() {
        let dir = FreezeDir::existing("/tmp/x");
        let a = dir.dump_path(8, at(59));
        let b = dir.dump_path(9, at(0));
        assert!(a < b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("dump009-"));
    }

    #[test]
    fn test_markers_and_finalize() {
        let log = tempfile::tempdir().unwrap();
        let dir = FreezeDir::create(log.path(), "dev", at(0)).unwrap();
        dir.write_markers(Pid(4242), "dev").unwrap();
        dir.update_duration(Duration::from_millis(7_900)).unwrap();

        assert_eq!(read_pid_marker(dir.path()), Some(Pid(4242)));
        assert_eq!(read_duration_marker(dir.path()), Some(Duration::from_secs(7)));
        assert_eq!(recorded_duration(dir.path()), Some(Duration::from_secs(7)));

        let final_dir = dir.finalize(Duration::from_secs(12)).unwrap();
        assert!(final_dir.to_string_lossy().ends_with("-dev-12sec"));
        assert!(!final_dir.join(DURATION_MARKER).exists());
        assert!(!final_dir.join(PID_MARKER).exists());
        assert_eq!(recorded_duration(&final_dir), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_finalize_of_vanished_dir_keeps_path() {
        let log = tempfile::tempdir().unwrap();
        let gone = log.path().join("threadDumps-freeze-gone");
        let err = FreezeDir::existing(&gone).finalize(Duration::from_secs(3)).unwrap_err();
        match err {
            ReportError::FinalizeFailed { path, source } => {
                assert_eq!(path, gone);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cleanup_prunes_expired_files_inside_kept_dirs() {
        let log = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let dir = log.path().join("threadDumps-freeze-a");
        fs::create_dir(&dir).unwrap();
        let old = dir.join("dump001-old.txt");
        let fresh = dir.join("dump002-new.txt");
        fs::write(&old, "x").unwrap();
        fs::write(&fresh, "x").unwrap();
        age(&old, now, 30);
        fs::write(log.path().join("unrelated.txt"), "x").unwrap();

        let policy = RetentionPolicy { max_dirs: 100, max_age: Duration::from_secs(10 * 86_400), max_depth: 3 };
        let summary = cleanup_old_dumps(log.path(), &policy, now);
        assert_eq!(summary.removed, [old]);
        assert_eq!(summary.kept_dirs, 1);
        assert!(fresh.exists());
        assert!(log.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_cleanup_respects_depth() {
        let log = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let deep = log.path().join("threadDumps-a/b/c");
        fs::create_dir_all(&deep).unwrap();
        let too_deep = deep.join("old.txt");
        fs::write(&too_deep, "x").unwrap();
        age(&too_deep, now, 30);

        let policy = RetentionPolicy { max_dirs: 100, max_age: Duration::from_secs(86_400), max_depth: 3 };
        cleanup_old_dumps(log.path(), &policy, now);
        // threadDumps-a is level 1, b level 2, c level 3; files in c are level 4
        assert!(too_deep.exists());
    }

    #[test]
    fn test_cleanup_of_missing_log_dir_is_empty() {
        let policy = RetentionPolicy { max_dirs: 1, max_age: Duration::ZERO, max_depth: 1 };
        let summary = cleanup_old_dumps(Path::new("/nonexistent/freezewatch"), &policy, SystemTime::now());
        assert!(summary.removed.is_empty());
    }
}
