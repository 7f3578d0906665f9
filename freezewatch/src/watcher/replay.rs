//! Replay of freezes that outlived their process
//!
//! When the process dies during a freeze (often *because* of it), its freeze
//! directory keeps the `.duration` marker. On the next start such directories
//! are analyzed like a live freeze, using the marker as the freeze duration,
//! and crash logs of the dead process are attached.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use freezewatch_common::{DURATION_MARKER, FREEZE_DIR_PREFIX};

use super::dump_dir::{read_duration_marker, read_pid_marker, recorded_duration, FreezeDir};
use crate::analysis::{FreezeReport, FreezeReportBuilder};
use crate::config::WatcherConfig;
use crate::domain::{DumpError, Pid};
use crate::freeze::FreezeEpisode;
use crate::snapshot::dump_format::read_dump_dir;

/// A freeze directory that was never finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnfinishedFreeze {
    pub dir: PathBuf,
    pub duration: Duration,
    pub pid: Option<Pid>,
}

/// Result of replaying one unfinished freeze.
#[derive(Debug)]
pub struct ReplayOutcome {
    /// Directory after finalization (or the original one if renaming failed)
    pub dir: PathBuf,
    pub duration: Duration,
    pub report: Option<FreezeReport>,
}

/// Freeze directories under `log_dir` that still carry a `.duration` marker.
#[must_use]
pub fn find_unfinished_freezes(log_dir: &Path) -> Vec<UnfinishedFreeze> {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let mut found: Vec<UnfinishedFreeze> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path.join(DURATION_MARKER).is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(FREEZE_DIR_PREFIX))
        })
        .filter_map(|dir| {
            let duration = read_duration_marker(&dir)?;
            let pid = read_pid_marker(&dir);
            Some(UnfinishedFreeze { dir, duration, pid })
        })
        .collect();
    found.sort_by(|a, b| a.dir.cmp(&b.dir));
    found
}

/// Crash logs in `crash_dir` written for `pid` (file name contains `pid<N>`).
#[must_use]
pub fn crash_artifacts(crash_dir: &Path, pid: Pid) -> Vec<PathBuf> {
    let needle = format!("pid{}", pid.0);
    let Ok(entries) = fs::read_dir(crash_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name().is_some_and(|name| {
                    // Avoid "pid12" matching "pid123"
                    let name = name.to_string_lossy();
                    name.match_indices(&needle).any(|(at, _)| {
                        !name[at + needle.len()..].starts_with(|c: char| c.is_ascii_digit())
                    })
                })
        })
        .collect();
    files.sort();
    files
}

/// Rebuild the freeze episode stored in `dir`.
///
/// The duration comes from the marker or the finalized name, falling back to
/// one dump interval per dump.
///
/// # Errors
/// Returns an error if the dumps can't be read or parsed.
pub fn load_episode(dir: &Path, config: &WatcherConfig) -> Result<FreezeEpisode, DumpError> {
    let snapshots = read_dump_dir(dir)?;
    let interval = config.dump_interval();
    let duration = recorded_duration(dir).unwrap_or_else(|| {
        interval * u32::try_from(snapshots.len()).unwrap_or(u32::MAX)
    });
    Ok(FreezeEpisode::from_snapshots(snapshots, duration, interval, &config.jit_stall_markers))
}

/// Build the report for a freeze directory without touching it.
///
/// # Errors
/// Returns an error if the dumps can't be read or parsed.
pub fn analyze_dump_dir(dir: &Path, config: &WatcherConfig) -> Result<Option<FreezeReport>, DumpError> {
    let episode = load_episode(dir, config)?;
    Ok(FreezeReportBuilder::new(config).build(&episode))
}

/// Replay one unfinished freeze: report it, then finalize its directory.
///
/// Crash logs are attached when the freeze belongs to a process other than
/// `current`. Reports are only built when reporting is active. The directory
/// is finalized even when none of its dumps can be loaded, so a broken
/// freeze is not replayed again on every start.
#[must_use]
pub fn replay_freeze(freeze: &UnfinishedFreeze, config: &WatcherConfig, current: Pid) -> ReplayOutcome {
    let mut episode = match load_episode(&freeze.dir, config) {
        Ok(episode) => Some(episode),
        Err(DumpError::NoDumps(_)) => None,
        Err(e) => {
            warn!("Cannot load dumps of {}: {e}", freeze.dir.display());
            None
        }
    };

    if let (Some(episode), Some(crash_dir), Some(pid)) =
        (episode.as_mut(), config.crash_dir.as_deref(), freeze.pid)
    {
        if pid != current {
            episode.crash_artifacts = crash_artifacts(crash_dir, pid);
        }
    }

    let report = episode
        .filter(|_| config.reporting_active())
        .and_then(|episode| FreezeReportBuilder::new(config).build(&episode));

    let dir = match FreezeDir::existing(&freeze.dir).finalize(freeze.duration) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("{e}");
            freeze.dir.clone()
        }
    };
    if let Some(ref report) = report {
        report.persist(&dir);
    }

    ReplayOutcome { dir, duration: freeze.duration, report }
}

/// Replay every unfinished freeze under the log directory that wasn't
/// written by `current`.
#[must_use]
pub fn replay_unfinished(config: &WatcherConfig, current: Pid) -> Vec<ReplayOutcome> {
    find_unfinished_freezes(&config.log_dir)
        .into_iter()
        .filter(|freeze| freeze.pid != Some(current))
        .map(|freeze| {
            info!(
                "Replaying unfinished {}s freeze in {}",
                freeze.duration.as_secs(),
                freeze.dir.display()
            );
            replay_freeze(&freeze, config, current)
        })
        .collect()
}
