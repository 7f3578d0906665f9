//! Watcher configuration
//!
//! Every policy knob of the freeze detector lives in [`WatcherConfig`]. The
//! host supplies it (usually deserialized from JSON); the watcher never owns
//! or persists it. Raw values are clamped by the accessor methods, so a bad
//! file can make detection less useful but never pathological.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::WatcherError;

// =============================================================================
// CLAMPING BOUNDS
// =============================================================================

const MIN_UNRESPONSIVE_MS: u64 = 500;
const MAX_UNRESPONSIVE_MS: u64 = 20_000;

const MIN_DUMP_INTERVAL_MS: u64 = 500;
const MAX_DUMP_INTERVAL_MS: u64 = 5_000;

/// Upper bound on how long one freeze keeps producing dumps.
const MAX_DUMP_DURATION_MS: u64 = 40_000;

/// Configuration of the freeze detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// UI event duration after which the UI counts as frozen.
    pub unresponsive_interval_ms: u64,
    /// Requested interval between thread dumps while frozen.
    pub sampling_interval_ms: u64,
    /// Interval of the background UI round-trip latency probe.
    pub latency_sampling_interval_ms: u64,
    /// Latency still considered "satisfied" by the Apdex score.
    pub tolerable_latency_ms: u64,
    /// Multiple of the tolerable latency that separates "tolerating" from "frustrated".
    pub apdex_frustration_factor: u64,
    /// Share of total sample weight a call path needs to count as the cause.
    pub dominant_stack_ratio: f64,
    /// Dump directories kept by cleanup.
    pub max_dump_dirs: usize,
    /// Age after which dump directories and files are deleted.
    pub dump_max_age_days: u64,
    /// How deep cleanup descends into dump directories.
    pub cleanup_max_depth: usize,
    /// Dumps attached to one freeze report.
    pub max_report_dumps: usize,
    /// Publish freeze reports to listeners.
    pub freeze_reporting_enabled: bool,
    /// A debugger is attached: freezes are breakpoints, keep dumps but don't report.
    pub debug_mode: bool,
    /// Name of the UI thread; the process main thread is used when unset.
    pub ui_thread_name: Option<String>,
    /// `class.method` of frames that never make an actionable report; a
    /// package prefix on the frame's class still matches.
    pub uninteresting_frames: Vec<String>,
    /// Substrings of frames that indicate class / library loading.
    pub class_loading_markers: Vec<String>,
    /// Substrings of frames that indicate a JIT compilation stall.
    pub jit_stall_markers: Vec<String>,
    /// Substrings of lock names that are read locks shared by many holders.
    pub read_lock_markers: Vec<String>,
    /// Build label used in dump directory names.
    pub build: String,
    /// Root directory for dump directories.
    pub log_dir: PathBuf,
    /// Where the platform writes crash logs, for correlation on restart.
    pub crash_dir: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            unresponsive_interval_ms: 5_000,
            sampling_interval_ms: 5_000,
            latency_sampling_interval_ms: 1_000,
            tolerable_latency_ms: 100,
            apdex_frustration_factor: 4,
            dominant_stack_ratio: 0.25,
            max_dump_dirs: 100,
            dump_max_age_days: 10,
            cleanup_max_depth: 3,
            max_report_dumps: 20,
            freeze_reporting_enabled: true,
            debug_mode: false,
            ui_thread_name: None,
            uninteresting_frames: vec!["ProgressStream.writeProgress".to_string()],
            class_loading_markers: vec![
                "ClassLoader.loadClass".to_string(),
                "ClassLoader.defineClass".to_string(),
                "dlopen".to_string(),
            ],
            jit_stall_markers: vec![
                "CompileBroker::wait_for_completion".to_string(),
                "CodeCache::allocate".to_string(),
            ],
            read_lock_markers: vec!["ReadMostlyRWLock".to_string(), "RwLock".to_string()],
            build: "dev".to_string(),
            log_dir: std::env::temp_dir().join("freezewatch"),
            crash_dir: None,
        }
    }
}

impl WatcherConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file can't be read, isn't valid JSON, or
    /// fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WatcherError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatcherError::ConfigUnreadable { path: path.to_path_buf(), error: e.to_string() }
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that clamping can't make sensible.
    ///
    /// # Errors
    /// Returns [`WatcherError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !(self.dominant_stack_ratio > 0.0 && self.dominant_stack_ratio < 1.0) {
            return Err(WatcherError::InvalidConfig(format!(
                "dominant_stack_ratio must be in (0, 1), got {}",
                self.dominant_stack_ratio
            )));
        }
        if self.apdex_frustration_factor < 1 {
            return Err(WatcherError::InvalidConfig(
                "apdex_frustration_factor must be at least 1".to_string(),
            ));
        }
        if self.latency_sampling_interval_ms == 0 {
            return Err(WatcherError::InvalidConfig(
                "latency_sampling_interval_ms must be positive".to_string(),
            ));
        }
        if self.build.is_empty() || self.build.contains(std::path::MAIN_SEPARATOR) {
            return Err(WatcherError::InvalidConfig(format!(
                "build label '{}' can't be used in a directory name",
                self.build
            )));
        }
        Ok(())
    }

    /// Freeze threshold, clamped to 500..=20000 ms.
    #[must_use]
    pub fn unresponsive_interval(&self) -> Duration {
        Duration::from_millis(
            self.unresponsive_interval_ms.clamp(MIN_UNRESPONSIVE_MS, MAX_UNRESPONSIVE_MS),
        )
    }

    /// Interval between thread dumps while frozen, clamped to 500..=5000 ms.
    #[must_use]
    pub fn dump_interval(&self) -> Duration {
        Duration::from_millis(
            self.sampling_interval_ms.clamp(MIN_DUMP_INTERVAL_MS, MAX_DUMP_INTERVAL_MS),
        )
    }

    /// How long one freeze keeps dumping: `dump_interval × 20`, at most 40 s.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn max_dump_duration(&self) -> Duration {
        let per_freeze = self.dump_interval().as_millis() as u64
            * u64::from(freezewatch_common::MAX_DUMPS_PER_FREEZE);
        Duration::from_millis(per_freeze.min(MAX_DUMP_DURATION_MS))
    }

    #[must_use]
    pub fn latency_sampling_interval(&self) -> Duration {
        Duration::from_millis(self.latency_sampling_interval_ms)
    }

    #[must_use]
    pub fn dump_max_age(&self) -> Duration {
        Duration::from_secs(self.dump_max_age_days * 24 * 60 * 60)
    }

    /// Whether finished freezes are published as reports.
    #[must_use]
    pub fn reporting_active(&self) -> bool {
        self.freeze_reporting_enabled && !self.debug_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_are_clamped() {
        let config = WatcherConfig {
            unresponsive_interval_ms: 10,
            sampling_interval_ms: 60_000,
            ..WatcherConfig::default()
        };
        assert_eq!(config.unresponsive_interval(), Duration::from_millis(500));
        assert_eq!(config.dump_interval(), Duration::from_millis(5_000));

        let config = WatcherConfig { unresponsive_interval_ms: 90_000, ..config };
        assert_eq!(config.unresponsive_interval(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_max_dump_duration_caps_dump_count() {
        let config = WatcherConfig { sampling_interval_ms: 500, ..WatcherConfig::default() };
        assert_eq!(config.max_dump_duration(), Duration::from_millis(10_000));

        // 5000ms × 20 would be 100s; the cap keeps it at 40s.
        let config = WatcherConfig { sampling_interval_ms: 5_000, ..WatcherConfig::default() };
        assert_eq!(config.max_dump_duration(), Duration::from_millis(40_000));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WatcherConfig =
            serde_json::from_str(r#"{ "unresponsive_interval_ms": 1500, "build": "IU-243" }"#)
                .unwrap();
        assert_eq!(config.unresponsive_interval_ms, 1500);
        assert_eq!(config.build, "IU-243");
        assert_eq!(config.max_dump_dirs, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let config = WatcherConfig { dominant_stack_ratio: 1.5, ..WatcherConfig::default() };
        assert!(matches!(config.validate(), Err(WatcherError::InvalidConfig(_))));
    }

    #[test]
    fn test_debug_mode_disables_reporting() {
        let config = WatcherConfig { debug_mode: true, ..WatcherConfig::default() };
        assert!(!config.reporting_active());
        assert!(WatcherConfig::default().reporting_active());
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = WatcherConfig::from_file("/nonexistent/freezewatch.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/freezewatch.json"));
    }
}
