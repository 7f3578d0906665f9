//! Freeze report building.
//!
//! Turns a finished [`FreezeEpisode`] into a [`FreezeReport`]: who to blame,
//! how much of the freeze went to GC and class loading, and the textual
//! artifacts that go along with it.
//!
//! ## Pipeline
//!
//! ```text
//! snapshots ──► select_cause_thread() per tick ──► CallTree::build()
//!                                                      │
//!          dominant common stack (≥ 25% of weight) ◄───┤
//!          ... or common suffix of UI stacks     ◄─────┘ (fallback)
//!                          │
//!                          ▼
//!        suppressed if empty / uninteresting, else FreezeReport
//! ```

// Percentages are ratios of sample counts and durations
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use freezewatch_common::{StackFrame, ThreadInfo};

use super::call_tree::CallTree;
use super::cause_thread::select_cause_thread;
use crate::config::WatcherConfig;
use crate::domain::ReportError;
use crate::freeze::FreezeEpisode;
use crate::snapshot::render_dump;

/// A text file shipped with a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// Deduplicatable description of one freeze.
#[derive(Debug, Clone)]
pub struct FreezeReport {
    pub duration: std::time::Duration,
    /// Human-readable summary, first line names the blamed frame
    pub message: String,
    /// Blamed call path, entry point first
    pub dominant_stack: Vec<StackFrame>,
    /// Stable across freezes with the same cause; ignores line numbers
    pub dedup_key: String,
    /// Indented call tree of the cause threads
    pub call_tree_dump: String,
    pub gc_percent: u32,
    pub class_loading_percent: u32,
    pub cpu_load_percent: Option<u32>,
    pub jit_problem: bool,
    /// Every cause thread was the UI thread itself
    pub all_in_ui_thread: bool,
    pub closing: bool,
    /// `report-<secs>s.txt` first, then sampled dumps and crash logs
    pub attachments: Vec<Attachment>,
}

impl FreezeReport {
    /// Innermost blamed frame.
    #[must_use]
    pub fn blamed_frame(&self) -> Option<&StackFrame> {
        self.dominant_stack.last()
    }

    /// Write every attachment into `dir`.
    ///
    /// # Errors
    /// Returns the first write failure; files written before it stay.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        self.attachments
            .iter()
            .map(|attachment| {
                let path = dir.join(&attachment.name);
                fs::write(&path, &attachment.content)
                    .map_err(|source| ReportError::WriteFailed { path: path.clone(), source })?;
                Ok(path)
            })
            .collect()
    }

    /// Like [`Self::write_to`], but failures are logged and swallowed.
    pub fn persist(&self, dir: &Path) -> Vec<PathBuf> {
        match self.write_to(dir) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to persist freeze report: {e}");
                Vec::new()
            }
        }
    }
}

/// Builds freeze reports according to the configured policy.
pub struct FreezeReportBuilder<'a> {
    config: &'a WatcherConfig,
}

impl<'a> FreezeReportBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a WatcherConfig) -> Self {
        Self { config }
    }

    /// Build the report, or `None` when there is no actionable stack.
    #[must_use]
    pub fn build(&self, episode: &FreezeEpisode) -> Option<FreezeReport> {
        let causes: Vec<&ThreadInfo> = episode
            .snapshots
            .iter()
            .filter_map(|s| select_cause_thread(s, &self.config.read_lock_markers))
            .collect();
        if causes.is_empty() {
            debug!("Freeze without UI thread samples, no report");
            return None;
        }

        let weight_ms = episode.dump_interval.as_millis() as u64;
        let tree = CallTree::build(causes.iter().copied(), weight_ms);
        let threshold = (tree.total_time_ms() as f64 * self.config.dominant_stack_ratio) as u64;

        let dominant_stack = match tree.find_dominant_common_stack(threshold) {
            Some(node) => tree.stack_to(node),
            None => self.common_ui_suffix(episode),
        };

        let Some(blamed) = dominant_stack.last() else {
            debug!("No dominant stack in {} samples, no report", causes.len());
            return None;
        };
        if self.is_uninteresting(blamed) {
            debug!("Dominant frame {} is uninteresting, no report", blamed.qualified_name());
            return None;
        }

        let class_loading = causes
            .iter()
            .filter(|t| t.has_frame_matching(&self.config.class_loading_markers))
            .count();
        let class_loading_percent = percent(class_loading as f64, causes.len() as f64);
        let gc_percent =
            percent(episode.gc_time.as_secs_f64(), episode.duration.as_secs_f64());
        let cpu_load_percent = episode.cpu_load_percent.map(|p| p.round() as u32);
        let all_in_ui_thread = episode
            .snapshots
            .iter()
            .filter_map(|s| select_cause_thread(s, &self.config.read_lock_markers).map(|c| (s, c)))
            .all(|(s, cause)| s.ui_thread == Some(cause.tid));

        let call_tree_dump = tree.dump();
        let duration_secs = episode.duration.as_secs();

        let mut message = format!(
            "Freeze in {} for {duration_secs} seconds\n\
             Sampled time: {}ms, sampling rate: {}ms, GC time: {}ms ({gc_percent}%), \
             class loading: {class_loading_percent}%",
            blamed.qualified_name(),
            tree.total_time_ms(),
            weight_ms,
            episode.gc_time.as_millis(),
        );
        if let Some(cpu) = cpu_load_percent {
            let _ = write!(message, ", CPU load: {cpu}%");
        }
        if episode.jit_problem {
            message.push_str("\nJIT compilation stall observed");
        }
        if !all_in_ui_thread {
            message.push_str("\nUI thread was waiting for another thread");
        }
        if episode.closing {
            message.push_str("\nApplication was closing");
        }

        let mut attachments = vec![Attachment {
            name: format!("report-{duration_secs}s.txt"),
            content: call_tree_dump.clone(),
        }];
        attachments.extend(self.sampled_dumps(episode));
        attachments.extend(crash_attachments(&episode.crash_artifacts));

        Some(FreezeReport {
            duration: episode.duration,
            message,
            dedup_key: dedup_key(&dominant_stack),
            dominant_stack,
            call_tree_dump,
            gc_percent,
            class_loading_percent,
            cpu_load_percent,
            jit_problem: episode.jit_problem,
            all_in_ui_thread,
            closing: episode.closing,
            attachments,
        })
    }

    /// Exact match, or a match after a package prefix (`com.x.` + pattern).
    fn is_uninteresting(&self, frame: &StackFrame) -> bool {
        let name = frame.qualified_name();
        self.config.uninteresting_frames.iter().any(|pattern| {
            name.strip_suffix(pattern.as_str())
                .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('.'))
        })
    }

    /// Longest common entry-point path of the UI thread's own stacks.
    fn common_ui_suffix(&self, episode: &FreezeEpisode) -> Vec<StackFrame> {
        let mut stacks = episode
            .snapshots
            .iter()
            .filter_map(|s| s.ui_thread_info())
            .map(|t| t.stack.iter().rev());

        let Some(first) = stacks.next() else {
            return Vec::new();
        };
        let mut common: Vec<StackFrame> = first.cloned().collect();
        for stack in stacks {
            let shared = common.iter().zip(stack).take_while(|(a, b)| a.same_location(b)).count();
            common.truncate(shared);
        }
        common
    }

    /// Up to `max_report_dumps` evenly spaced raw dumps.
    fn sampled_dumps(&self, episode: &FreezeEpisode) -> Vec<Attachment> {
        let total = episode.snapshots.len();
        let count = total.min(self.config.max_report_dumps);
        (0..count)
            .map(|i| {
                let snapshot = &episode.snapshots[i * total / count];
                Attachment { name: format!("dump-{}.txt", i + 1), content: render_dump(snapshot) }
            })
            .collect()
    }
}

fn percent(part: f64, whole: f64) -> u32 {
    if whole <= 0.0 {
        0
    } else {
        (part / whole * 100.0).round().min(100.0) as u32
    }
}

/// Innermost first, one `class.method` per line.
fn dedup_key(stack: &[StackFrame]) -> String {
    stack.iter().rev().map(StackFrame::qualified_name).collect::<Vec<_>>().join("\n")
}

fn crash_attachments(paths: &[PathBuf]) -> Vec<Attachment> {
    paths
        .iter()
        .filter_map(|path| match fs::read(path) {
            Ok(bytes) => Some(Attachment {
                name: path.file_name()?.to_string_lossy().into_owned(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => {
                warn!("Cannot attach crash log {}: {e}", path.display());
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezewatch_common::{ThreadSnapshot, ThreadState};
    use std::time::Duration;

    fn f(method: &str) -> StackFrame {
        StackFrame::new("app.Main", method, "Main.java", 1)
    }

    /// UI thread (tid 1) with a stack given outermost first
    fn ui_snapshot(state: ThreadState, outermost_first: &[StackFrame]) -> ThreadSnapshot {
        let mut stack = outermost_first.to_vec();
        stack.reverse();
        ThreadSnapshot {
            timestamp_ms: 0,
            ui_thread: Some(1),
            threads: vec![ThreadInfo::new(1, "ui", state).with_stack(stack)],
        }
    }

    fn episode(snapshots: Vec<ThreadSnapshot>) -> FreezeEpisode {
        FreezeEpisode::from_snapshots(snapshots, Duration::from_secs(12), Duration::from_millis(500), &[])
    }

    #[test]
    fn test_report_blames_dominant_frame() {
        let config = WatcherConfig::default();
        let mut snapshots = vec![ui_snapshot(ThreadState::Runnable, &[f("run"), f("paint")]); 3];
        snapshots.push(ui_snapshot(ThreadState::Runnable, &[f("run"), f("index")]));

        let report = FreezeReportBuilder::new(&config).build(&episode(snapshots)).unwrap();
        assert_eq!(report.blamed_frame().unwrap().method, "paint");
        assert!(report.message.starts_with("Freeze in app.Main.paint for 12 seconds"));
        assert_eq!(report.dedup_key, "app.Main.paint\napp.Main.run");
        assert!(report.all_in_ui_thread);
        assert_eq!(report.attachments[0].name, "report-12s.txt");
        assert_eq!(report.attachments[0].content, report.call_tree_dump);
        assert_eq!(report.attachments.len(), 1 + 4);
    }

    #[test]
    fn test_uninteresting_single_frame_is_suppressed() {
        let config = WatcherConfig {
            uninteresting_frames: vec!["app.Main.writeProgress".to_string()],
            ..WatcherConfig::default()
        };
        let snapshots = vec![ui_snapshot(ThreadState::Runnable, &[f("writeProgress")]); 4];
        assert!(FreezeReportBuilder::new(&config).build(&episode(snapshots)).is_none());
    }

    #[test]
    fn test_uninteresting_frame_matches_behind_package() {
        let config = WatcherConfig::default();
        let single = |class: &str| {
            let frame = StackFrame::new(class, "writeProgress", "ProgressStream.java", 7);
            let snapshot = ThreadSnapshot {
                timestamp_ms: 0,
                ui_thread: Some(1),
                threads: vec![ThreadInfo::new(1, "ui", ThreadState::Runnable).with_stack(vec![frame])],
            };
            episode(vec![snapshot; 4])
        };

        let builder = FreezeReportBuilder::new(&config);
        assert!(builder.build(&single("com.acme.io.ProgressStream")).is_none());
        assert!(builder.build(&single("com.acme.io.MyProgressStream")).is_some());
    }

    #[test]
    fn test_empty_stacks_are_suppressed() {
        let config = WatcherConfig::default();
        let snapshots = vec![ui_snapshot(ThreadState::Runnable, &[]); 4];
        assert!(FreezeReportBuilder::new(&config).build(&episode(snapshots)).is_none());
        assert!(FreezeReportBuilder::new(&config).build(&episode(Vec::new())).is_none());
    }

    #[test]
    fn test_falls_back_to_common_ui_suffix() {
        let config = WatcherConfig::default();
        // UI thread is blocked on a lock each time, owner threads all differ,
        // so no cause path reaches 25% but the UI stacks share "run → lock".
        let snapshots: Vec<ThreadSnapshot> = (0..5u64)
            .map(|i| {
                let mut s = ui_snapshot(ThreadState::Blocked, &[f("run"), f("lock")]);
                s.threads[0].lock_owner = Some(100 + i);
                s.threads.push(
                    ThreadInfo::new(100 + i, format!("w{i}"), ThreadState::Runnable)
                        .with_stack(vec![f(&format!("job{i}"))]),
                );
                s
            })
            .collect();

        let report = FreezeReportBuilder::new(&config).build(&episode(snapshots)).unwrap();
        let methods: Vec<&str> = report.dominant_stack.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(methods, ["run", "lock"]);
        assert!(!report.all_in_ui_thread);
    }

    #[test]
    fn test_metrics() {
        let config = WatcherConfig {
            class_loading_markers: vec!["loadClass".to_string()],
            ..WatcherConfig::default()
        };
        let mut snapshots = vec![ui_snapshot(ThreadState::Runnable, &[f("run"), f("paint")]); 3];
        snapshots.push(ui_snapshot(ThreadState::Runnable, &[f("run"), f("loadClass")]));
        let mut episode = episode(snapshots);
        episode.gc_time = Duration::from_millis(1_200);
        episode.cpu_load_percent = Some(45.4);

        let report = FreezeReportBuilder::new(&config).build(&episode).unwrap();
        assert_eq!(report.class_loading_percent, 25);
        assert_eq!(report.gc_percent, 10);
        assert_eq!(report.cpu_load_percent, Some(45));
        assert!(report.message.contains("GC time: 1200ms (10%)"));
    }

    #[test]
    fn test_sampled_dumps_are_evenly_spaced_and_capped() {
        let config = WatcherConfig { max_report_dumps: 3, ..WatcherConfig::default() };
        let snapshots: Vec<ThreadSnapshot> = (0..9u64)
            .map(|i| {
                let mut s = ui_snapshot(ThreadState::Runnable, &[f("run")]);
                s.timestamp_ms = i;
                s
            })
            .collect();
        let report = FreezeReportBuilder::new(&config).build(&episode(snapshots)).unwrap();
        let dumps: Vec<&Attachment> =
            report.attachments.iter().filter(|a| a.name.starts_with("dump-")).collect();
        assert_eq!(dumps.len(), 3);
        assert!(dumps[0].content.starts_with("Thread dump at 0"));
        assert!(dumps[1].content.starts_with("Thread dump at 3"));
        assert!(dumps[2].content.starts_with("Thread dump at 6"));
    }

    #[test]
    fn test_write_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatcherConfig::default();
        let snapshots = vec![ui_snapshot(ThreadState::Runnable, &[f("run")]); 2];
        let report = FreezeReportBuilder::new(&config).build(&episode(snapshots)).unwrap();

        let written = report.write_to(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("report-12s.txt").exists());
        assert!(dir.path().join("dump-2.txt").exists());
    }
}
