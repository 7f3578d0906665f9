//! One confirmed freeze, from detection to the UI responding again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use freezewatch_common::ThreadSnapshot;

use crate::sampling::SamplingTask;

/// Everything known about a finished freeze.
///
/// Built once the UI thread responds again (or when a freeze is replayed from
/// disk), handed to the report builder, then dropped.
#[derive(Debug, Clone)]
pub struct FreezeEpisode {
    /// Wall-clock start of the freeze, milliseconds since the Unix epoch
    pub started_at_ms: u64,
    /// From the start of the UI event to its end
    pub duration: Duration,
    /// Interval the snapshots were taken at; weight of one sample
    pub dump_interval: Duration,
    pub snapshots: Arc<Vec<Arc<ThreadSnapshot>>>,
    /// Collector pause time accumulated while sampling
    pub gc_time: Duration,
    /// System load in percent of available CPUs when sampling started
    pub cpu_load_percent: Option<f64>,
    /// The application was shutting down
    pub closing: bool,
    /// A JIT compilation stall was seen in at least one snapshot
    pub jit_problem: bool,
    /// Platform crash logs of the process that logged this freeze
    pub crash_artifacts: Vec<PathBuf>,
}

impl FreezeEpisode {
    /// Episode from a sampling task that has stopped.
    #[must_use]
    pub fn from_task(
        task: &SamplingTask,
        started_at_ms: u64,
        duration: Duration,
        closing: bool,
        jit_markers: &[String],
    ) -> Self {
        let snapshots = task.snapshots();
        let jit_problem = snapshots.iter().any(|s| has_jit_stall(s, jit_markers));
        Self {
            started_at_ms,
            duration,
            dump_interval: task.interval(),
            snapshots,
            gc_time: task.gc_time(),
            cpu_load_percent: task.cpu_load_percent(),
            closing,
            jit_problem,
            crash_artifacts: Vec::new(),
        }
    }

    /// Episode rebuilt from dump files.
    ///
    /// GC time and CPU load aren't recorded in dumps and are left empty.
    #[must_use]
    pub fn from_snapshots(
        snapshots: Vec<ThreadSnapshot>,
        duration: Duration,
        dump_interval: Duration,
        jit_markers: &[String],
    ) -> Self {
        let jit_problem = snapshots.iter().any(|s| has_jit_stall(s, jit_markers));
        let started_at_ms = snapshots.first().map_or(0, |s| s.timestamp_ms);
        Self {
            started_at_ms,
            duration,
            dump_interval,
            snapshots: Arc::new(snapshots.into_iter().map(Arc::new).collect()),
            gc_time: Duration::ZERO,
            cpu_load_percent: None,
            closing: false,
            jit_problem,
            crash_artifacts: Vec::new(),
        }
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.snapshots.len()
    }
}

/// Any thread of the snapshot sits in a JIT compilation stall frame.
#[must_use]
pub fn has_jit_stall(snapshot: &ThreadSnapshot, markers: &[String]) -> bool {
    !markers.is_empty() && snapshot.threads.iter().any(|t| t.has_frame_matching(markers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezewatch_common::{StackFrame, ThreadInfo, ThreadState};

    fn snapshot(method: &str) -> ThreadSnapshot {
        ThreadSnapshot {
            timestamp_ms: 42,
            ui_thread: Some(1),
            threads: vec![ThreadInfo::new(9, "C2 CompilerThread0", ThreadState::Runnable)
                .with_stack(vec![StackFrame::method(method)])],
        }
    }

    #[test]
    fn test_jit_stall_detection() {
        let markers = vec!["CodeCache::allocate".to_string()];
        assert!(has_jit_stall(&snapshot("CodeCache::allocate"), &markers));
        assert!(!has_jit_stall(&snapshot("Parse::do_one_block"), &markers));
        assert!(!has_jit_stall(&snapshot("CodeCache::allocate"), &[]));
    }

    #[test]
    fn test_from_snapshots_takes_first_timestamp() {
        let episode = FreezeEpisode::from_snapshots(
            vec![snapshot("a"), snapshot("CodeCache::allocate")],
            Duration::from_secs(12),
            Duration::from_millis(500),
            &["CodeCache::allocate".to_string()],
        );
        assert_eq!(episode.started_at_ms, 42);
        assert_eq!(episode.sample_count(), 2);
        assert!(episode.jit_problem);
        assert_eq!(episode.gc_time, Duration::ZERO);
    }
}
