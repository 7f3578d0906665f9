//! Linux thread introspection via `/proc`
//!
//! Reads `/proc/<pid>/task/*` for every thread of the watched process:
//! - `comm` → thread name
//! - `stat` → scheduling state letter
//! - `stack` → kernel stack (usually needs `CAP_SYS_ADMIN`; skipped when unreadable)
//!
//! Threads can exit between listing and reading, so every per-thread read is
//! allowed to fail; the thread is simply left out of the snapshot.

use log::debug;
use std::fs;
use std::path::PathBuf;

use freezewatch_common::{StackFrame, ThreadInfo, ThreadSnapshot, ThreadState};

use super::{epoch_ms, ThreadSnapshotProvider};
use crate::domain::{Pid, Tid};

/// Snapshot provider backed by the `/proc` filesystem.
#[derive(Debug, Clone)]
pub struct ProcSnapshotProvider {
    pid: Pid,
    ui_thread_name: Option<String>,
    kernel_stacks: bool,
}

impl ProcSnapshotProvider {
    /// Provider for `pid`. The UI thread defaults to the main thread (TID == PID).
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self { pid, ui_thread_name: None, kernel_stacks: true }
    }

    /// Provider for the running process.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Pid::current())
    }

    /// Identify the UI thread by name instead of by TID.
    #[must_use]
    pub fn with_ui_thread_name(mut self, name: Option<String>) -> Self {
        self.ui_thread_name = name;
        self
    }

    /// Enable or disable reading `/proc/.../stack`.
    #[must_use]
    pub fn with_kernel_stacks(mut self, enabled: bool) -> Self {
        self.kernel_stacks = enabled;
        self
    }

    fn task_dir(&self) -> PathBuf {
        PathBuf::from(format!("/proc/{}/task", self.pid.0))
    }

    fn read_thread(&self, tid: u64) -> Option<ThreadInfo> {
        let dir = self.task_dir().join(tid.to_string());

        let name = fs::read_to_string(dir.join("comm")).ok()?.trim().to_string();
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let state = parse_stat_state(&stat).map_or(ThreadState::Unknown, ThreadState::from_proc_letter);

        let stack = if self.kernel_stacks {
            fs::read_to_string(dir.join("stack"))
                .map(|text| parse_kernel_stack(&text))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Some(ThreadInfo::new(tid, name, state).with_stack(stack))
    }

    fn ui_thread_of(&self, threads: &[ThreadInfo]) -> Option<u64> {
        match &self.ui_thread_name {
            Some(name) => threads.iter().find(|t| &t.name == name).map(|t| t.tid),
            None => {
                let main = Tid::from(self.pid).0;
                threads.iter().any(|t| t.tid == main).then_some(main)
            }
        }
    }
}

impl ThreadSnapshotProvider for ProcSnapshotProvider {
    fn capture_all(&self) -> ThreadSnapshot {
        let timestamp_ms = epoch_ms();
        let task_dir = self.task_dir();

        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {e}", task_dir.display());
                return ThreadSnapshot::empty(timestamp_ms);
            }
        };

        let mut threads: Vec<ThreadInfo> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let tid = entry.file_name().to_string_lossy().parse::<u64>().ok()?;
                self.read_thread(tid)
            })
            .collect();
        threads.sort_by_key(|t| t.tid);

        let ui_thread = self.ui_thread_of(&threads);
        ThreadSnapshot { timestamp_ms, ui_thread, threads }
    }

    fn capture_one(&self, tid: Tid) -> Option<ThreadInfo> {
        self.read_thread(tid.0)
    }
}

/// Extract the state letter from `/proc/<pid>/task/<tid>/stat`.
/// Format: "tid (comm) S ..." where comm may itself contain parentheses.
fn parse_stat_state(stat_line: &str) -> Option<char> {
    let close = stat_line.rfind(')')?;
    stat_line[close + 1..].trim_start().chars().next()
}

/// Parse kernel stack lines like `[<0>] do_sys_poll+0x2c0/0x500`.
fn parse_kernel_stack(text: &str) -> Vec<StackFrame> {
    text.lines()
        .filter_map(|line| {
            let symbol = line.split_once("] ").map_or(line, |(_, rest)| rest).trim();
            let name = symbol.split('+').next()?.trim();
            (!name.is_empty()).then(|| StackFrame::method(name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_state() {
        assert_eq!(parse_stat_state("1234 (my-app) S 1 1234 1234 0"), Some('S'));
        // Command names can contain parentheses
        assert_eq!(parse_stat_state("1234 (app (v2)) R 1 1234"), Some('R'));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[test]
    fn test_parse_kernel_stack() {
        let text = "[<0>] do_sys_poll+0x2c0/0x500\n[<0>] __x64_sys_poll+0xa5/0x140\n";
        let frames = parse_kernel_stack(text);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].method, "do_sys_poll");
        assert_eq!(frames[1].method, "__x64_sys_poll");
        assert!(frames[0].class.is_none());
    }

    #[test]
    fn test_capture_self_process() {
        // The test process always has at least its own thread
        let provider = ProcSnapshotProvider::current().with_kernel_stacks(false);
        let snapshot = provider.capture_all();
        assert!(!snapshot.is_empty());
        assert!(snapshot.threads.windows(2).all(|w| w[0].tid < w[1].tid));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_captured_snapshots_round_trip_and_aggregate() {
        use crate::analysis::FreezeReportBuilder;
        use crate::config::WatcherConfig;
        use crate::freeze::FreezeEpisode;
        use crate::snapshot::{parse_dump, render_dump};
        use std::time::Duration;

        // Kernel stacks need CAP_SYS_ADMIN, so the UI thread gets a fixed one
        let kernel_stack = parse_kernel_stack(
            "[<0>] futex_wait_queue+0x60/0x90\n[<0>] futex_wait+0x175/0x260\n[<0>] do_futex+0x106/0x1b0\n",
        );
        let provider = ProcSnapshotProvider::current().with_kernel_stacks(false);

        let captured: Vec<ThreadSnapshot> = (0..2)
            .map(|_| {
                let mut snapshot = provider.capture_all();
                let ui = snapshot.ui_thread.expect("main thread is always listed");

                let parsed = parse_dump(&render_dump(&snapshot)).unwrap();
                assert_eq!(parsed.ui_thread, Some(ui));
                assert_eq!(parsed.threads.len(), snapshot.threads.len());
                for (before, after) in snapshot.threads.iter().zip(&parsed.threads) {
                    assert_eq!((before.tid, &before.name, before.state), (after.tid, &after.name, after.state));
                }

                let main = snapshot.threads.iter_mut().find(|t| t.tid == ui).unwrap();
                main.state = ThreadState::Runnable;
                main.stack = kernel_stack.clone();
                parse_dump(&render_dump(&snapshot)).unwrap()
            })
            .collect();

        let config = WatcherConfig::default();
        let episode = FreezeEpisode::from_snapshots(
            captured,
            Duration::from_secs(10),
            config.dump_interval(),
            &config.jit_stall_markers,
        );
        let report = FreezeReportBuilder::new(&config).build(&episode).expect("kernel stack is actionable");
        assert_eq!(report.blamed_frame().unwrap().method, "futex_wait_queue");
        assert_eq!(report.dedup_key, "futex_wait_queue\nfutex_wait\ndo_futex");
    }

    #[test]
    fn test_invalid_pid_degrades_to_empty() {
        let provider = ProcSnapshotProvider::new(Pid(999_999_999));
        let snapshot = provider.capture_all();
        assert!(snapshot.is_empty());
        assert!(snapshot.ui_thread.is_none());
        assert!(provider.capture_one(Tid(1)).is_none());
    }
}
