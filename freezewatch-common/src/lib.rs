//! # Shared Data Structures (Sampler ↔ Analysis ↔ Dump Files)
//!
//! Defines the thread snapshot model shared between the sampling side, the
//! freeze analysis and the on-disk dump format. Everything here is plain data
//! with `serde` derives so snapshots can be persisted and replayed.
//!
//! ## Key Types
//!
//! - [`ThreadSnapshot`] - Every live thread of a process at one instant
//! - [`ThreadInfo`] - One thread: identity, state, lock relations, call stack
//! - [`StackFrame`] - One call-stack entry (class, method, file, line)
//! - [`ThreadState`] - Scheduling state of a thread at capture time
//!
//! ## Stack Orientation
//!
//! Stacks are stored **innermost frame first**, the way thread dumps print
//! them: `stack[0]` is the function that was executing, the last element is
//! the thread entry point.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Dump Layout Constants
// ============================================================================

/// Prefix shared by every dump directory under the log directory.
pub const DUMP_DIR_PREFIX: &str = "threadDumps-";

/// Prefix of directories holding the dumps of one freeze.
pub const FREEZE_DIR_PREFIX: &str = "threadDumps-freeze-";

/// Prefix of individual thread dump files inside a dump directory.
pub const DUMP_FILE_PREFIX: &str = "dump";

/// Extension of thread dump files.
pub const DUMP_FILE_EXTENSION: &str = "txt";

/// Marker holding the elapsed freeze time in whole seconds.
///
/// Present only while a freeze is being logged. If it survives a restart the
/// process died mid-freeze.
pub const DURATION_MARKER: &str = ".duration";

/// Marker holding the PID of the process that logged the freeze.
pub const PID_MARKER: &str = ".pid";

/// Marker holding a free-form description of the application build.
pub const APPINFO_MARKER: &str = ".appinfo";

/// Upper bound on dump files kept per freeze, whatever the interval.
pub const MAX_DUMPS_PER_FREEZE: u32 = 20;

// ============================================================================
// Thread State
// ============================================================================

/// Scheduling state of a thread when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ThreadState {
    /// On CPU or ready to run
    Runnable,
    /// Waiting to enter a monitor / uninterruptible sleep
    Blocked,
    /// Parked or sleeping without a deadline
    Waiting,
    /// Parked or sleeping with a deadline
    TimedWaiting,
    /// Exited but not yet reaped
    Terminated,
    /// Platform reported something we don't model
    #[default]
    Unknown,
}

impl ThreadState {
    /// Name used in thread dump text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::Runnable => "RUNNABLE",
            ThreadState::Blocked => "BLOCKED",
            ThreadState::Waiting => "WAITING",
            ThreadState::TimedWaiting => "TIMED_WAITING",
            ThreadState::Terminated => "TERMINATED",
            ThreadState::Unknown => "UNKNOWN",
        }
    }

    /// Map the state letter from `/proc/<pid>/task/<tid>/stat`.
    #[must_use]
    pub fn from_proc_letter(letter: char) -> Self {
        match letter {
            'R' => ThreadState::Runnable,
            'D' => ThreadState::Blocked,
            'S' | 'I' | 'T' | 't' => ThreadState::Waiting,
            'Z' | 'X' | 'x' => ThreadState::Terminated,
            _ => ThreadState::Unknown,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a dump contains a state name we don't know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownThreadState(pub String);

impl fmt::Display for UnknownThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown thread state '{}'", self.0)
    }
}

impl std::error::Error for UnknownThreadState {}

impl FromStr for ThreadState {
    type Err = UnknownThreadState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNABLE" => Ok(ThreadState::Runnable),
            "BLOCKED" => Ok(ThreadState::Blocked),
            "WAITING" => Ok(ThreadState::Waiting),
            "TIMED_WAITING" => Ok(ThreadState::TimedWaiting),
            "TERMINATED" => Ok(ThreadState::Terminated),
            "UNKNOWN" => Ok(ThreadState::Unknown),
            other => Err(UnknownThreadState(other.to_string())),
        }
    }
}

// ============================================================================
// Stack Frame
// ============================================================================

/// A single call-stack entry.
///
/// `class` is the declaring type (or module) when the platform reports one;
/// native frames usually only carry a method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub class: Option<String>,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    /// Frame with only a method name (native / kernel frames).
    pub fn method(method: impl Into<String>) -> Self {
        Self { class: None, method: method.into(), file: None, line: None }
    }

    /// Fully described frame.
    pub fn new(
        class: impl Into<String>,
        method: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            class: Some(class.into()),
            method: method.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// `class.method`, or just `method` for frames without a class.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{class}.{}", self.method),
            None => self.method.clone(),
        }
    }

    /// Same class, method and file. Line numbers are ignored so that samples
    /// landing on different lines of one function merge together.
    #[must_use]
    pub fn same_location(&self, other: &StackFrame) -> bool {
        self.method == other.method && self.class == other.class && self.file == other.file
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.qualified_name())?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}")?,
            (Some(file), None) => write!(f, "{file}")?,
            (None, _) => f.write_str("Unknown Source")?,
        }
        f.write_str(")")
    }
}

// ============================================================================
// Thread Info
// ============================================================================

/// One thread as seen at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// OS thread id
    pub tid: u64,
    pub name: String,
    pub state: ThreadState,
    /// Innermost frame first
    pub stack: Vec<StackFrame>,
    /// Thread owning the lock this one waits for, when the platform knows it
    pub lock_owner: Option<u64>,
    /// Name of the lock this thread is blocked on
    pub blocked_on: Option<String>,
    /// Names of locks currently held by this thread
    pub held_locks: Vec<String>,
}

impl ThreadInfo {
    /// Thread with no stack and no lock relations.
    pub fn new(tid: u64, name: impl Into<String>, state: ThreadState) -> Self {
        Self {
            tid,
            name: name.into(),
            state,
            stack: Vec::new(),
            lock_owner: None,
            blocked_on: None,
            held_locks: Vec::new(),
        }
    }

    /// Builder-style stack setter.
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.state == ThreadState::Runnable
    }

    /// True if any frame's `class.method` contains one of `markers`.
    #[must_use]
    pub fn has_frame_matching(&self, markers: &[String]) -> bool {
        self.stack.iter().any(|frame| {
            let name = frame.qualified_name();
            markers.iter().any(|m| name.contains(m.as_str()))
        })
    }
}

// ============================================================================
// Thread Snapshot
// ============================================================================

/// All live threads of a process at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Thread id of the UI / event-dispatch thread, if it was identified
    pub ui_thread: Option<u64>,
    pub threads: Vec<ThreadInfo>,
}

impl ThreadSnapshot {
    /// Snapshot without threads, used when introspection is unavailable.
    #[must_use]
    pub fn empty(timestamp_ms: u64) -> Self {
        Self { timestamp_ms, ui_thread: None, threads: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    #[must_use]
    pub fn thread(&self, tid: u64) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.tid == tid)
    }

    /// The UI thread, if it was identified and is present.
    #[must_use]
    pub fn ui_thread_info(&self) -> Option<&ThreadInfo> {
        self.ui_thread.and_then(|tid| self.thread(tid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_location_ignores_line() {
        let a = StackFrame::new("app.Editor", "paint", "Editor.java", 10);
        let b = StackFrame::new("app.Editor", "paint", "Editor.java", 99);
        let c = StackFrame::new("app.Editor", "layout", "Editor.java", 10);
        assert!(a.same_location(&b));
        assert!(!a.same_location(&c));
    }

    #[test]
    fn test_frame_display() {
        let frame = StackFrame::new("app.Editor", "paint", "Editor.java", 10);
        assert_eq!(frame.to_string(), "app.Editor.paint(Editor.java:10)");
        assert_eq!(StackFrame::method("do_sys_poll").to_string(), "do_sys_poll(Unknown Source)");
    }

    #[test]
    fn test_thread_state_round_trip_names() {
        for state in [
            ThreadState::Runnable,
            ThreadState::Blocked,
            ThreadState::Waiting,
            ThreadState::TimedWaiting,
            ThreadState::Terminated,
            ThreadState::Unknown,
        ] {
            assert_eq!(state.as_str().parse::<ThreadState>(), Ok(state));
        }
        assert!("SPINNING".parse::<ThreadState>().is_err());
    }

    #[test]
    fn test_proc_letters() {
        assert_eq!(ThreadState::from_proc_letter('R'), ThreadState::Runnable);
        assert_eq!(ThreadState::from_proc_letter('D'), ThreadState::Blocked);
        assert_eq!(ThreadState::from_proc_letter('S'), ThreadState::Waiting);
        assert_eq!(ThreadState::from_proc_letter('Z'), ThreadState::Terminated);
        assert_eq!(ThreadState::from_proc_letter('?'), ThreadState::Unknown);
    }

    #[test]
    fn test_ui_thread_lookup() {
        let snapshot = ThreadSnapshot {
            timestamp_ms: 1,
            ui_thread: Some(7),
            threads: vec![
                ThreadInfo::new(3, "worker", ThreadState::Waiting),
                ThreadInfo::new(7, "ui", ThreadState::Runnable),
            ],
        };
        assert_eq!(snapshot.ui_thread_info().map(|t| t.name.as_str()), Some("ui"));
        assert!(ThreadSnapshot::empty(5).ui_thread_info().is_none());
    }
}
