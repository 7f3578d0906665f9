//! The thread introspection seam.
//!
//! Sampling only ever talks to [`ThreadSnapshotProvider`]. Implementations
//! must never fail loudly: when the platform API is unavailable they return
//! an empty snapshot and sampling carries on at reduced fidelity.

use std::sync::Mutex;

use freezewatch_common::{ThreadInfo, ThreadSnapshot};

use super::epoch_ms;
use crate::domain::Tid;

/// Captures thread stacks of the watched process.
///
/// Called from the sampler's background task at sub-second intervals, so
/// implementations should be cheap and must not wait on the UI thread.
pub trait ThreadSnapshotProvider: Send + Sync {
    /// Every live thread at call time. Empty snapshot on failure.
    fn capture_all(&self) -> ThreadSnapshot;

    /// A single thread, `None` if it doesn't exist or can't be read.
    fn capture_one(&self, tid: Tid) -> Option<ThreadInfo>;
}

/// Serves a fixed sequence of snapshots, repeating the last one forever.
///
/// Used to replay recorded dumps through the sampling path and as the fake
/// platform in tests.
#[derive(Debug)]
pub struct StaticSnapshotProvider {
    snapshots: Vec<ThreadSnapshot>,
    next: Mutex<usize>,
}

impl StaticSnapshotProvider {
    #[must_use]
    pub fn new(snapshots: Vec<ThreadSnapshot>) -> Self {
        Self { snapshots, next: Mutex::new(0) }
    }

    /// Number of snapshots handed out so far.
    #[must_use]
    pub fn captures(&self) -> usize {
        self.next.lock().map_or(0, |n| *n)
    }
}

impl ThreadSnapshotProvider for StaticSnapshotProvider {
    fn capture_all(&self) -> ThreadSnapshot {
        let Ok(mut next) = self.next.lock() else {
            return ThreadSnapshot::empty(epoch_ms());
        };
        let index = (*next).min(self.snapshots.len().saturating_sub(1));
        *next += 1;
        let mut snapshot =
            self.snapshots.get(index).cloned().unwrap_or_else(|| ThreadSnapshot::empty(0));
        snapshot.timestamp_ms = epoch_ms();
        snapshot
    }

    fn capture_one(&self, tid: Tid) -> Option<ThreadInfo> {
        let index = self.next.lock().map_or(0, |n| *n).saturating_sub(1);
        self.snapshots
            .get(index.min(self.snapshots.len().saturating_sub(1)))
            .and_then(|s| s.thread(tid.0))
            .cloned()
    }
}
