//! Seams between the watcher and its host application
//!
//! Inbound, the host tells the watcher about UI events (see
//! [`PerformanceWatcher`](super::PerformanceWatcher)) and lends it a way onto
//! the UI thread ([`UiExecutor`]). Outbound, the watcher tells
//! [`FreezeListener`]s what happened.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use freezewatch_common::ThreadSnapshot;

use crate::analysis::FreezeReport;

/// A closure to run on the UI thread.
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Posts work onto the host's UI thread.
pub trait UiExecutor: Send + Sync {
    /// Queue `job` behind whatever the UI thread is doing. Must not block.
    fn execute(&self, job: UiJob);
}

/// [`UiExecutor`] backed by a channel the host's UI loop drains.
#[derive(Debug, Clone)]
pub struct ChannelUiExecutor {
    tx: Sender<UiJob>,
}

impl ChannelUiExecutor {
    /// Executor plus the receiving end for the UI loop.
    #[must_use]
    pub fn new() -> (Self, Receiver<UiJob>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl UiExecutor for ChannelUiExecutor {
    fn execute(&self, job: UiJob) {
        if self.tx.send(job).is_err() {
            debug!("UI loop gone, latency probe dropped");
        }
    }
}

/// Outbound notifications. Every method defaults to doing nothing.
///
/// Called from background threads; implementations must not block for long.
pub trait FreezeListener: Send + Sync {
    /// Sampling began; dumps will land in `dir`.
    fn freeze_started(&self, _dir: &Path) {}

    /// One thread dump was written.
    fn dump_captured(&self, _file: &Path, _snapshot: &ThreadSnapshot) {}

    /// The UI responded again after `duration`.
    fn freeze_finished(&self, _duration: Duration, _dir: &Path) {}

    /// The freeze directory was finalized under its permanent name.
    fn freeze_recorded(&self, _duration: Duration, _dir: &Path) {}

    /// An actionable report was built for the freeze.
    fn freeze_reported(&self, _report: &FreezeReport) {}
}

/// Owned form of the [`FreezeListener`] callbacks.
#[derive(Debug, Clone)]
pub enum FreezeEvent {
    Started { dir: PathBuf },
    DumpCaptured { file: PathBuf, timestamp_ms: u64 },
    Finished { duration: Duration, dir: PathBuf },
    Recorded { duration: Duration, dir: PathBuf },
    Reported { dedup_key: String, message: String, duration: Duration },
}

/// Forwards listener callbacks as [`FreezeEvent`]s over a bounded channel.
///
/// Events are dropped when the channel is full rather than stalling sampling.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<FreezeEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<FreezeEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, event: FreezeEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(event)) => debug!("Listener channel full, dropped {event:?}"),
        }
    }
}

impl FreezeListener for ChannelListener {
    fn freeze_started(&self, dir: &Path) {
        self.send(FreezeEvent::Started { dir: dir.to_path_buf() });
    }

    fn dump_captured(&self, file: &Path, snapshot: &ThreadSnapshot) {
        self.send(FreezeEvent::DumpCaptured {
            file: file.to_path_buf(),
            timestamp_ms: snapshot.timestamp_ms,
        });
    }

    fn freeze_finished(&self, duration: Duration, dir: &Path) {
        self.send(FreezeEvent::Finished { duration, dir: dir.to_path_buf() });
    }

    fn freeze_recorded(&self, duration: Duration, dir: &Path) {
        self.send(FreezeEvent::Recorded { duration, dir: dir.to_path_buf() });
    }

    fn freeze_reported(&self, report: &FreezeReport) {
        self.send(FreezeEvent::Reported {
            dedup_key: report.dedup_key.clone(),
            message: report.message.clone(),
            duration: report.duration,
        });
    }
}
