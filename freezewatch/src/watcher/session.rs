//! What happens between "the UI is frozen" and "the freeze is on disk"
//!
//! ```text
//! start_sampling ──► FreezeDir::create + markers ──► SamplingTask ──► DumpWriter
//!                └─► .duration refresh (every second, until the end)  (dump file,
//!                                                                      listeners)
//! freeze_ended ──► stop_dumping_threads().await
//!              ──► FreezeEpisode ──► finalize dir ──► report
//! ```
//!
//! Finishing runs on the runtime's blocking pool so the UI thread, which
//! reports the end of the frozen event, returns immediately. Nothing touches
//! the directory once a session has been wound down.

use chrono::Local;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use freezewatch_common::ThreadSnapshot;

use super::dump_dir::FreezeDir;
use super::hooks::FreezeListener;
use crate::analysis::FreezeReportBuilder;
use crate::config::WatcherConfig;
use crate::domain::Pid;
use crate::freeze::{FreezeEpisode, FreezeHandler};
use crate::sampling::{GcTimeSource, SamplingSettings, SamplingTask, SnapshotConsumer};
use crate::snapshot::{render_dump, ThreadSnapshotProvider};

pub(crate) type Listeners = Arc<[Arc<dyn FreezeListener>]>;

/// `.duration` has whole-second resolution.
const MARKER_REFRESH: Duration = Duration::from_secs(1);

/// One freeze being sampled.
pub struct FreezeSession {
    pub task: Arc<SamplingTask>,
    /// `None` when the directory couldn't be created; sampling still runs
    pub dir: Option<FreezeDir>,
    marker: Option<JoinHandle<()>>,
}

impl FreezeSession {
    /// Stop sampling and marker updates, waiting for any write in flight.
    async fn wind_down(&mut self) {
        self.task.stop_dumping_threads().await;
        if let Some(marker) = self.marker.take() {
            marker.abort();
            if let Err(e) = marker.await {
                if !e.is_cancelled() {
                    warn!("Duration marker task failed: {e}");
                }
            }
        }
    }
}

/// Rewrite `.duration` with the time since the event started until aborted.
///
/// Runs independently of sampling, which stops at its cap while the freeze
/// may go on.
async fn keep_duration_current(dir: FreezeDir, started: Instant) {
    let mut ticker = tokio::time::interval(MARKER_REFRESH);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = dir.update_duration(started.elapsed()) {
            warn!("Failed to update duration marker in {}: {e}", dir.path().display());
        }
    }
}

/// Writes each snapshot as a dump file.
struct DumpWriter {
    dir: Option<FreezeDir>,
    listeners: Listeners,
}

impl SnapshotConsumer for DumpWriter {
    fn consume(&self, index: usize, snapshot: &ThreadSnapshot) {
        let Some(ref dir) = self.dir else {
            return;
        };
        let file = dir.dump_path(index, Local::now());
        if let Err(e) = fs::write(&file, render_dump(snapshot)) {
            warn!("Failed to write thread dump {}: {e}", file.display());
            return;
        }
        for listener in self.listeners.iter() {
            listener.dump_captured(&file, snapshot);
        }
    }
}

/// The watcher's side of the freeze state machine.
pub(crate) struct WatcherCore {
    pub config: WatcherConfig,
    pub runtime: Handle,
    pub provider: Arc<dyn ThreadSnapshotProvider>,
    pub gc: Arc<dyn GcTimeSource>,
    pub listeners: Listeners,
    pub closing: AtomicBool,
    finishing: Mutex<Vec<JoinHandle<()>>>,
}

impl WatcherCore {
    pub fn new(
        config: WatcherConfig,
        runtime: Handle,
        provider: Arc<dyn ThreadSnapshotProvider>,
        gc: Arc<dyn GcTimeSource>,
        listeners: Listeners,
    ) -> Self {
        Self {
            config,
            runtime,
            provider,
            gc,
            listeners,
            closing: AtomicBool::new(false),
            finishing: Mutex::new(Vec::new()),
        }
    }

    fn appinfo(&self) -> String {
        format!("build={}\nversion={}\n", self.config.build, env!("CARGO_PKG_VERSION"))
    }

    fn open_dir(&self) -> Option<FreezeDir> {
        let dir = match FreezeDir::create(&self.config.log_dir, &self.config.build, Local::now()) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create freeze directory in {}: {e}", self.config.log_dir.display());
                return None;
            }
        };
        if let Err(e) = dir.write_markers(Pid::current(), &self.appinfo()) {
            warn!("Failed to write markers in {}: {e}", dir.path().display());
        }
        Some(dir)
    }

    /// Remember a finishing job, forgetting those already done.
    fn track(&self, handle: JoinHandle<()>) {
        let mut finishing = self.finishing.lock().unwrap_or_else(PoisonError::into_inner);
        finishing.retain(|h| !h.is_finished());
        finishing.push(handle);
    }

    /// Wait for every freeze handed to the blocking pool so far.
    pub async fn flush(&self) {
        let pending: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.finishing.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Freeze finalization failed: {e}");
            }
        }
    }

    /// Episode → finalized directory → report. Runs on the blocking pool.
    fn finish(&self, session: FreezeSession, started_at_ms: u64, duration: Duration) {
        let closing = self.closing.load(Ordering::Acquire);
        let episode = FreezeEpisode::from_task(
            &session.task,
            started_at_ms,
            duration,
            closing,
            &self.config.jit_stall_markers,
        );
        info!(
            "UI freeze of {}ms finished, {} dumps",
            duration.as_millis(),
            episode.sample_count()
        );

        let final_dir = session.dir.and_then(|dir| {
            for listener in self.listeners.iter() {
                listener.freeze_finished(duration, dir.path());
            }
            let original = dir.path().to_path_buf();
            match dir.finalize(duration) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("{e}");
                    Some(original)
                }
            }
        });
        if let Some(ref dir) = final_dir {
            for listener in self.listeners.iter() {
                listener.freeze_recorded(duration, dir);
            }
        }

        if !self.config.reporting_active() {
            return;
        }
        let Some(report) = FreezeReportBuilder::new(&self.config).build(&episode) else {
            return;
        };
        if let Some(ref dir) = final_dir {
            report.persist(dir);
        }
        for listener in self.listeners.iter() {
            listener.freeze_reported(&report);
        }
    }
}

fn remove_abandoned(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!("Failed to remove abandoned freeze directory {}: {e}", dir.display());
    }
}

/// Handler registered with the freeze detector.
pub(crate) struct CoreHandler(pub Arc<WatcherCore>);

impl FreezeHandler for CoreHandler {
    type Session = FreezeSession;

    fn start_sampling(&self, _started_at_ms: u64, started: Instant) -> FreezeSession {
        let core = &self.0;
        let dir = core.open_dir();
        if let Some(ref dir) = dir {
            for listener in core.listeners.iter() {
                listener.freeze_started(dir.path());
            }
        }
        let marker = dir.clone().map(|dir| core.runtime.spawn(keep_duration_current(dir, started)));

        let settings = SamplingSettings {
            interval: core.config.dump_interval(),
            max_duration: core.config.max_dump_duration(),
        };
        let writer = DumpWriter { dir: dir.clone(), listeners: Arc::clone(&core.listeners) };
        let task = SamplingTask::start(
            &core.runtime,
            settings,
            Arc::clone(&core.provider),
            Arc::new(writer),
            Arc::clone(&core.gc),
        );
        FreezeSession { task, dir, marker }
    }

    fn freeze_abandoned(&self, mut session: FreezeSession) {
        let handle = self.0.runtime.spawn(async move {
            session.wind_down().await;
            let Some(dir) = session.dir else {
                return;
            };
            let path: PathBuf = dir.path().to_path_buf();
            if let Err(e) = tokio::task::spawn_blocking(move || remove_abandoned(&path)).await {
                warn!("Removing abandoned freeze directory panicked: {e}");
            }
        });
        self.0.track(handle);
    }

    fn freeze_ended(&self, mut session: FreezeSession, started_at_ms: u64, duration: Duration) {
        let core = Arc::clone(&self.0);
        let handle = self.0.runtime.spawn(async move {
            session.wind_down().await;
            let finisher = Arc::clone(&core);
            let result = tokio::task::spawn_blocking(move || {
                finisher.finish(session, started_at_ms, duration);
            })
            .await;
            if let Err(e) = result {
                warn!("Freeze finalization panicked: {e}");
            }
        });
        self.0.track(handle);
    }
}
