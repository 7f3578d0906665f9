//! The performance watcher service
//!
//! [`PerformanceWatcher`] is constructed once by the host application and
//! shared by handle with whatever reports UI events. It owns:
//!
//! - the freeze detector and, through it, the sampling of frozen periods
//! - the background latency probe feeding the Apdex scores
//! - the dump directory lifecycle: replay of unfinished freezes and cleanup
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use freezewatch::config::WatcherConfig;
//! use freezewatch::snapshot::ProcSnapshotProvider;
//! use freezewatch::watcher::PerformanceWatcher;
//!
//! # async fn host() -> Result<(), freezewatch::domain::WatcherError> {
//! let watcher = PerformanceWatcher::builder(WatcherConfig::default())
//!     .provider(Arc::new(ProcSnapshotProvider::current()))
//!     .build()?;
//! watcher.start();
//!
//! // From the UI loop:
//! watcher.event_started();
//! // ... handle the event ...
//! watcher.event_finished();
//!
//! watcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod dump_dir;
pub mod hooks;
mod latency;
pub mod replay;
mod session;

pub use dump_dir::{cleanup_old_dumps, CleanupSummary, FreezeDir, RetentionPolicy};
pub use hooks::{ChannelListener, ChannelUiExecutor, FreezeEvent, FreezeListener, UiExecutor, UiJob};
pub use replay::{analyze_dump_dir, replay_unfinished, ReplayOutcome, UnfinishedFreeze};

use log::{debug, info, warn};
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::WatcherConfig;
use crate::domain::{Pid, WatcherError};
use crate::freeze::FreezeDetector;
use crate::sampling::{GcTimeSource, NoGcTime};
use crate::snapshot::{ProcSnapshotProvider, ThreadSnapshotProvider};
use crate::stats::{ApdexCell, ApdexData};

use latency::LatencyProbe;
use session::{CoreHandler, WatcherCore};

/// Apdex values captured at one point in time, used as a window baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApdexSnapshot {
    pub general: ApdexData,
    pub ui: ApdexData,
}

/// Assembles a [`PerformanceWatcher`].
pub struct WatcherBuilder {
    config: WatcherConfig,
    runtime: Option<Handle>,
    provider: Option<Arc<dyn ThreadSnapshotProvider>>,
    gc: Arc<dyn GcTimeSource>,
    ui_executor: Option<Arc<dyn UiExecutor>>,
    listeners: Vec<Arc<dyn FreezeListener>>,
}

impl WatcherBuilder {
    /// Runtime for timers and sampling. Defaults to the current one.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Thread introspection. Defaults to `/proc` of this process.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ThreadSnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn gc_time_source(mut self, gc: Arc<dyn GcTimeSource>) -> Self {
        self.gc = gc;
        self
    }

    /// Without an executor the UI Apdex stays empty.
    #[must_use]
    pub fn ui_executor(mut self, executor: Arc<dyn UiExecutor>) -> Self {
        self.ui_executor = Some(executor);
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn FreezeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// # Errors
    /// Returns an error for an invalid config, an unusable log directory, or
    /// when no runtime was given and none is current.
    pub fn build(self) -> Result<PerformanceWatcher, WatcherError> {
        self.config.validate()?;
        fs::create_dir_all(&self.config.log_dir)
            .map_err(|_| WatcherError::LogDirUnavailable(self.config.log_dir.clone()))?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| WatcherError::NoRuntime(e.to_string()))?,
        };
        let provider = self.provider.unwrap_or_else(|| {
            Arc::new(
                ProcSnapshotProvider::current().with_ui_thread_name(self.config.ui_thread_name.clone()),
            )
        });

        let threshold = self.config.unresponsive_interval();
        let core = Arc::new(WatcherCore::new(
            self.config,
            runtime.clone(),
            provider,
            self.gc,
            self.listeners.into(),
        ));
        let detector = FreezeDetector::new(runtime, Arc::new(CoreHandler(Arc::clone(&core))), threshold);

        Ok(PerformanceWatcher {
            core,
            detector,
            ui_executor: self.ui_executor,
            general_apdex: Arc::new(ApdexCell::new()),
            ui_apdex: Arc::new(ApdexCell::new()),
            background: Mutex::new(Vec::new()),
        })
    }
}

/// UI freeze detection service for one process.
pub struct PerformanceWatcher {
    core: Arc<WatcherCore>,
    detector: FreezeDetector<CoreHandler>,
    ui_executor: Option<Arc<dyn UiExecutor>>,
    general_apdex: Arc<ApdexCell>,
    ui_apdex: Arc<ApdexCell>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl PerformanceWatcher {
    #[must_use]
    pub fn builder(config: WatcherConfig) -> WatcherBuilder {
        WatcherBuilder {
            config,
            runtime: None,
            provider: None,
            gc: Arc::new(NoGcTime),
            ui_executor: None,
            listeners: Vec::new(),
        }
    }

    /// Replay unfinished freezes, clean up old dumps, start the latency probe.
    pub fn start(&self) {
        let core = Arc::clone(&self.core);
        let housekeeping = self.core.runtime.spawn(async move {
            let result = tokio::task::spawn_blocking(move || startup_housekeeping(&core)).await;
            if let Err(e) = result {
                warn!("Dump housekeeping failed: {e}");
            }
        });

        let probe = LatencyProbe {
            interval: self.core.config.latency_sampling_interval(),
            tolerable_ms: self.core.config.tolerable_latency_ms,
            frustration_factor: self.core.config.apdex_frustration_factor,
            general: Arc::clone(&self.general_apdex),
            ui: Arc::clone(&self.ui_apdex),
            executor: self.ui_executor.clone(),
        };
        let latency = self.core.runtime.spawn(probe.run());

        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        background.push(housekeeping);
        background.push(latency);
        info!(
            "Watching UI responsiveness: freeze after {}ms, dumps every {}ms",
            self.unresponsive_interval().as_millis(),
            self.dump_interval().as_millis()
        );
    }

    /// The UI thread started processing an event.
    pub fn event_started(&self) {
        self.detector.event_started();
    }

    /// The UI thread finished the current event.
    pub fn event_finished(&self) {
        self.detector.event_finished();
    }

    /// Heartbeat from the UI event queue.
    pub fn ui_tick(&self) {
        self.detector.ui_tick();
    }

    /// The current event has been running past the freeze threshold.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.detector.is_frozen()
    }

    /// Mark later freezes as happening during shutdown.
    pub fn set_closing(&self, closing: bool) {
        self.core.closing.store(closing, Ordering::Release);
    }

    #[must_use]
    pub fn apdex_snapshot(&self) -> ApdexSnapshot {
        ApdexSnapshot { general: self.general_apdex.load(), ui: self.ui_apdex.load() }
    }

    /// Scores over the window since `baseline`.
    ///
    /// ```text
    /// general: 0.98 (60 samples), UI: 0.91 (58 samples)
    /// ```
    #[must_use]
    pub fn apdex_summary(&self, baseline: &ApdexSnapshot) -> String {
        let now = self.apdex_snapshot();
        format!(
            "general: {}, UI: {}",
            now.general.summarize_since(&baseline.general),
            now.ui.summarize_since(&baseline.ui)
        )
    }

    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.core.config
    }

    #[must_use]
    pub fn dump_interval(&self) -> Duration {
        self.core.config.dump_interval()
    }

    #[must_use]
    pub fn max_dump_duration(&self) -> Duration {
        self.core.config.max_dump_duration()
    }

    #[must_use]
    pub fn unresponsive_interval(&self) -> Duration {
        self.core.config.unresponsive_interval()
    }

    /// Wait until every finished freeze has been written and reported.
    pub async fn flush(&self) {
        self.core.flush().await;
    }

    /// Stop watching: end the current event, stop the probe, flush.
    pub async fn shutdown(&self) {
        self.detector.event_finished();
        let background: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.background.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in background {
            handle.abort();
        }
        self.flush().await;
        debug!("Performance watcher stopped");
    }
}

fn startup_housekeeping(core: &WatcherCore) {
    let config = &core.config;
    for outcome in replay_unfinished(config, Pid::current()) {
        for listener in core.listeners.iter() {
            listener.freeze_recorded(outcome.duration, &outcome.dir);
            if let Some(ref report) = outcome.report {
                listener.freeze_reported(report);
            }
        }
    }

    let summary =
        cleanup_old_dumps(&config.log_dir, &RetentionPolicy::from_config(config), SystemTime::now());
    if !summary.removed.is_empty() {
        info!("Removed {} old dump entries, kept {} directories", summary.removed.len(), summary.kept_dirs);
    }
}
