//! Bounded periodic thread sampling
//!
//! A [`SamplingTask`] runs on the tokio runtime, never on the UI thread:
//!
//! ```text
//!   tick ──► capture_all() ──► SnapshotLog::push() ──► consumer.consume()
//!    ▲        (blocking pool)                            (blocking pool)
//!    │                                                         │
//!    └──────────── next tick only after consume returns ◄──────┘
//! ```
//!
//! The task stops by itself after `max_duration / interval` snapshots, so a
//! freeze that never ends still produces a bounded number of dumps.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use freezewatch_common::ThreadSnapshot;

use super::metrics::{cpu_load_percent, GcTimeSource};
use crate::snapshot::ThreadSnapshotProvider;

/// Receives every snapshot right after it was captured.
///
/// Runs on the blocking pool; the sampler waits for it before the next tick.
pub trait SnapshotConsumer: Send + Sync {
    /// `index` counts from 0 within one task.
    fn consume(&self, index: usize, snapshot: &ThreadSnapshot);
}

/// Consumer that ignores snapshots; they are still kept in the task's log.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSnapshots;

impl SnapshotConsumer for DiscardSnapshots {
    fn consume(&self, _index: usize, _snapshot: &ThreadSnapshot) {}
}

// =============================================================================
// SNAPSHOT LOG
// =============================================================================

/// Append-only snapshot sequence.
///
/// Each push publishes a new vector, so a reader holding an earlier
/// `Arc<Vec<..>>` keeps a complete, unchanging view.
#[derive(Debug, Default)]
pub struct SnapshotLog {
    current: RwLock<Arc<Vec<Arc<ThreadSnapshot>>>>,
}

impl SnapshotLog {
    /// Append and return the new element's index.
    pub fn push(&self, snapshot: Arc<ThreadSnapshot>) -> usize {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(snapshot);
        let index = next.len() - 1;
        *guard = Arc::new(next);
        index
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<ThreadSnapshot>>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// SAMPLING TASK
// =============================================================================

/// Interval and cap of one sampling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl SamplingSettings {
    /// `max_duration / interval`, at least 1.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn max_samples(&self) -> usize {
        if self.interval.is_zero() {
            return 1;
        }
        ((self.max_duration.as_nanos() / self.interval.as_nanos()) as usize).max(1)
    }
}

/// State shared with the background loop.
struct Shared {
    log: SnapshotLog,
    stopping: AtomicBool,
    running: AtomicBool,
    stopped_at: OnceLock<Instant>,
    wake: Notify,
}

impl Shared {
    fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.stopped_at.set(Instant::now());
    }
}

/// Running → Stopped sampling job.
pub struct SamplingTask {
    settings: SamplingSettings,
    started: Instant,
    gc_source: Arc<dyn GcTimeSource>,
    gc_at_start: Duration,
    cpu_load_percent: Option<f64>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SamplingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingTask")
            .field("settings", &self.settings)
            .field("samples", &self.sample_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SamplingTask {
    /// Start sampling on `runtime`. The first snapshot is taken immediately.
    pub fn start(
        runtime: &Handle,
        settings: SamplingSettings,
        provider: Arc<dyn ThreadSnapshotProvider>,
        consumer: Arc<dyn SnapshotConsumer>,
        gc_source: Arc<dyn GcTimeSource>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            log: SnapshotLog::default(),
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(true),
            stopped_at: OnceLock::new(),
            wake: Notify::new(),
        });

        let task = Arc::new(Self {
            settings,
            started: Instant::now(),
            gc_at_start: gc_source.total_gc_time(),
            gc_source,
            cpu_load_percent: cpu_load_percent(),
            shared: Arc::clone(&shared),
            handle: Mutex::new(None),
        });

        debug!(
            "Sampling every {}ms, at most {} snapshots",
            settings.interval.as_millis(),
            settings.max_samples()
        );
        let handle = runtime.spawn(sample_loop(shared, settings, provider, consumer));
        *task.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        task
    }

    /// Cancel without waiting. A tick in flight may still finish its consumer.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        if let Some(handle) = self.take_handle() {
            handle.abort();
        }
        self.shared.mark_stopped();
    }

    /// Stop after the tick in flight (if any) has been fully consumed.
    ///
    /// Once this returns the snapshot log no longer changes.
    pub async fn stop_dumping_threads(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        if let Some(handle) = self.take_handle() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Sampling task failed: {e}");
                }
            }
        }
        self.shared.mark_stopped();
    }

    fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Snapshots captured so far, in capture order.
    #[must_use]
    pub fn snapshots(&self) -> Arc<Vec<Arc<ThreadSnapshot>>> {
        self.shared.log.snapshot()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.shared.log.len()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    #[must_use]
    pub fn settings(&self) -> SamplingSettings {
        self.settings
    }

    /// Time from start until now, or until the task stopped.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        let end = self.shared.stopped_at.get().copied().unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.started)
    }

    /// Collector pause time since the task started.
    #[must_use]
    pub fn gc_time(&self) -> Duration {
        self.gc_source.total_gc_time().saturating_sub(self.gc_at_start)
    }

    /// CPU load when the task started.
    #[must_use]
    pub fn cpu_load_percent(&self) -> Option<f64> {
        self.cpu_load_percent
    }
}

async fn sample_loop(
    shared: Arc<Shared>,
    settings: SamplingSettings,
    provider: Arc<dyn ThreadSnapshotProvider>,
    consumer: Arc<dyn SnapshotConsumer>,
) {
    let max_samples = settings.max_samples();
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shared.wake.notified() => {}
        }
        if shared.stopping.load(Ordering::Acquire) {
            break;
        }

        let capture = Arc::clone(&provider);
        let snapshot = match tokio::task::spawn_blocking(move || capture.capture_all()).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!("Thread snapshot capture failed: {e}");
                break;
            }
        };

        let index = shared.log.push(Arc::clone(&snapshot));
        let sink = Arc::clone(&consumer);
        if let Err(e) = tokio::task::spawn_blocking(move || sink.consume(index, &snapshot)).await {
            warn!("Snapshot consumer failed: {e}");
        }

        if index + 1 >= max_samples {
            debug!("Reached {max_samples} snapshots, sampling stops");
            break;
        }
    }

    shared.mark_stopped();
}
