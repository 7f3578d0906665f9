//! Per-event freeze checker
//!
//! ## State Machine
//!
//! ```text
//!              timeout (CAS)            task started (CAS)
//!   CHECKING ───────────────► FREEZE_DETECTED ──────────────► FREEZE_LOGGING
//!      │                            │                               │
//!      │ stop()                     │ stop() → CAS above fails,     │ stop()
//!      ▼                            ▼   task abandoned              ▼
//!   FINISHED ◄──────────────────────┴──────────────────── FINISHED + freeze_ended
//! ```
//!
//! Two contexts touch a checker: the timer task on the runtime and the UI
//! thread reporting the event's end. Every transition is a single atomic
//! compare-and-set (or swap, for `stop`), so neither side ever blocks the
//! other and exactly one of them wins each race.

use log::debug;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::snapshot::epoch_ms;

/// Lifecycle of one checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CheckerState {
    Checking = 0,
    FreezeDetected = 1,
    FreezeLogging = 2,
    Finished = 3,
}

impl CheckerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Checking,
            1 => Self::FreezeDetected,
            2 => Self::FreezeLogging,
            _ => Self::Finished,
        }
    }
}

/// What a checker does once it has decided the UI is frozen.
///
/// `Session` is whatever the handler needs to finish the freeze later,
/// typically the [`SamplingTask`](crate::sampling::SamplingTask) plus its
/// output directory.
pub trait FreezeHandler: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Begin sampling. Called at most once per checker, from the timer task.
    ///
    /// `started` is when the frozen event began, on the runtime's clock.
    fn start_sampling(&self, started_at_ms: u64, started: Instant) -> Self::Session;

    /// The event ended while sampling was being started; stop right away.
    fn freeze_abandoned(&self, session: Self::Session);

    /// The frozen event ended after sampling started. Must not block: the
    /// caller is usually the UI thread.
    fn freeze_ended(&self, session: Self::Session, started_at_ms: u64, duration: Duration);
}

/// Decides whether one UI event turned into a freeze.
pub struct FreezeChecker<H: FreezeHandler> {
    state: AtomicU8,
    started: Instant,
    started_at_ms: u64,
    session: Mutex<Option<H::Session>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    handler: Arc<H>,
}

impl<H: FreezeHandler> FreezeChecker<H> {
    /// Checker in `Checking` for an event starting now.
    #[must_use]
    pub fn new(handler: Arc<H>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(CheckerState::Checking as u8),
            started: Instant::now(),
            started_at_ms: epoch_ms(),
            session: Mutex::new(None),
            timer: Mutex::new(None),
            handler,
        })
    }

    /// Fire [`Self::on_timeout`] after `delay` on `runtime`.
    pub fn arm(self: &Arc<Self>, runtime: &Handle, delay: Duration) {
        let checker = Arc::clone(self);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            checker.on_timeout();
        });
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(timer);
    }

    #[must_use]
    pub fn state(&self) -> CheckerState {
        CheckerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wall-clock start of the event, milliseconds since the Unix epoch.
    #[must_use]
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    fn transition(&self, from: CheckerState, to: CheckerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The freeze threshold elapsed while the event was still running.
    pub fn on_timeout(&self) {
        if !self.transition(CheckerState::Checking, CheckerState::FreezeDetected) {
            return;
        }
        debug!("UI event running for {}ms, sampling", self.started.elapsed().as_millis());

        let session = self.handler.start_sampling(self.started_at_ms, self.started);
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);

        if !self.transition(CheckerState::FreezeDetected, CheckerState::FreezeLogging) {
            // stop() ran in between
            if let Some(session) = self.take_session() {
                debug!("UI event ended while sampling started, abandoning");
                self.handler.freeze_abandoned(session);
            }
        }
    }

    /// The event finished (or the checker is being replaced).
    ///
    /// Returns the state the checker was in.
    ///
    /// # Panics
    /// Panics if the checker was logging a freeze without a session, which
    /// means the state machine itself is broken.
    pub fn stop(&self) -> CheckerState {
        let prior = CheckerState::from_u8(self.state.swap(CheckerState::Finished as u8, Ordering::AcqRel));

        if let Some(timer) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            if prior == CheckerState::Checking {
                timer.abort();
            }
        }

        if prior == CheckerState::FreezeLogging {
            let Some(session) = self.take_session() else {
                panic!("freeze checker was logging without a sampling session");
            };
            self.handler.freeze_ended(session, self.started_at_ms, self.started.elapsed());
        }
        prior
    }

    fn take_session(&self) -> Option<H::Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
