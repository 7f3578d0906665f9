//! UI event bookkeeping in front of [`FreezeChecker`]
//!
//! The UI thread handles one event at a time, so at most one checker is armed.
//! Starting an event stops whatever checker was armed before it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

use super::checker::{CheckerState, FreezeChecker, FreezeHandler};

/// Feeds UI event notifications into per-event freeze checkers.
pub struct FreezeDetector<H: FreezeHandler> {
    runtime: Handle,
    handler: Arc<H>,
    threshold: Duration,
    current: Mutex<Option<Arc<FreezeChecker<H>>>>,
}

impl<H: FreezeHandler> FreezeDetector<H> {
    #[must_use]
    pub fn new(runtime: Handle, handler: Arc<H>, threshold: Duration) -> Self {
        Self { runtime, handler, threshold, current: Mutex::new(None) }
    }

    /// A UI event began processing.
    pub fn event_started(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.stop();
        }
        let checker = FreezeChecker::new(Arc::clone(&self.handler));
        checker.arm(&self.runtime, self.threshold);
        *current = Some(checker);
    }

    /// The UI event finished. Returns the state its checker was in.
    pub fn event_finished(&self) -> Option<CheckerState> {
        let checker = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        checker.map(|c| c.stop())
    }

    /// Periodic heartbeat from the UI event queue: the previous event is over
    /// and the queue moved on to the next one.
    pub fn ui_tick(&self) {
        self.event_finished();
        self.event_started();
    }

    /// The current event has been confirmed as a freeze.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| c.state() == CheckerState::FreezeLogging)
    }

    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        started: AtomicUsize,
        ended: AtomicUsize,
    }

    impl FreezeHandler for Counter {
        type Session = ();

        fn start_sampling(&self, _started_at_ms: u64, _started: tokio::time::Instant) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn freeze_abandoned(&self, (): ()) {}

        fn freeze_ended(&self, (): (), _started_at_ms: u64, _duration: Duration) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn detector(counter: &Arc<Counter>) -> FreezeDetector<Counter> {
        FreezeDetector::new(Handle::current(), Arc::clone(counter), Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_events_never_freeze() {
        let counter = Arc::new(Counter::default());
        let detector = detector(&counter);
        for _ in 0..10 {
            detector.event_started();
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(detector.event_finished(), Some(CheckerState::Checking));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_event_freezes_once() {
        let counter = Arc::new(Counter::default());
        let detector = detector(&counter);
        detector.event_started();
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(detector.is_frozen());
        assert_eq!(detector.event_finished(), Some(CheckerState::FreezeLogging));
        assert!(!detector.is_frozen());
        assert_eq!(counter.started.load(Ordering::SeqCst), 1);
        assert_eq!(counter.ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_event_replaces_armed_checker() {
        let counter = Arc::new(Counter::default());
        let detector = detector(&counter);
        detector.event_started();
        tokio::time::sleep(Duration::from_millis(400)).await;
        // Heartbeat keeps the UI alive: neither checker reaches its timeout
        detector.ui_tick();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_without_event_is_noop() {
        let counter = Arc::new(Counter::default());
        assert!(detector(&counter).event_finished().is_none());
    }
}
