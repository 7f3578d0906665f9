//! Background responsiveness probe
//!
//! Every interval the probe:
//! 1. measures how late its own timer fired → general Apdex
//! 2. posts a no-op onto the UI thread and measures the round trip → UI Apdex
//!
//! A frozen UI thread runs the queued round trips late, each one recording
//! how long it waited. Likewise a timer that fires several intervals late
//! counts once per interval it missed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::hooks::UiExecutor;
use crate::stats::{ApdexCell, ApdexData};

#[allow(clippy::cast_possible_truncation)]
fn as_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

pub(crate) struct LatencyProbe {
    pub interval: Duration,
    pub tolerable_ms: u64,
    pub frustration_factor: u64,
    pub general: Arc<ApdexCell>,
    pub ui: Arc<ApdexCell>,
    pub executor: Option<Arc<dyn UiExecutor>>,
}

impl LatencyProbe {
    /// Probe until the task is aborted.
    pub async fn run(self) {
        loop {
            let scheduled = Instant::now();
            tokio::time::sleep(self.interval).await;
            let late = scheduled.elapsed().saturating_sub(self.interval);
            let (tolerable, factor, interval) = (self.tolerable_ms, self.frustration_factor, self.interval);
            self.general.update(|a| with_lateness(a, late, interval, tolerable, factor));

            self.probe_ui();
        }
    }

    fn probe_ui(&self) {
        let Some(ref executor) = self.executor else {
            return;
        };
        let sent = std::time::Instant::now();
        let ui = Arc::clone(&self.ui);
        let (tolerable, factor) = (self.tolerable_ms, self.frustration_factor);
        executor.execute(Box::new(move || {
            let round_trip = as_ms(sent.elapsed());
            ui.update(|a| a.with_event_factor(tolerable, round_trip, factor));
        }));
    }
}

/// One event for the lateness itself and one for each whole interval it
/// spans: `late`, `late - interval`, ... while non-negative.
fn with_lateness(
    mut apdex: ApdexData,
    late: Duration,
    interval: Duration,
    tolerable_ms: u64,
    factor: u64,
) -> ApdexData {
    let mut remaining = late;
    loop {
        apdex = apdex.with_event_factor(tolerable_ms, as_ms(remaining), factor);
        if interval.is_zero() || remaining < interval {
            return apdex;
        }
        remaining -= interval;
    }
}
