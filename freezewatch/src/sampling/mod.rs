//! Periodic thread sampling while the UI is frozen
//!
//! - `task`: the bounded [`SamplingTask`] and its append-only snapshot log
//! - `metrics`: GC time and CPU load figures recorded with each task

pub mod metrics;
pub mod task;

pub use metrics::{cpu_load_percent, GcTimeSource, NoGcTime};
pub use task::{DiscardSnapshots, SamplingSettings, SamplingTask, SnapshotConsumer, SnapshotLog};
