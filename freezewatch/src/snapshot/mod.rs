//! Thread snapshot capture and the thread-dump text format
//!
//! - `provider`: the [`ThreadSnapshotProvider`] seam plus a fixed-sequence
//!   implementation for replays and tests
//! - `proc_provider`: Linux implementation reading `/proc/<pid>/task`
//! - `dump_format`: render snapshots as dump text and parse them back

pub mod dump_format;
pub mod proc_provider;
pub mod provider;

pub use dump_format::{parse_dump, render_dump};
pub use proc_provider::ProcSnapshotProvider;
pub use provider::{StaticSnapshotProvider, ThreadSnapshotProvider};

pub use freezewatch_common::{StackFrame, ThreadInfo, ThreadSnapshot, ThreadState};

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
