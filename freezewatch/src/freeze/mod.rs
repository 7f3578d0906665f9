//! Freeze detection
//!
//! - `checker`: lock-free per-event state machine deciding whether an event froze the UI
//! - `detector`: cancel-and-replace bookkeeping of the one armed checker
//! - `episode`: the data of one confirmed freeze, handed to report building

pub mod checker;
pub mod detector;
pub mod episode;

pub use checker::{CheckerState, FreezeChecker, FreezeHandler};
pub use detector::FreezeDetector;
pub use episode::{has_jit_stall, FreezeEpisode};
