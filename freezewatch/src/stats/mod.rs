//! Responsiveness statistics
//!
//! Apdex-style scoring of latency samples, kept as immutable values so a
//! reporting snapshot can race with the next update without locking the
//! update path for longer than a pointer-sized copy.

pub mod apdex;

pub use apdex::{ApdexCell, ApdexData};
