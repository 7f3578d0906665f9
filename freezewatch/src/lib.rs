//! # freezewatch - UI Freeze Detection and Diagnosis
//!
//! freezewatch watches the main (UI) thread of an interactive application and
//! tells when it stops responding, why, and for how long. The host reports
//! when each UI event starts and finishes; everything else happens on a tokio
//! runtime in the background.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host Application                            │
//! │        UI loop: event_started() / event_finished() / tick       │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   freezewatch (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Freeze     │──▶│   Sampling   │──▶│  Dump files  │         │
//! │  │   Checker    │   │    Task      │   │  + markers   │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │ snapshots                          │
//! │                            ▼                                    │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Latency    │   │  Call Tree   │──▶│    Freeze    │──▶ listeners
//! │  │ Probe/Apdex  │   │  + cause     │   │    Report    │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Detection and Sampling
//!
//! - [`freeze`]: lock-free per-event state machine and the detector in front of it
//! - [`sampling`]: bounded periodic thread sampling with back-pressure
//! - [`snapshot`]: thread introspection seam, `/proc` implementation, dump text format
//!
//! ### Analysis
//!
//! - [`analysis`]: cause-thread selection, weighted call tree, report building
//! - [`stats`]: Apdex scoring of latency samples
//!
//! ### Service and Support
//!
//! - [`watcher`]: the [`PerformanceWatcher`](watcher::PerformanceWatcher) service,
//!   dump directory lifecycle, replay of unfinished freezes, host hooks
//! - [`config`]: policy knobs, loaded from JSON
//! - [`cli`]: arguments of the `freezewatch` binary
//! - [`domain`]: core domain types (Pid, Tid) and errors
//!
//! ## Freeze Lifecycle
//!
//! 1. An event runs longer than the unresponsive interval → sampling starts
//! 2. Every dump interval all threads are captured and written as a dump file
//! 3. Sampling stops by itself after 20 dumps (at most 40 s)
//! 4. The event finishes → the directory is finalized, a report is built from
//!    the dominant stack of the blamed threads and handed to listeners
//!
//! If the process dies during step 2 or 3, the next start replays the
//! unfinished directory through the same report path.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod freeze;
pub mod sampling;
pub mod snapshot;
pub mod stats;
pub mod watcher;
