//! Command-line interface for freezewatch
//!
//! This module contains CLI argument parsing for the offline dump tooling

pub mod args;

pub use args::{Args, Command};
