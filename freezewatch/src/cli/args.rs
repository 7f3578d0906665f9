//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "freezewatch",
    about = "Analyze UI freeze dumps",
    after_help = "\
EXAMPLES:
    freezewatch analyze ~/logs/threadDumps-freeze-20261018-101010-dev-12sec
    freezewatch replay ~/logs            Report freezes a crashed process left behind
    freezewatch cleanup ~/logs           Apply the dump retention policy"
)]
pub struct Args {
    /// JSON config file (missing fields take defaults)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the freeze report for one dump directory
    Analyze {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Dump interval the directory was sampled at, in ms
        #[arg(long, value_name = "MS")]
        sampling_interval: Option<u64>,

        /// Also print the full call tree
        #[arg(long)]
        tree: bool,
    },

    /// Delete old dump directories
    Cleanup {
        #[arg(value_name = "LOG_DIR")]
        log_dir: PathBuf,

        /// Dump directories to keep
        #[arg(long)]
        max_dirs: Option<usize>,

        /// Delete anything older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// Report and finalize freezes whose process died mid-freeze
    Replay {
        #[arg(value_name = "LOG_DIR")]
        log_dir: PathBuf,

        /// Directory holding crash logs to attach
        #[arg(long, value_name = "DIR")]
        crash_dir: Option<PathBuf>,
    },
}
