//! # freezewatch - Main Entry Point
//!
//! Offline tooling for freeze dump directories:
//! - **analyze** (`freezewatch analyze <DIR>`): build and print the report of one freeze
//! - **replay** (`freezewatch replay <LOG_DIR>`): report freezes a dead process left unfinished
//! - **cleanup** (`freezewatch cleanup <LOG_DIR>`): apply the retention policy
//!
//! Live detection runs inside the host application through the library.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::Path;
use std::time::SystemTime;

use freezewatch::analysis::FreezeReport;
use freezewatch::cli::{Args, Command};
use freezewatch::config::WatcherConfig;
use freezewatch::domain::{Pid, WatcherError};
use freezewatch::watcher::{analyze_dump_dir, cleanup_old_dumps, replay_unfinished, RetentionPolicy};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<WatcherError>() {
        Some(WatcherError::InvalidConfig(_) | WatcherError::ConfigUnreadable { .. } | WatcherError::Json(_)) => {
            EXIT_USAGE
        }
        _ => EXIT_ERROR,
    }
}

fn load_config(path: Option<&Path>) -> Result<WatcherConfig> {
    match path {
        Some(path) => Ok(WatcherConfig::from_file(path)?),
        None => Ok(WatcherConfig::default()),
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    let quiet = args.quiet;

    match args.command {
        Command::Analyze { dir, sampling_interval, tree } => {
            if let Some(ms) = sampling_interval {
                config.sampling_interval_ms = ms;
            }
            let report = analyze_dump_dir(&dir, &config)
                .with_context(|| format!("Failed to analyze {}", dir.display()))?;
            match report {
                Some(report) => print_report(&report, tree),
                None => println!("No actionable stack in {}", dir.display()),
            }
        }

        Command::Cleanup { log_dir, max_dirs, max_age_days } => {
            if let Some(max_dirs) = max_dirs {
                config.max_dump_dirs = max_dirs;
            }
            if let Some(days) = max_age_days {
                config.dump_max_age_days = days;
            }
            let policy = RetentionPolicy::from_config(&config);
            let summary = cleanup_old_dumps(&log_dir, &policy, SystemTime::now());
            if !quiet {
                for path in &summary.removed {
                    println!("removed {}", path.display());
                }
            }
            println!("{} removed, {} dump directories kept", summary.removed.len(), summary.kept_dirs);
        }

        Command::Replay { log_dir, crash_dir } => {
            config.log_dir = log_dir;
            if crash_dir.is_some() {
                config.crash_dir = crash_dir;
            }
            let outcomes = replay_unfinished(&config, Pid::current());
            info!("Replayed {} unfinished freezes", outcomes.len());
            for outcome in &outcomes {
                println!("{}s freeze → {}", outcome.duration.as_secs(), outcome.dir.display());
                match outcome.report {
                    Some(ref report) => print_report(report, !quiet),
                    None => println!("  (no report)"),
                }
            }
            if outcomes.is_empty() && !quiet {
                println!("No unfinished freezes in {}", config.log_dir.display());
            }
        }
    }

    Ok(())
}

fn print_report(report: &FreezeReport, with_tree: bool) {
    println!("{}", report.message);
    if with_tree {
        println!();
        print!("{}", report.call_tree_dump);
    }
}
