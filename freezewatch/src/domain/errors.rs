//! Structured error types for freezewatch
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file {path}: {error}")]
    ConfigUnreadable { path: PathBuf, error: String },

    #[error("Log directory {0} is not usable")]
    LogDirUnavailable(PathBuf),

    #[error("No tokio runtime to run on: {0}")]
    NoRuntime(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Malformed thread header at line {line}: {text}")]
    MalformedHeader { line: usize, text: String },

    #[error("Stack frame outside of any thread at line {0}")]
    OrphanFrame(usize),

    #[error("Unknown thread state at line {line}: {state}")]
    UnknownState { line: usize, state: String },

    #[error("No thread dumps found in {0}")]
    NoDumps(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize freeze directory {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_error_display() {
        let err = DumpError::MalformedHeader { line: 3, text: "\"main tid=1".to_string() };
        assert_eq!(err.to_string(), "Malformed thread header at line 3: \"main tid=1");
    }

    #[test]
    fn test_report_error_keeps_path() {
        let err = ReportError::WriteFailed {
            path: PathBuf::from("/logs/report-12s.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/logs/report-12s.txt"));
        assert!(err.to_string().contains("denied"));
    }
}
