//! Thread dump text format
//!
//! Dumps are plain text so people can read them directly, but regular enough
//! to be parsed back into a [`ThreadSnapshot`] when a freeze is replayed after
//! a crash or analyzed offline.
//!
//! ```text
//! Thread dump at 1760781010123
//! UI thread: 1234
//!
//! "main" tid=1234 state=BLOCKED lock-owner=1240
//!     at app.Editor.paint(Editor.java:120)
//!     at app.EventLoop.run(EventLoop.java)
//!
//! "indexer" tid=1240 state=RUNNABLE holds=ReadMostlyRWLock
//!     at app.Index.scan(Index.java:44)
//! ```
//!
//! Frames are listed innermost first. Lock names never contain whitespace or
//! commas in the file; both are replaced on write.

use log::warn;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use freezewatch_common::{
    StackFrame, ThreadInfo, ThreadSnapshot, ThreadState, DUMP_FILE_EXTENSION, DUMP_FILE_PREFIX,
};

use crate::domain::DumpError;

const TIMESTAMP_LINE: &str = "Thread dump at ";
const UI_THREAD_LINE: &str = "UI thread: ";
const UNKNOWN_SOURCE: &str = "Unknown Source";

// =============================================================================
// RENDERING
// =============================================================================

/// Render a snapshot as dump text.
#[must_use]
pub fn render_dump(snapshot: &ThreadSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{TIMESTAMP_LINE}{}", snapshot.timestamp_ms);
    if let Some(tid) = snapshot.ui_thread {
        let _ = writeln!(out, "{UI_THREAD_LINE}{tid}");
    }

    for thread in &snapshot.threads {
        out.push('\n');
        let _ = write!(out, "\"{}\" tid={} state={}", thread.name, thread.tid, thread.state);
        if let Some(owner) = thread.lock_owner {
            let _ = write!(out, " lock-owner={owner}");
        }
        if let Some(ref lock) = thread.blocked_on {
            let _ = write!(out, " blocked-on={}", sanitize_lock(lock));
        }
        if !thread.held_locks.is_empty() {
            let held: Vec<String> = thread.held_locks.iter().map(|l| sanitize_lock(l)).collect();
            let _ = write!(out, " holds={}", held.join(","));
        }
        out.push('\n');

        for frame in &thread.stack {
            let _ = writeln!(out, "    at {frame}");
        }
    }

    out
}

fn sanitize_lock(lock: &str) -> String {
    lock.chars()
        .map(|c| if c.is_whitespace() { '_' } else if c == ',' { ';' } else { c })
        .collect()
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse dump text produced by [`render_dump`].
///
/// Lines that are neither metadata, thread headers nor frames are ignored so
/// people can annotate dump files by hand.
///
/// # Errors
/// Returns an error for malformed thread headers, unknown states, or frames
/// appearing before the first thread header.
pub fn parse_dump(text: &str) -> Result<ThreadSnapshot, DumpError> {
    let mut snapshot = ThreadSnapshot::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            continue;
        }
        if let Some(ts) = trimmed.strip_prefix(TIMESTAMP_LINE) {
            snapshot.timestamp_ms = ts.trim().parse().unwrap_or(0);
        } else if let Some(tid) = trimmed.strip_prefix(UI_THREAD_LINE) {
            snapshot.ui_thread = tid.trim().parse().ok();
        } else if trimmed.starts_with('"') {
            snapshot.threads.push(parse_thread_header(trimmed, line_no)?);
        } else if let Some(frame) = trimmed.strip_prefix("at ") {
            let thread = snapshot.threads.last_mut().ok_or(DumpError::OrphanFrame(line_no))?;
            thread.stack.push(parse_frame(frame));
        }
    }

    Ok(snapshot)
}

fn parse_thread_header(line: &str, line_no: usize) -> Result<ThreadInfo, DumpError> {
    let malformed = || DumpError::MalformedHeader { line: line_no, text: line.to_string() };

    // Name is everything between the first quote and the quote before " tid="
    let name_end = line[1..].rfind("\" tid=").ok_or_else(malformed)? + 1;
    let name = &line[1..name_end];

    let mut tid = None;
    let mut state = None;
    let mut thread = ThreadInfo::new(0, name, ThreadState::Unknown);

    for token in line[name_end + 1..].split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "tid" => tid = Some(value.parse::<u64>().map_err(|_| malformed())?),
            "state" => {
                state = Some(value.parse::<ThreadState>().map_err(|_| DumpError::UnknownState {
                    line: line_no,
                    state: value.to_string(),
                })?);
            }
            "lock-owner" => thread.lock_owner = value.parse().ok(),
            "blocked-on" => thread.blocked_on = Some(value.to_string()),
            "holds" => {
                thread.held_locks = value
                    .split(',')
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    thread.tid = tid.ok_or_else(malformed)?;
    thread.state = state.ok_or_else(malformed)?;
    Ok(thread)
}

fn parse_frame(text: &str) -> StackFrame {
    let (name, location) = match text.rfind('(') {
        Some(open) => (&text[..open], text[open + 1..].trim_end_matches(')')),
        None => (text, UNKNOWN_SOURCE),
    };

    let (class, method) = match name.rsplit_once('.') {
        Some((class, method)) if !class.is_empty() && !method.is_empty() && !method.contains("::") => {
            (Some(class.to_string()), method.to_string())
        }
        _ => (None, name.to_string()),
    };

    let (file, line) = if location == UNKNOWN_SOURCE || location.is_empty() {
        (None, None)
    } else {
        match location.rsplit_once(':') {
            Some((file, line)) => match line.parse::<u32>() {
                Ok(line) => (Some(file.to_string()), Some(line)),
                Err(_) => (Some(location.to_string()), None),
            },
            None => (Some(location.to_string()), None),
        }
    };

    StackFrame { class, method, file, line }
}

// =============================================================================
// DUMP DIRECTORIES
// =============================================================================

/// Dump files of a directory, in capture order.
///
/// Dump file names start with a zero-padded sequence number or a sortable
/// timestamp, so name order is capture order. Report attachments
/// (`dump-N.txt`) are not dumps of this directory and are skipped.
///
/// # Errors
/// Returns an error if the directory can't be listed.
pub fn list_dump_files(dir: &Path) -> Result<Vec<PathBuf>, DumpError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == DUMP_FILE_EXTENSION)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(DUMP_FILE_PREFIX))
                    .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Parse every dump file of a directory, in capture order.
///
/// A dump that can't be read or parsed is skipped with a warning. The last
/// dump of a process that died mid-write is usually cut off.
///
/// # Errors
/// Returns [`DumpError::NoDumps`] when no dump file could be loaded, or an
/// error if the directory can't be listed.
pub fn read_dump_dir(dir: &Path) -> Result<Vec<ThreadSnapshot>, DumpError> {
    let snapshots: Vec<ThreadSnapshot> = list_dump_files(dir)?
        .iter()
        .filter_map(|path| match read_dump_file(path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Skipping unreadable thread dump {}: {e}", path.display());
                None
            }
        })
        .collect();
    if snapshots.is_empty() {
        return Err(DumpError::NoDumps(dir.to_path_buf()));
    }
    Ok(snapshots)
}

fn read_dump_file(path: &Path) -> Result<ThreadSnapshot, DumpError> {
    parse_dump(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> ThreadSnapshot {
        let mut ui = ThreadInfo::new(1234, "AWT-EventQueue 0", ThreadState::Blocked).with_stack(vec![
            StackFrame::new("app.Editor", "paint", "Editor.java", 120),
            StackFrame {
                class: Some("app.EventLoop".to_string()),
                method: "run".to_string(),
                file: Some("EventLoop.java".to_string()),
                line: None,
            },
        ]);
        ui.lock_owner = Some(1240);
        ui.blocked_on = Some("ReadMostlyRWLock write".to_string());

        let mut worker = ThreadInfo::new(1240, "indexer", ThreadState::Runnable)
            .with_stack(vec![StackFrame::method("std::io::Write::write_all")]);
        worker.held_locks = vec!["ReadMostlyRWLock".to_string(), "a,b".to_string()];

        ThreadSnapshot { timestamp_ms: 1_760_781_010_123, ui_thread: Some(1234), threads: vec![ui, worker] }
    }

    #[test]
    fn test_rendered_dump_parses_back() {
        let snapshot = sample_snapshot();
        let parsed = parse_dump(&render_dump(&snapshot)).unwrap();

        assert_eq!(parsed.timestamp_ms, snapshot.timestamp_ms);
        assert_eq!(parsed.ui_thread, Some(1234));
        assert_eq!(parsed.threads.len(), 2);
        assert_eq!(parsed.threads[0].name, "AWT-EventQueue 0");
        assert_eq!(parsed.threads[0].stack, snapshot.threads[0].stack);
        assert_eq!(parsed.threads[0].lock_owner, Some(1240));
        // Whitespace in lock names is replaced on write
        assert_eq!(parsed.threads[0].blocked_on.as_deref(), Some("ReadMostlyRWLock_write"));
        assert_eq!(parsed.threads[1].held_locks, ["ReadMostlyRWLock", "a;b"]);
        assert_eq!(parsed.threads[1].stack[0].method, "std::io::Write::write_all");
        assert!(parsed.threads[1].stack[0].class.is_none());
    }

    #[test]
    fn test_parse_frame_variants() {
        let frame = parse_frame("app::editor.paint(src/editor.rs:12)");
        assert_eq!(frame.class.as_deref(), Some("app::editor"));
        assert_eq!(frame.method, "paint");
        assert_eq!(frame.line, Some(12));

        let frame = parse_frame("do_sys_poll(Unknown Source)");
        assert!(frame.class.is_none());
        assert!(frame.file.is_none());

        let frame = parse_frame("C:\\app.Main.run(C:\\src\\Main.java)");
        assert_eq!(frame.file.as_deref(), Some("C:\\src\\Main.java"));
        assert!(frame.line.is_none());
    }

    #[test]
    fn test_frame_before_thread_is_error() {
        let err = parse_dump("Thread dump at 1\n    at a.b(c.java:1)\n").unwrap_err();
        assert!(matches!(err, DumpError::OrphanFrame(2)));
    }

    #[test]
    fn test_unknown_state_is_error() {
        let err = parse_dump("\"main\" tid=1 state=SPINNING\n").unwrap_err();
        assert!(matches!(err, DumpError::UnknownState { line: 1, .. }));
    }

    #[test]
    fn test_header_without_tid_is_error() {
        let err = parse_dump("\"main\" state=RUNNABLE\n").unwrap_err();
        assert!(matches!(err, DumpError::MalformedHeader { line: 1, .. }));
    }

    #[test]
    fn test_read_dump_dir_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = sample_snapshot();
        first.timestamp_ms = 1;
        let mut second = sample_snapshot();
        second.timestamp_ms = 2;
        fs::write(dir.path().join("dump20261018-101011-000.txt"), render_dump(&second)).unwrap();
        fs::write(dir.path().join("dump20261018-101010-000.txt"), render_dump(&first)).unwrap();
        fs::write(dir.path().join("report-12s.txt"), "not a dump").unwrap();
        fs::write(dir.path().join("dump-1.txt"), "report attachment").unwrap();

        let snapshots = read_dump_dir(dir.path()).unwrap();
        assert_eq!(snapshots.iter().map(|s| s.timestamp_ms).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn test_read_dump_dir_skips_truncated_dump() {
        let dir = tempfile::tempdir().unwrap();
        let text = render_dump(&sample_snapshot());
        fs::write(dir.path().join("dump001-a.txt"), &text).unwrap();
        fs::write(dir.path().join("dump002-b.txt"), &text).unwrap();
        let cut = text.find("state=").unwrap() + 3;
        fs::write(dir.path().join("dump003-c.txt"), &text[..cut]).unwrap();

        let snapshots = read_dump_dir(dir.path()).unwrap();
        assert_eq!(snapshots.len(), 2);
    }

    #[test]
    fn test_dir_with_only_broken_dumps_reports_no_dumps() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dump001-a.txt"), "\"ui\" tid=1 sta").unwrap();
        assert!(matches!(read_dump_dir(dir.path()), Err(DumpError::NoDumps(_))));
    }

    #[test]
    fn test_read_empty_dir_reports_no_dumps() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_dump_dir(dir.path()), Err(DumpError::NoDumps(_))));
    }
}
