use std::sync::Arc;
use std::time::Duration;

use freezewatch::analysis::FreezeReportBuilder;
use freezewatch::config::WatcherConfig;
use freezewatch::freeze::FreezeEpisode;
use freezewatch::snapshot::{StackFrame, StaticSnapshotProvider, ThreadInfo, ThreadSnapshot, ThreadState};
use freezewatch::watcher::{ChannelListener, FreezeEvent, PerformanceWatcher};

fn single_frame(frame: StackFrame, ticks: usize) -> Vec<ThreadSnapshot> {
    let snapshot = ThreadSnapshot {
        timestamp_ms: 0,
        ui_thread: Some(1),
        threads: vec![ThreadInfo::new(1, "ui", ThreadState::Runnable).with_stack(vec![frame])],
    };
    vec![snapshot; ticks]
}

fn progress_frame() -> StackFrame {
    StackFrame::new("ProgressStream", "writeProgress", "ProgressStream.java", 88)
}

#[test]
fn test_uninteresting_frame_yields_no_report() {
    let config = WatcherConfig::default();
    let episode = FreezeEpisode::from_snapshots(
        single_frame(progress_frame(), 10),
        Duration::from_secs(6),
        config.dump_interval(),
        &config.jit_stall_markers,
    );
    assert!(FreezeReportBuilder::new(&config).build(&episode).is_none());
}

#[test]
fn test_similar_frame_is_still_reported() {
    let config = WatcherConfig::default();
    let frame = StackFrame::new("ProgressStream", "writeProgressBar", "ProgressStream.java", 88);
    let episode = FreezeEpisode::from_snapshots(
        single_frame(frame, 10),
        Duration::from_secs(6),
        config.dump_interval(),
        &config.jit_stall_markers,
    );
    let report = FreezeReportBuilder::new(&config).build(&episode).expect("report expected");
    assert_eq!(report.dedup_key, "ProgressStream.writeProgressBar");
}

#[tokio::test(start_paused = true)]
async fn test_suppressed_freeze_is_recorded_but_not_reported() {
    let log = tempfile::tempdir().unwrap();
    let config = WatcherConfig {
        unresponsive_interval_ms: 500,
        sampling_interval_ms: 500,
        log_dir: log.path().to_path_buf(),
        ..WatcherConfig::default()
    };
    let (listener, events) = ChannelListener::new(64);
    let snapshots = single_frame(progress_frame(), 1);
    let watcher = PerformanceWatcher::builder(config)
        .provider(Arc::new(StaticSnapshotProvider::new(snapshots)))
        .listener(Arc::new(listener))
        .build()
        .unwrap();

    watcher.event_started();
    tokio::time::sleep(Duration::from_secs(3)).await;
    watcher.event_finished();
    watcher.flush().await;

    let events: Vec<FreezeEvent> = events.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, FreezeEvent::Recorded { .. })));
    assert!(!events.iter().any(|e| matches!(e, FreezeEvent::Reported { .. })));
}
