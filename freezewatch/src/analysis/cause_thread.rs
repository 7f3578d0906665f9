//! Picks the thread to blame for each sampled tick.
//!
//! The UI thread is often not the culprit itself: it waits for a lock that
//! some other thread holds. Per snapshot:
//!
//! 1. UI thread runnable → the UI thread
//! 2. UI thread reports a lock owner → that thread
//! 3. UI thread blocked on a shared read lock → a holder of that lock,
//!    first runnable one, else the first one found
//! 4. otherwise → the UI thread

use freezewatch_common::{ThreadInfo, ThreadSnapshot};

/// Thread responsible for the UI not progressing in `snapshot`.
///
/// Returns `None` only when the snapshot has no identifiable UI thread.
#[must_use]
pub fn select_cause_thread<'s>(
    snapshot: &'s ThreadSnapshot,
    read_lock_markers: &[String],
) -> Option<&'s ThreadInfo> {
    let ui = snapshot.ui_thread_info()?;

    if ui.is_runnable() {
        return Some(ui);
    }

    if let Some(owner) = ui.lock_owner.and_then(|tid| snapshot.thread(tid)) {
        return Some(owner);
    }

    if let Some(lock) = ui.blocked_on.as_deref() {
        if read_lock_markers.iter().any(|m| lock.contains(m.as_str())) {
            let mut holders = snapshot
                .threads
                .iter()
                .filter(|t| t.tid != ui.tid && t.held_locks.iter().any(|held| held == lock));
            let first = holders.clone().next();
            if let Some(holder) = holders.find(|t| t.is_runnable()).or(first) {
                return Some(holder);
            }
        }
    }

    Some(ui)
}
