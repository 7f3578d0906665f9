//! Process-wide figures sampled alongside thread dumps
//!
//! - GC pause time comes from the host through [`GcTimeSource`]; processes
//!   without a collector use [`NoGcTime`]
//! - CPU load is the 1-minute load average divided by the online CPU count,
//!   read from `getloadavg(3)` and `/sys/devices/system/cpu/online`

#![allow(unsafe_code)] // getloadavg() requires unsafe

use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

/// Cumulative collector pause time of the watched process.
pub trait GcTimeSource: Send + Sync {
    /// Total pause time since process start. Must never decrease.
    fn total_gc_time(&self) -> Duration;
}

/// For runtimes without a garbage collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGcTime;

impl GcTimeSource for NoGcTime {
    fn total_gc_time(&self) -> Duration {
        Duration::ZERO
    }
}

/// Count of online CPUs from /sys/devices/system/cpu/online
///
/// The format is a range list like "0-3" or "0-3,8-11" on NUMA systems.
pub fn online_cpu_count() -> Result<usize> {
    let content = fs::read_to_string("/sys/devices/system/cpu/online")
        .context("Failed to read /sys/devices/system/cpu/online")?;
    parse_cpu_list(&content)
}

fn parse_cpu_list(content: &str) -> Result<usize> {
    let mut count = 0;
    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: usize = start.parse()?;
            let end: usize = end.parse()?;
            count += end.saturating_sub(start) + 1;
        } else {
            let _: usize = range.parse()?;
            count += 1;
        }
    }
    Ok(count)
}

/// 1-minute load average as a percentage of available CPUs.
///
/// `None` when either figure is unavailable on this platform.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cpu_load_percent() -> Option<f64> {
    let mut loads = [0.0f64; 3];
    // SAFETY: `loads` has room for the 3 samples requested
    let filled = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    if filled < 1 {
        return None;
    }
    let cpus = online_cpu_count().ok().filter(|&n| n > 0)?;
    Some(loads[0] / cpus as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3\n").unwrap(), 4);
        assert_eq!(parse_cpu_list("0-3,8-11").unwrap(), 8);
        assert_eq!(parse_cpu_list("5").unwrap(), 1);
        assert!(parse_cpu_list("x-3").is_err());
    }

    #[test]
    fn test_online_cpu_count() {
        let result = online_cpu_count();

        #[cfg(target_os = "linux")]
        assert!(result.unwrap() >= 1);

        #[cfg(not(target_os = "linux"))]
        assert!(result.is_err());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_cpu_load_is_non_negative() {
        if let Some(load) = cpu_load_percent() {
            assert!(load >= 0.0);
        }
    }

    #[test]
    fn test_no_gc_time() {
        assert_eq!(NoGcTime.total_gc_time(), Duration::ZERO);
    }
}
