//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent passing a thread id where a process id is
//! expected, which matters once marker files and crash artifacts get matched
//! against the current process.

use std::fmt;
use std::str::FromStr;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// PID of the running process.
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Pid)
    }
}

/// Thread ID
///
/// On Linux the main thread's TID equals the process PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub u64);

impl From<Pid> for Tid {
    fn from(pid: Pid) -> Self {
        Tid(u64::from(pid.0))
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}
