//! Quantum length and its conversions.

use crate::errors::{ArgumentError, ThreadResult};

const MICROS_PER_SEC: u64 = 1_000_000;

/// Length of one time slice, in microseconds of process CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantum {
    usecs: u64,
}

impl Quantum {
    /// A quantum of `usecs` microseconds.
    ///
    /// Fails with `InvalidArgument` unless `usecs` is positive.
    pub fn from_micros(usecs: u64) -> ThreadResult<Self> {
        if usecs == 0 {
            return Err(ArgumentError::ZeroQuantum.into());
        }
        Ok(Self { usecs })
    }

    pub fn as_micros(self) -> u64 {
        self.usecs
    }

    /// Split into whole seconds and remaining microseconds.
    pub fn as_timeval(self) -> libc::timeval {
        libc::timeval {
            tv_sec: (self.usecs / MICROS_PER_SEC) as libc::time_t,
            tv_usec: (self.usecs % MICROS_PER_SEC) as libc::suseconds_t,
        }
    }
}

impl core::fmt::Display for Quantum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}us", self.usecs)
    }
}
