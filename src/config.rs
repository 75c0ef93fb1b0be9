//! Scheduler configuration.

use crate::errors::ThreadResult;
use crate::mem::StackSizeClass;
use crate::time::Quantum;

/// Settings fixed when the scheduler starts.
///
/// ```ignore
/// let config = Config::new(10_000)?.stack_size(StackSizeClass::Large);
/// preemptive_uthreads::init_with(config)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    quantum: Quantum,
    stack_size: StackSizeClass,
}

impl Config {
    /// Configuration with a quantum of `quantum_usecs` microseconds and the
    /// default stack size.
    pub fn new(quantum_usecs: u64) -> ThreadResult<Self> {
        Ok(Self {
            quantum: Quantum::from_micros(quantum_usecs)?,
            stack_size: StackSizeClass::default(),
        })
    }

    /// Stack size for threads that do not ask for one.
    pub fn stack_size(mut self, size: StackSizeClass) -> Self {
        self.stack_size = size;
        self
    }

    pub fn quantum(&self) -> Quantum {
        self.quantum
    }

    pub fn default_stack_size(&self) -> StackSizeClass {
        self.stack_size
    }
}
