#![deny(unsafe_op_in_unsafe_fn)]

//! Preemptive user-level threads for Unix processes.
//!
//! Many logical threads share the OS thread that calls [`init`]. Each runs
//! for one quantum of process CPU time, measured by `ITIMER_VIRTUAL`; when
//! the timer fires, the `SIGVTALRM` handler puts the running thread at the
//! back of the ready queue and switches to the one at the front.
//!
//! # Quick Start
//!
//! ```no_run
//! use preemptive_uthreads as uthreads;
//!
//! uthreads::init(10_000).unwrap();
//!
//! let worker = uthreads::spawn(|| loop {
//!     // thread work
//! })
//! .unwrap();
//!
//! uthreads::block(worker).unwrap();
//! uthreads::resume(worker).unwrap();
//!
//! // Ends the process.
//! uthreads::terminate(uthreads::ThreadId::MAIN).unwrap();
//! ```
//!
//! # Thread bodies
//!
//! A thread can be preempted between any two instructions, including inside
//! the allocator or while holding the lock on stdout. Work that must not be
//! interleaved with other threads (allocation, printing, logging) belongs
//! inside a [`disable_preemption`] scope.
//!
//! A body that returns terminates its thread.
//!
//! A thread that has started and is then terminated, by itself or by another
//! thread, is never unwound. Its body and everything the closure captured
//! are not dropped, so their destructors never run. Share state through
//! `'static` items or accept the leak. A thread terminated before its first
//! quantum drops its body as usual.
//!
//! # Features
//!
//! - `stack-canary`: Check every thread stack for overflow when it is freed
//!   (default)

pub mod arch;
pub mod config;
pub mod context;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod preemption;
pub mod sched;
pub mod thread;
pub mod time;

#[cfg(test)]
mod tests;

// Kernel
pub use kernel::Kernel;

// Configuration
pub use config::Config;

// Scheduler
pub use sched::{
    DefaultScheduler, RoundRobinScheduler, Scheduler, StatusReport, ThreadSummary, MAX_THREAD_NUM,
};

// Threads
pub use thread::{ThreadBuilder, ThreadId, ThreadState};

// Memory management
pub use mem::StackSizeClass;

// Preemption
pub use preemption::PreemptionGuard;

// Errors
pub use errors::{ErrorKind, ThreadError, ThreadResult};

use errors::InvalidOperationError;

static KERNEL: spin::Once<Kernel<DefaultScheduler>> = spin::Once::new();

/// The kernel started by [`init`].
pub(crate) fn global() -> ThreadResult<&'static Kernel<DefaultScheduler>> {
    KERNEL
        .get()
        .ok_or_else(|| InvalidOperationError::NotInitialized.into())
}

/// Start the scheduler with a quantum of `quantum_usecs` microseconds.
///
/// The caller becomes the main thread, id 0, already running its first
/// quantum. Fails with `InvalidArgument` if `quantum_usecs` is zero and with
/// `InvalidOperation` if the scheduler was already started.
pub fn init(quantum_usecs: u64) -> ThreadResult<()> {
    let config = Config::new(quantum_usecs).map_err(|err| {
        log::warn!("init failed: {}", err);
        err
    })?;
    init_with(config)
}

/// Start the scheduler with an explicit configuration.
pub fn init_with(config: Config) -> ThreadResult<()> {
    KERNEL
        .call_once(|| Kernel::new(DefaultScheduler::new(), config))
        .start()
}

/// Spawn a thread running `f`, returning its id.
///
/// The id is the lowest one not in use.
pub fn spawn<F>(f: F) -> ThreadResult<ThreadId>
where
    F: FnOnce() + Send + 'static,
{
    global()?.spawn(f)
}

/// Destroy a thread.
///
/// `terminate(ThreadId::MAIN)` ends the process with status 0, and a thread
/// terminating itself never returns.
pub fn terminate(id: ThreadId) -> ThreadResult<()> {
    global()?.terminate(id)
}

/// Block a thread until [`resume`] is called on it.
pub fn block(id: ThreadId) -> ThreadResult<()> {
    global()?.block(id)
}

/// Make a blocked thread ready again.
pub fn resume(id: ThreadId) -> ThreadResult<()> {
    global()?.resume(id)
}

/// Yield the current thread's time slice to the scheduler.
///
/// The current thread stays runnable and goes to the back of the ready
/// queue.
pub fn yield_now() -> ThreadResult<()> {
    global()?.yield_now()
}

/// Id of the calling thread.
pub fn current_id() -> ThreadResult<ThreadId> {
    global()?.current_id()
}

/// Quanta dispatched since [`init`].
pub fn total_quantums() -> ThreadResult<u64> {
    global()?.total_quantums()
}

/// Quanta dispatched to thread `id`, the current one included if it is
/// running.
pub fn quantums(id: ThreadId) -> ThreadResult<u64> {
    global()?.quantums(id)
}

/// Snapshot of all threads and the ready queue.
pub fn status() -> ThreadResult<StatusReport> {
    global()?.status()
}

/// Keep the current thread on the CPU until the guard is dropped.
pub fn disable_preemption() -> PreemptionGuard {
    preemption::disable()
}
