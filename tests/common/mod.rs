//! Helpers shared by the scenario binaries.
//!
//! Thread bodies here only touch atomics. Anything that allocates or prints
//! runs on the main thread or inside `disable_preemption`.

#![allow(dead_code)]

use preemptive_uthreads::{self as uthreads, ThreadId, ThreadState};
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(20);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Yield until `done` holds, failing the scenario after [`TIMEOUT`].
pub fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        uthreads::yield_now().unwrap();
    }
}

/// Current state of `id`, or `None` if it does not exist.
pub fn state_of(id: ThreadId) -> Option<ThreadState> {
    let _guard = uthreads::disable_preemption();
    let report = uthreads::status().unwrap();
    let state = report.threads.iter().find(|t| t.id == id).map(|t| t.state);
    drop(report);
    state
}

/// Thread body that burns CPU forever.
pub fn spin() {
    loop {
        core::hint::spin_loop();
    }
}

/// End the scenario successfully.
pub fn finish() -> ! {
    let _ = uthreads::terminate(ThreadId::MAIN);
    unreachable!("terminating the main thread exits the process");
}
