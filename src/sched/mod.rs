//! Thread scheduling: the thread table, the ready queue and the state
//! machine that ties them together.

pub mod rr;
pub mod state;
pub mod table;
pub mod trait_def;

pub use rr::RoundRobinScheduler;
pub use state::{Blocking, SchedulerState, StatusReport, Termination, ThreadSummary};
pub use table::{ThreadTable, MAX_THREAD_NUM};
pub use trait_def::Scheduler;

/// Default scheduler type.
pub type DefaultScheduler = RoundRobinScheduler;
