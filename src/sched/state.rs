//! Scheduler bookkeeping.
//!
//! [`SchedulerState`] owns the thread table, the ready queue and the running
//! id, and moves threads between states. It never transfers control: when an
//! operation leaves the running thread unable to continue, it says so in its
//! return value and the kernel performs the switch.

use super::table::ThreadTable;
use super::trait_def::Scheduler;
use crate::context::ExecutionContext;
use crate::errors::{InvalidOperationError, ResourceError, SystemError, ThreadResult};
use crate::mem::{Stack, StackSizeClass};
use crate::thread::{Thread, ThreadEntry, ThreadId, ThreadState};
use core::fmt;

/// What [`SchedulerState::terminate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The main thread was named; the caller must shut the process down.
    /// Nothing was changed.
    Shutdown,
    /// A thread other than the running one was destroyed.
    Removed,
    /// The running thread was removed from the table. Its control block is
    /// parked until the next thread has switched off its stack, and the
    /// caller must dispatch.
    RemovedRunning,
}

/// What [`SchedulerState::block`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    /// The thread is blocked; the running thread carries on.
    Blocked,
    /// The running thread blocked itself and the caller must dispatch.
    BlockedRunning,
}

pub struct SchedulerState<S: Scheduler> {
    table: ThreadTable,
    ready: S,
    running: ThreadId,
    total_quanta: u64,
    /// Control block of a thread that terminated itself, waiting to be freed
    zombie: Option<Box<Thread>>,
}

impl<S: Scheduler> SchedulerState<S> {
    /// Fresh state with the main thread running its first quantum.
    pub fn new(ready: S) -> Self {
        let mut table = ThreadTable::new();
        table.insert(Box::new(Thread::main()));
        Self {
            table,
            ready,
            running: ThreadId::MAIN,
            total_quanta: 1,
            zombie: None,
        }
    }

    pub fn running(&self) -> ThreadId {
        self.running
    }

    pub fn total_quanta(&self) -> u64 {
        self.total_quanta
    }

    pub fn table(&self) -> &ThreadTable {
        &self.table
    }

    pub fn ready(&self) -> &S {
        &self.ready
    }

    /// Create a ready thread in the lowest free slot and queue it.
    pub fn spawn(
        &mut self,
        entry: ThreadEntry,
        stack_size: StackSizeClass,
        name: Option<String>,
        start: unsafe extern "C" fn() -> !,
    ) -> ThreadResult<ThreadId> {
        let id = self
            .table
            .lowest_free()
            .ok_or(ResourceError::TooManyThreads)?;
        let stack = Stack::allocate(stack_size).ok_or(ResourceError::OutOfMemory)?;

        self.table
            .insert(Box::new(Thread::new(id, stack, entry, start, name)));
        self.ready.enqueue(id);
        Ok(id)
    }

    /// Destroy `id`. See [`Termination`] for what the caller must do next.
    pub fn terminate(&mut self, id: ThreadId) -> ThreadResult<Termination> {
        self.table.validate(id)?;
        if id.is_main() {
            return Ok(Termination::Shutdown);
        }

        self.ready.remove(id);
        let Some(thread) = self.table.remove(id) else {
            return Ok(Termination::Removed);
        };

        if id == self.running {
            // Any earlier zombie belongs to a thread that is long off the CPU.
            self.zombie = Some(thread);
            Ok(Termination::RemovedRunning)
        } else {
            drop(thread);
            Ok(Termination::Removed)
        }
    }

    /// Move `id` to the blocked state.
    pub fn block(&mut self, id: ThreadId) -> ThreadResult<Blocking> {
        self.table.validate(id)?;
        if id.is_main() {
            return Err(InvalidOperationError::BlockMainThread.into());
        }

        let is_running = id == self.running;
        if let Some(thread) = self.table.get_mut(id) {
            if thread.state() == ThreadState::Blocked {
                return Ok(Blocking::Blocked);
            }
            thread.set_state(ThreadState::Blocked);
        }
        self.ready.remove(id);

        if is_running {
            Ok(Blocking::BlockedRunning)
        } else {
            Ok(Blocking::Blocked)
        }
    }

    /// Make a blocked thread ready again, queueing it at the tail.
    ///
    /// Returns whether anything changed; resuming a ready or running thread
    /// is a no-op.
    pub fn resume(&mut self, id: ThreadId) -> ThreadResult<bool> {
        self.table.validate(id)?;
        match self.table.get_mut(id) {
            Some(thread) if thread.state() == ThreadState::Blocked => {
                thread.set_state(ThreadState::Ready);
                self.ready.enqueue(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Put the running thread back at the tail of the ready queue.
    pub fn requeue_running(&mut self) {
        let id = self.running;
        if let Some(thread) = self.table.get_mut(id) {
            if thread.state() == ThreadState::Running {
                thread.set_state(ThreadState::Ready);
                self.ready.enqueue(id);
            }
        }
    }

    /// Choose the next thread and account for its quantum.
    ///
    /// Takes the head of the ready queue; with an empty queue the running
    /// thread keeps the CPU if it still can.
    pub fn dispatch(&mut self) -> Result<ThreadId, SystemError> {
        let next = match self.ready.pick_next() {
            Some(next) => next,
            None => {
                let running = self.running;
                match self.table.get(running) {
                    Some(thread) if thread.state() != ThreadState::Blocked => running,
                    _ => return Err(SystemError::NoRunnableThread),
                }
            }
        };

        let thread = self
            .table
            .get_mut(next)
            .ok_or(SystemError::NoRunnableThread)?;
        thread.set_state(ThreadState::Running);
        thread.count_quantum();
        self.total_quanta += 1;
        self.running = next;
        Ok(next)
    }

    /// Saved context of `id`, stable for as long as the thread lives.
    pub fn context_of(&mut self, id: ThreadId) -> Option<*mut ExecutionContext> {
        self.table.get_mut(id).map(Thread::context_ptr)
    }

    pub fn running_thread_mut(&mut self) -> Option<&mut Thread> {
        self.table.get_mut(self.running)
    }

    /// Hand over the parked control block of a self-terminated thread.
    pub fn take_zombie(&mut self) -> Option<Box<Thread>> {
        self.zombie.take()
    }

    pub fn quantums(&self, id: ThreadId) -> ThreadResult<u64> {
        self.table.validate(id)?;
        Ok(self
            .table
            .get(id)
            .map(Thread::quantum_count)
            .unwrap_or_default())
    }

    /// Destroy every thread.
    ///
    /// The running thread's control block is handed back instead when it owns
    /// a stack, since the caller is still executing on it.
    pub fn shutdown(&mut self) -> Option<Box<Thread>> {
        self.ready.clear();
        self.zombie = None;

        let running = self.running;
        let mut current = None;
        for thread in self.table.drain() {
            if thread.id() == running && thread.has_stack() {
                current = Some(thread);
            }
        }
        current
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            running: self.running,
            total_quanta: self.total_quanta,
            threads: self
                .table
                .iter()
                .map(|thread| ThreadSummary {
                    id: thread.id(),
                    name: thread.name().map(String::from),
                    state: thread.state(),
                    quanta: thread.quantum_count(),
                })
                .collect(),
            ready: self.ready.ready_ids(),
        }
    }

    /// Panic unless the table, queue and running id agree with each other.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let running = self
            .table
            .get(self.running)
            .expect("running thread missing from table");
        assert_eq!(running.state(), ThreadState::Running);
        assert!(!self.ready.contains(self.running));

        let mut queued = self.ready.ready_ids();
        for thread in self.table.iter() {
            assert_eq!(
                thread.state() == ThreadState::Ready,
                self.ready.contains(thread.id()),
                "thread {} is {} but queued = {}",
                thread.id(),
                thread.state(),
                self.ready.contains(thread.id())
            );
        }
        let len = queued.len();
        queued.sort();
        queued.dedup();
        assert_eq!(queued.len(), len, "duplicate ids in ready queue");
        assert_eq!(
            self.table
                .iter()
                .filter(|t| t.state() == ThreadState::Running)
                .count(),
            1
        );
    }
}

/// One thread's line in a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub name: Option<String>,
    pub state: ThreadState,
    pub quanta: u64,
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub running: ThreadId,
    pub total_quanta: u64,
    /// Live threads in id order
    pub threads: Vec<ThreadSummary>,
    /// Ready queue in dispatch order
    pub ready: Vec<ThreadId>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "running thread {}, {} quanta so far",
            self.running, self.total_quanta
        )?;
        for thread in &self.threads {
            writeln!(
                f,
                "  {:>3} {:<12} {:<8} {} quanta",
                thread.id,
                thread.name.as_deref().unwrap_or("-"),
                thread.state,
                thread.quanta
            )?;
        }
        write!(f, "ready queue: [")?;
        for (i, id) in self.ready.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}
