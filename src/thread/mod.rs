//! Thread control blocks.

use crate::context::ExecutionContext;
use crate::mem::Stack;

pub mod builder;

pub use builder::ThreadBuilder;

/// Boxed body of a spawned thread.
///
/// `FnMut` rather than `FnOnce` so that calling it does not free the box;
/// the caller drops it once preemption is masked.
pub type ThreadEntry = Box<dyn FnMut() + Send + 'static>;

/// Identifier of a logical thread; equal to its slot in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    /// The thread that called `init`.
    pub const MAIN: ThreadId = ThreadId(0);

    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ThreadId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Ready = 0,
    Running = 1,
    Blocked = 2,
    Terminated = 3,
}

impl core::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            ThreadState::Ready => "READY",
            ThreadState::Running => "RUNNING",
            ThreadState::Blocked => "BLOCKED",
            ThreadState::Terminated => "TERMINATED",
        };
        f.write_str(label)
    }
}

/// A logical thread.
///
/// Owned by its thread-table slot. Spawned threads own their stack; the main
/// thread runs on the process stack and has none.
pub struct Thread {
    id: ThreadId,
    state: ThreadState,
    entry: Option<ThreadEntry>,
    stack: Option<Stack>,
    context: ExecutionContext,
    quantum_count: u64,
    name: Option<String>,
}

impl Thread {
    /// The control block for the thread that initializes the library. It is
    /// already running and its first quantum is counted.
    pub fn main() -> Self {
        Self {
            id: ThreadId::MAIN,
            state: ThreadState::Running,
            entry: None,
            stack: None,
            context: ExecutionContext::new(),
            quantum_count: 1,
            name: Some(String::from("main")),
        }
    }

    /// Create a ready thread that will run `entry` on `stack`.
    ///
    /// Its context is seeded so that the first dispatch lands in `start`,
    /// which is expected to take the entry back out with
    /// [`Thread::take_entry`].
    pub fn new(
        id: ThreadId,
        stack: Stack,
        entry: ThreadEntry,
        start: unsafe extern "C" fn() -> !,
        name: Option<String>,
    ) -> Self {
        let mut context = ExecutionContext::new();
        // The stack moves into the TCB below; moving the `Stack` handle does
        // not move the memory it points at.
        unsafe { context.prepare(&stack, start) };

        Self {
            id,
            state: ThreadState::Ready,
            entry: Some(entry),
            stack: Some(stack),
            context,
            quantum_count: 0,
            name,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn quantum_count(&self) -> u64 {
        self.quantum_count
    }

    /// Account for one more dispatch.
    pub fn count_quantum(&mut self) {
        self.quantum_count += 1;
    }

    /// Take the thread body. `None` once it has started.
    pub fn take_entry(&mut self) -> Option<ThreadEntry> {
        self.entry.take()
    }

    pub fn has_stack(&self) -> bool {
        self.stack.is_some()
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// Raw pointer to the saved context. The TCB is boxed in the table, so
    /// the pointer stays valid until the TCB is dropped.
    pub fn context_ptr(&mut self) -> *mut ExecutionContext {
        &mut self.context
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.state = ThreadState::Terminated;
        #[cfg(feature = "stack-canary")]
        if let Some(stack) = &self.stack {
            if !stack.check_canary(crate::mem::STACK_CANARY) {
                log::warn!("stack overflow detected in thread {}", self.id);
            }
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("quantum_count", &self.quantum_count)
            .field("stack", &self.stack)
            .finish()
    }
}
