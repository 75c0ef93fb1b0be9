use super::ThreadId;
use crate::errors::ThreadResult;
use crate::kernel::Kernel;
use crate::mem::StackSizeClass;
use crate::sched::Scheduler;

/// Spawn options for a single thread.
///
/// ```ignore
/// let id = ThreadBuilder::new()
///     .name("producer")
///     .stack_size(StackSizeClass::Large)
///     .spawn(|| produce())?;
/// ```
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    stack_size: Option<StackSizeClass>,
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the kernel's default stack size for this thread.
    pub fn stack_size(mut self, size: StackSizeClass) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn on the process-wide scheduler started by [`crate::init`].
    pub fn spawn<F>(self, f: F) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_on(crate::global()?, f)
    }

    /// Spawn on an explicitly held kernel.
    pub fn spawn_on<S, F>(self, kernel: &Kernel<S>, f: F) -> ThreadResult<ThreadId>
    where
        S: Scheduler + 'static,
        F: FnOnce() + Send + 'static,
    {
        kernel.spawn_with(f, self.stack_size, self.name)
    }
}
