//! The scheduler core.
//!
//! [`Kernel`] wraps the bookkeeping in [`SchedulerState`] with the two things
//! it cannot do on its own: critical sections and control transfer.
//!
//! Every public operation masks the preemption signal for as long as it
//! touches shared state. The state lock is only ever taken while masked, and
//! it is always released before the CPU moves to another thread, so the
//! signal handler finds it free unless something has gone badly wrong.
//!
//! Control moves between threads at exactly three capture points: a thread
//! blocking itself, a thread yielding, and the preemption handler. In each
//! case the capturing branch calls `switch_thread` and the resumed
//! branch simply carries on where the thread left off.

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::errors::{fatal, InvalidOperationError, SystemError, ThreadError, ThreadResult};
use crate::mem::StackSizeClass;
use crate::preemption::{self, IntervalTimer, PreemptionGuard};
use crate::sched::{Blocking, Scheduler, SchedulerState, StatusReport, Termination};
use crate::thread::{ThreadEntry, ThreadId};
use portable_atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

/// Global kernel reference for the signal handler and fresh threads.
static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Set once a kernel has been started in this process.
static STARTED: AtomicBool = AtomicBool::new(false);

/// A user-level thread scheduler.
///
/// # Type Parameters
///
/// * `S` - Ready-queue policy
pub struct Kernel<S: Scheduler> {
    state: spin::Mutex<SchedulerState<S>>,
    config: Config,
    timer: IntervalTimer,
    /// `pthread_self` of the OS thread that started the kernel
    owner: AtomicUsize,
    started: AtomicBool,
}

impl<S: Scheduler + 'static> Kernel<S> {
    /// Create a kernel. Nothing happens until [`Kernel::start`].
    pub fn new(scheduler: S, config: Config) -> Self {
        Self {
            state: spin::Mutex::new(SchedulerState::new(scheduler)),
            config,
            timer: IntervalTimer::new(config.quantum()),
            owner: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Make the calling code the main thread and start preemption.
    ///
    /// The calling OS thread becomes the only one allowed to use the kernel.
    /// Only one kernel can be started per process.
    pub fn start(&'static self) -> ThreadResult<()> {
        let _guard = PreemptionGuard::new();

        if STARTED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.reject("init", InvalidOperationError::AlreadyInitialized.into());
        }

        let owner = preemption::current_os_thread();
        self.owner.store(owner, Ordering::Release);
        // Safety: `self` is 'static.
        unsafe { self.register_global() };
        self.started.store(true, Ordering::Release);

        if let Err(err) = preemption::install_handler(on_quantum_expired::<S>) {
            fatal(err);
        }
        if let Err(err) = self.timer.arm() {
            fatal(err);
        }

        log::info!(
            "scheduler started: quantum {}, owner thread {:#x}",
            self.config.quantum(),
            owner
        );
        Ok(())
    }

    /// Spawn a thread with the configured default stack size.
    pub fn spawn<F>(&self, f: F) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_with(f, None, None)
    }

    /// Spawn a thread, optionally overriding its stack size and naming it.
    ///
    /// The new thread is ready and queued behind every thread that is already
    /// waiting.
    pub fn spawn_with<F>(
        &self,
        f: F,
        stack_size: Option<StackSizeClass>,
        name: Option<String>,
    ) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        let _guard = PreemptionGuard::new();
        self.enter("spawn")?;

        let mut f = Some(f);
        let entry: ThreadEntry = Box::new(move || {
            if let Some(f) = f.take() {
                f()
            }
        });
        let stack_size = stack_size.unwrap_or(self.config.default_stack_size());
        let spawned = self
            .state
            .lock()
            .spawn(entry, stack_size, name, thread_start::<S>);

        match spawned {
            Ok(id) => {
                log::debug!("spawned thread {} ({:?} stack)", id, stack_size);
                Ok(id)
            }
            Err(err) => self.reject("spawn", err),
        }
    }

    /// Destroy thread `id`.
    ///
    /// Terminating the main thread destroys every thread and exits the
    /// process with status 0. Terminating the running thread switches to the
    /// next one. Neither returns.
    pub fn terminate(&self, id: ThreadId) -> ThreadResult<()> {
        let _guard = PreemptionGuard::new();
        self.enter("terminate")?;

        let mut state = self.state.lock();
        match state.terminate(id) {
            Ok(Termination::Shutdown) => {
                let current = state.shutdown();
                drop(state);
                self.shutdown(current)
            }
            Ok(Termination::Removed) => {
                drop(state);
                log::debug!("terminated thread {}", id);
                Ok(())
            }
            Ok(Termination::RemovedRunning) => {
                drop(state);
                log::debug!("thread {} terminated itself", id);
                self.switch_thread()
            }
            Err(err) => {
                drop(state);
                self.reject("terminate", err)
            }
        }
    }

    /// Block thread `id` until it is resumed.
    ///
    /// A thread blocking itself gives up the CPU and only returns from this
    /// call after [`Kernel::resume`] and a later dispatch.
    pub fn block(&self, id: ThreadId) -> ThreadResult<()> {
        let _guard = PreemptionGuard::new();
        self.enter("block")?;

        let mut state = self.state.lock();
        let blocked = state.block(id);
        let context = state.context_of(id);
        drop(state);

        match blocked {
            Ok(Blocking::Blocked) => {
                log::debug!("blocked thread {}", id);
                Ok(())
            }
            Ok(Blocking::BlockedRunning) => {
                log::debug!("thread {} blocked itself", id);
                let Some(context) = context else {
                    fatal(SystemError::NoRunnableThread)
                };
                // Safety: the running thread's context lives in its boxed
                // control block, which outlives this suspension.
                unsafe { ExecutionContext::capture(context, || self.switch_thread()) };
                self.finish_switch();
                Ok(())
            }
            Err(err) => self.reject("block", err),
        }
    }

    /// Make a blocked thread ready again. Ready and running threads are left
    /// as they are.
    pub fn resume(&self, id: ThreadId) -> ThreadResult<()> {
        let _guard = PreemptionGuard::new();
        self.enter("resume")?;

        let resumed = self.state.lock().resume(id);
        match resumed {
            Ok(true) => {
                log::debug!("resumed thread {}", id);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => self.reject("resume", err),
        }
    }

    /// Give up the rest of the current quantum.
    pub fn yield_now(&self) -> ThreadResult<()> {
        let _guard = PreemptionGuard::new();
        self.enter("yield")?;

        let Some(context) = self.requeue_running() else {
            fatal(SystemError::NoRunnableThread)
        };
        // Safety: see `block`.
        unsafe { ExecutionContext::capture(context, || self.switch_thread()) };
        self.finish_switch();
        Ok(())
    }

    pub fn current_id(&self) -> ThreadResult<ThreadId> {
        let _guard = PreemptionGuard::new();
        self.enter("current_id")?;
        let running = self.state.lock().running();
        Ok(running)
    }

    /// Quanta dispatched since the kernel started, the main thread's first
    /// one included.
    pub fn total_quantums(&self) -> ThreadResult<u64> {
        let _guard = PreemptionGuard::new();
        self.enter("total_quantums")?;
        let total = self.state.lock().total_quanta();
        Ok(total)
    }

    /// Quanta thread `id` has been dispatched for.
    pub fn quantums(&self, id: ThreadId) -> ThreadResult<u64> {
        let _guard = PreemptionGuard::new();
        self.enter("quantums")?;
        let quanta = self.state.lock().quantums(id);
        quanta.or_else(|err| self.reject("quantums", err))
    }

    /// Snapshot of every thread and the ready queue.
    pub fn status(&self) -> ThreadResult<StatusReport> {
        let _guard = PreemptionGuard::new();
        self.enter("status")?;
        let report = self.state.lock().status();
        Ok(report)
    }

    /// Check that the kernel is running and that we are on its OS thread.
    fn enter(&self, op: &str) -> ThreadResult<()> {
        if !self.is_started() {
            return self.reject(op, InvalidOperationError::NotInitialized.into());
        }
        if self.owner.load(Ordering::Acquire) != preemption::current_os_thread() {
            return self.reject(op, InvalidOperationError::WrongThread.into());
        }
        Ok(())
    }

    fn reject<T>(&self, op: &str, err: ThreadError) -> ThreadResult<T> {
        log::warn!("{} failed: {}", op, err);
        Err(err)
    }

    /// Re-queue the running thread and return its context.
    fn requeue_running(&self) -> Option<*mut ExecutionContext> {
        let mut state = self.state.lock();
        state.requeue_running();
        let running = state.running();
        state.context_of(running)
    }

    /// Dispatch the next thread and jump into it.
    ///
    /// Runs with the preemption signal masked. The incoming thread restores
    /// its own mask.
    fn switch_thread(&self) -> ! {
        let mut state = self.state.lock();
        let next = state.dispatch().unwrap_or_else(|err| fatal(err));
        let Some(context) = state.context_of(next) else {
            fatal(SystemError::NoRunnableThread)
        };
        drop(state);

        if let Err(err) = self.timer.arm() {
            fatal(err);
        }
        // Safety: `context` belongs to a live thread that was either prepared
        // or captured, and the state lock is released.
        unsafe { ExecutionContext::resume(context) }
    }

    /// Free a thread that terminated itself, now that we are off its stack.
    ///
    /// Not called on the signal-handler path, which may have interrupted the
    /// allocator; a parked control block simply waits for the next thread to
    /// block, yield or start.
    fn finish_switch(&self) {
        let zombie = self.state.lock().take_zombie();
        if let Some(thread) = zombie {
            log::debug!("released stack of thread {}", thread.id());
        }
    }

    /// Handle the end of a quantum on the running thread.
    fn preempt_running(&self) {
        let owner = self.owner.load(Ordering::Acquire);
        if owner != preemption::current_os_thread() {
            preemption::forward_to(owner);
            return;
        }

        // The lock is only held with the signal masked, so contention means
        // the signal slipped in anyway; skip the tick.
        let Some(mut state) = self.state.try_lock() else {
            return;
        };
        state.requeue_running();
        let running = state.running();
        let context = state.context_of(running);
        drop(state);

        if let Some(context) = context {
            // Safety: see `block`.
            unsafe { ExecutionContext::capture(context, || self.switch_thread()) };
        }
    }

    /// Start the body of the thread that was just dispatched for the first
    /// time, then terminate it.
    fn run_current(&self) -> ! {
        self.finish_switch();

        let mut state = self.state.lock();
        let id = state.running();
        let (entry, context) = match state.running_thread_mut() {
            Some(thread) => (thread.take_entry(), thread.context_ptr()),
            None => fatal(SystemError::NoRunnableThread),
        };
        drop(state);

        // A fresh thread starts with nothing masked.
        // Safety: the thread is running, so its control block is live.
        unsafe { (*context).restore_signal_mask() };

        if let Some(mut entry) = entry {
            entry();
            let _guard = PreemptionGuard::new();
            drop(entry);
        }

        log::trace!("thread {} returned", id);
        // Only comes back if the thread could not be removed.
        let _ = self.terminate(id);
        fatal(SystemError::NoRunnableThread)
    }

    /// Tear everything down and end the process.
    fn shutdown(&self, current: Option<Box<crate::thread::Thread>>) -> ! {
        if let Err(err) = self.timer.disarm() {
            log::warn!("{}", ThreadError::from(err));
        }
        // Still executing on this stack.
        core::mem::forget(current);
        log::info!("main thread terminated, shutting down");
        std::process::exit(0)
    }

    /// Register this kernel as the global kernel for the signal handler.
    ///
    /// # Safety
    ///
    /// The kernel must outlive all signal handling.
    unsafe fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const _ as *mut (), Ordering::Release);
    }
}

/// Get the global kernel reference (for the signal handler).
///
/// Returns None if no kernel has been started.
fn get_global_kernel<S: Scheduler>() -> Option<&'static Kernel<S>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        // Safety: only `Kernel::<S>::start` stores here, once per process,
        // and it registers handlers instantiated for the same `S`.
        Some(unsafe { &*(ptr as *const Kernel<S>) })
    }
}

/// `SIGVTALRM` handler.
extern "C" fn on_quantum_expired<S: Scheduler + 'static>(_signal: libc::c_int) {
    if let Some(kernel) = get_global_kernel::<S>() {
        kernel.preempt_running();
    }
}

/// Where every spawned thread begins.
unsafe extern "C" fn thread_start<S: Scheduler + 'static>() -> ! {
    match get_global_kernel::<S>() {
        Some(kernel) => kernel.run_current(),
        None => fatal(SystemError::NoRunnableThread),
    }
}
