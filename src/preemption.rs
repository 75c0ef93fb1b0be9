//! Timer-driven preemption.
//!
//! A repeating `ITIMER_VIRTUAL` timer raises `SIGVTALRM` each time the process
//! has burned one quantum of CPU time. The kernel's handler for that signal
//! re-queues the running thread and dispatches the next one.
//!
//! The same signal is the only source of reentrancy into the scheduler, so
//! masking it is the whole critical-section story: every operation that
//! touches scheduler state holds a [`PreemptionGuard`].

use crate::errors::{fatal, SystemError};
use crate::time::Quantum;
use core::mem::MaybeUninit;
use core::ptr;

/// The signal that ends a quantum.
pub const PREEMPTION_SIGNAL: libc::c_int = libc::SIGVTALRM;

/// A POSIX signal set.
#[derive(Clone, Copy)]
pub struct SignalSet(libc::sigset_t);

impl SignalSet {
    /// The set with no signals.
    pub fn empty() -> Self {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        unsafe {
            libc::sigemptyset(set.as_mut_ptr());
            Self(set.assume_init())
        }
    }

    /// The set holding only [`PREEMPTION_SIGNAL`].
    pub fn preemption() -> Self {
        let mut set = Self::empty();
        set.add(PREEMPTION_SIGNAL);
        set
    }

    pub fn add(&mut self, signal: libc::c_int) {
        unsafe {
            libc::sigaddset(&mut self.0, signal);
        }
    }

    pub fn contains(&self, signal: libc::c_int) -> bool {
        unsafe { libc::sigismember(&self.0, signal) == 1 }
    }

    /// The calling OS thread's current signal mask.
    pub fn current() -> Result<Self, SystemError> {
        let mut current = MaybeUninit::<libc::sigset_t>::uninit();
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), current.as_mut_ptr()) };
        if rc != 0 {
            return Err(SystemError::SignalMask);
        }
        Ok(Self(unsafe { current.assume_init() }))
    }

    /// Make this set the calling OS thread's signal mask.
    pub fn install_as_mask(&self) -> Result<(), SystemError> {
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &self.0, ptr::null_mut()) };
        if rc != 0 {
            return Err(SystemError::SignalMask);
        }
        Ok(())
    }
}

impl core::fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalSet")
            .field("preemption", &self.contains(PREEMPTION_SIGNAL))
            .finish_non_exhaustive()
    }
}

/// Block the preemption signal, returning the mask that was in force before.
pub fn mask() -> Result<SignalSet, SystemError> {
    let blocked = SignalSet::preemption();
    let mut previous = MaybeUninit::<libc::sigset_t>::uninit();
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &blocked.0, previous.as_mut_ptr()) };
    if rc != 0 {
        return Err(SystemError::SignalMask);
    }
    Ok(SignalSet(unsafe { previous.assume_init() }))
}

/// Whether the preemption signal is currently blocked.
pub fn is_masked() -> bool {
    SignalSet::current()
        .map(|set| set.contains(PREEMPTION_SIGNAL))
        .unwrap_or_else(|err| fatal(err))
}

/// Guard that blocks the preemption signal while it is in scope.
///
/// Dropping it restores the mask that was in force when it was created, so
/// guards nest. A guard left behind on the stack of a thread that is switched
/// away from is dropped when that thread is resumed.
#[must_use = "preemption is re-enabled as soon as the guard is dropped"]
pub struct PreemptionGuard {
    previous: SignalSet,
}

impl PreemptionGuard {
    pub fn new() -> Self {
        match mask() {
            Ok(previous) => Self { previous },
            Err(err) => fatal(err),
        }
    }

    /// Whether preemption was already disabled when this guard was taken.
    pub fn was_nested(&self) -> bool {
        self.previous.contains(PREEMPTION_SIGNAL)
    }
}

impl Default for PreemptionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptionGuard {
    fn drop(&mut self) {
        if let Err(err) = self.previous.install_as_mask() {
            fatal(err);
        }
    }
}

/// Disable preemption for the current scope.
pub fn disable() -> PreemptionGuard {
    PreemptionGuard::new()
}

/// Install `handler` for [`PREEMPTION_SIGNAL`].
///
/// The signal stays blocked while the handler runs; the handler may leave
/// through a context switch, in which case the resumed side restores the
/// mask it saved.
pub fn install_handler(handler: extern "C" fn(libc::c_int)) -> Result<(), SystemError> {
    unsafe {
        let mut sa: libc::sigaction = MaybeUninit::zeroed().assume_init();
        sa.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaddset(&mut sa.sa_mask, PREEMPTION_SIGNAL);
        sa.sa_flags = libc::SA_RESTART;

        if libc::sigaction(PREEMPTION_SIGNAL, &sa, ptr::null_mut()) != 0 {
            return Err(SystemError::SignalHandler);
        }
    }
    Ok(())
}

/// Identity of the calling OS thread, as stored by the kernel.
pub fn current_os_thread() -> usize {
    unsafe { libc::pthread_self() as usize }
}

/// Re-deliver the preemption signal to `owner`.
///
/// `ITIMER_VIRTUAL` signals are process-directed, so the OS may pick any
/// thread that does not block them.
pub fn forward_to(owner: usize) {
    unsafe {
        libc::pthread_kill(owner as libc::pthread_t, PREEMPTION_SIGNAL);
    }
}

/// The repeating virtual-time interval timer.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    quantum: Quantum,
}

impl IntervalTimer {
    pub fn new(quantum: Quantum) -> Self {
        Self { quantum }
    }

    pub fn quantum(&self) -> Quantum {
        self.quantum
    }

    /// Start a fresh quantum; the timer then fires every quantum.
    pub fn arm(&self) -> Result<(), SystemError> {
        let period = self.quantum.as_timeval();
        set_virtual_timer(&libc::itimerval {
            it_interval: period,
            it_value: period,
        })
    }

    /// Stop the timer.
    pub fn disarm(&self) -> Result<(), SystemError> {
        let zero = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        set_virtual_timer(&libc::itimerval {
            it_interval: zero,
            it_value: zero,
        })
    }
}

fn set_virtual_timer(value: &libc::itimerval) -> Result<(), SystemError> {
    let rc = unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, value, ptr::null_mut()) };
    if rc != 0 {
        return Err(SystemError::Timer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preemption_set_holds_only_the_timer_signal() {
        let set = SignalSet::preemption();
        assert!(set.contains(libc::SIGVTALRM));
        assert!(!set.contains(libc::SIGALRM));
        assert!(!set.contains(libc::SIGINT));
        assert!(!SignalSet::empty().contains(libc::SIGVTALRM));
    }

    #[test]
    fn test_guard_masks_and_restores() {
        // Test threads start with the signal unblocked.
        assert!(!is_masked());
        {
            let outer = PreemptionGuard::new();
            assert!(is_masked());
            assert!(!outer.was_nested());
            {
                let inner = disable();
                assert!(inner.was_nested());
                assert!(is_masked());
            }
            // Inner guard restores the outer, still masked state.
            assert!(is_masked());
        }
        assert!(!is_masked());
    }

    #[test]
    fn test_current_mask_round_trip() {
        let before = SignalSet::current().unwrap();
        let _guard = PreemptionGuard::new();
        before.install_as_mask().unwrap();
        assert!(!is_masked());
    }
}
