//! Execution contexts: capture and resume a logical thread's machine state.
//!
//! A capture has two outcomes. On the *capturing* branch the caller has just
//! saved its state and must hand control to somebody else. On the *resumed*
//! branch somebody has jumped back into the saved state and the caller
//! continues as if nothing happened.
//!
//! Rather than a function that returns twice, [`ExecutionContext::capture`]
//! takes the capturing branch as a continuation that must not return, and its
//! own return (carrying [`Resumed`]) is the resumed branch. The continuation
//! runs on the same stack, below the captured frame, so the frame is intact
//! when control comes back.

use crate::arch::{Arch, DefaultArch};
use crate::errors::fatal;
use crate::mem::Stack;
use crate::preemption::SignalSet;
use core::mem::ManuallyDrop;
use core::ptr;

/// Marker returned on the resumed branch of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumed;

/// Saved state of a suspended logical thread: callee-saved registers, stack
/// pointer, resume address and signal mask.
pub struct ExecutionContext {
    regs: <DefaultArch as Arch>::SavedContext,
    signal_mask: SignalSet,
}

impl ExecutionContext {
    /// An empty context. Resuming it before a capture or
    /// [`prepare`](Self::prepare) is undefined.
    pub fn new() -> Self {
        Self {
            regs: Default::default(),
            signal_mask: SignalSet::empty(),
        }
    }

    /// Seed this context so that resuming it runs `entry` from scratch on
    /// `stack`, with no signals blocked.
    ///
    /// # Safety
    ///
    /// `stack` must stay allocated for as long as this context may be resumed.
    pub unsafe fn prepare(&mut self, stack: &Stack, entry: unsafe extern "C" fn() -> !) {
        self.signal_mask = SignalSet::empty();
        unsafe { DefaultArch::prepare(&mut self.regs, stack.top(), entry) };
    }

    /// Capture the caller's state into `this`, then run `on_capture`.
    ///
    /// Returns only when `this` is resumed, after restoring the signal mask
    /// that was in force at capture time.
    ///
    /// # Safety
    ///
    /// - `this` must be valid until it is resumed
    /// - `on_capture` must leave through [`ExecutionContext::resume`] (or end
    ///   the process); returning from it or unwinding out of it aborts
    pub unsafe fn capture<F>(this: *mut Self, on_capture: F) -> Resumed
    where
        F: FnOnce(),
    {
        let mask = SignalSet::current().unwrap_or_else(|err| fatal(err));
        let mut on_capture = ManuallyDrop::new(on_capture);

        unsafe {
            (*this).signal_mask = mask;
            DefaultArch::capture(
                ptr::addr_of_mut!((*this).regs),
                run_continuation::<F>,
                &mut *on_capture as *mut F as *mut u8,
            );
            if let Err(err) = (*this).signal_mask.install_as_mask() {
                fatal(err);
            }
        }
        Resumed
    }

    /// Transfer control into `this`.
    ///
    /// # Safety
    ///
    /// `this` must hold a live capture or a prepared context whose stack is
    /// still allocated.
    pub unsafe fn resume(this: *const Self) -> ! {
        unsafe { DefaultArch::resume(ptr::addr_of!((*this).regs)) }
    }

    /// Install the mask saved with this context on the calling OS thread.
    ///
    /// A freshly prepared thread calls this once it is running, since it was
    /// never captured.
    pub fn restore_signal_mask(&self) {
        if let Err(err) = self.signal_mask.install_as_mask() {
            fatal(err);
        }
    }

    pub fn signal_mask(&self) -> &SignalSet {
        &self.signal_mask
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the continuation stored at `arg` by [`ExecutionContext::capture`].
unsafe extern "C" fn run_continuation<F>(arg: *mut u8) -> !
where
    F: FnOnce(),
{
    // The closure lives in the capturing frame, which is left alone until the
    // context is resumed, so moving it out here is its only use.
    let on_capture = unsafe { ptr::read(arg as *mut F) };
    on_capture();
    // There is no frame to return to.
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::StackSizeClass;
    use crate::preemption::{is_masked, PreemptionGuard};
    use std::cell::Cell;

    thread_local! {
        static HOME: Cell<*mut ExecutionContext> = const { Cell::new(ptr::null_mut()) };
        static AWAY: Cell<*mut ExecutionContext> = const { Cell::new(ptr::null_mut()) };
        static HOPS: Cell<u32> = const { Cell::new(0) };
        static SAW_UNMASKED: Cell<bool> = const { Cell::new(false) };
    }

    unsafe extern "C" fn bounce_home() -> ! {
        HOPS.with(|h| h.set(h.get() + 1));
        let home = HOME.with(|c| c.get());
        unsafe { ExecutionContext::resume(home) }
    }

    #[test]
    fn test_capture_then_resume_takes_both_branches() {
        let stack = Stack::allocate(StackSizeClass::Medium).unwrap();
        let mut away = ExecutionContext::new();
        unsafe { away.prepare(&stack, bounce_home) };

        let mut home = ExecutionContext::new();
        let home_ptr: *mut ExecutionContext = &mut home;
        HOME.with(|c| c.set(home_ptr));
        HOPS.with(|h| h.set(0));

        let mut captured = 0u32;
        let captured_ptr: *mut u32 = &mut captured;
        let away_ptr: *const ExecutionContext = &away;

        let resumed = unsafe {
            ExecutionContext::capture(home_ptr, || {
                *captured_ptr += 1;
                ExecutionContext::resume(away_ptr)
            })
        };

        assert_eq!(resumed, Resumed);
        assert_eq!(unsafe { ptr::read_volatile(captured_ptr) }, 1);
        assert_eq!(HOPS.with(|h| h.get()), 1);
    }

    unsafe extern "C" fn ping_pong() -> ! {
        // Runs on the fresh stack: trade control with HOME twice, keeping a
        // local alive across the switches.
        let mut local = 40u32;
        let mut away = AWAY.with(|c| c.get());
        for _ in 0..2 {
            local += 1;
            HOPS.with(|h| h.set(local));
            let home = HOME.with(|c| c.get());
            unsafe {
                ExecutionContext::capture(away, || ExecutionContext::resume(home));
            }
            away = AWAY.with(|c| c.get());
        }
        let home = HOME.with(|c| c.get());
        unsafe { ExecutionContext::resume(home) }
    }

    #[test]
    fn test_locals_survive_repeated_switches() {
        let stack = Stack::allocate(StackSizeClass::Medium).unwrap();
        let mut away = ExecutionContext::new();
        unsafe { away.prepare(&stack, ping_pong) };
        let away_ptr: *mut ExecutionContext = &mut away;
        AWAY.with(|c| c.set(away_ptr));

        let mut home = ExecutionContext::new();
        let home_ptr: *mut ExecutionContext = &mut home;
        HOME.with(|c| c.set(home_ptr));

        let mut seen = std::vec::Vec::new();
        for _ in 0..3 {
            unsafe {
                ExecutionContext::capture(home_ptr, || ExecutionContext::resume(away_ptr));
            }
            seen.push(HOPS.with(|h| h.get()));
        }
        // Third round-trip ends the thread body, which went home one last time.
        assert_eq!(seen, [41, 42, 42]);
    }

    #[test]
    fn test_continuation_with_statement_body() {
        let stack = Stack::allocate(StackSizeClass::Medium).unwrap();
        let mut away = ExecutionContext::new();
        unsafe { away.prepare(&stack, bounce_home) };

        let mut home = ExecutionContext::new();
        let home_ptr: *mut ExecutionContext = &mut home;
        HOME.with(|c| c.set(home_ptr));
        HOPS.with(|h| h.set(0));
        let away_ptr: *const ExecutionContext = &away;

        // A plain `FnOnce()` whose last statement leaves for good.
        let mut ran = false;
        let ran_ptr: *mut bool = &mut ran;
        let resumed = unsafe {
            ExecutionContext::capture(home_ptr, move || {
                *ran_ptr = true;
                ExecutionContext::resume(away_ptr);
            })
        };

        assert_eq!(resumed, Resumed);
        assert!(unsafe { ptr::read_volatile(ran_ptr) });
        assert_eq!(HOPS.with(|h| h.get()), 1);
    }

    unsafe extern "C" fn report_mask() -> ! {
        let away = AWAY.with(|c| c.get());
        unsafe { (*away).restore_signal_mask() };
        SAW_UNMASKED.with(|s| s.set(!is_masked()));
        let home = HOME.with(|c| c.get());
        unsafe { ExecutionContext::resume(home) }
    }

    #[test]
    fn test_masks_follow_the_context() {
        let stack = Stack::allocate(StackSizeClass::Medium).unwrap();
        let mut away = ExecutionContext::new();
        unsafe { away.prepare(&stack, report_mask) };
        assert!(!away.signal_mask().contains(crate::preemption::PREEMPTION_SIGNAL));
        let away_ptr: *mut ExecutionContext = &mut away;
        AWAY.with(|c| c.set(away_ptr));

        let mut home = ExecutionContext::new();
        let home_ptr: *mut ExecutionContext = &mut home;
        HOME.with(|c| c.set(home_ptr));

        let guard = PreemptionGuard::new();
        unsafe {
            ExecutionContext::capture(home_ptr, || ExecutionContext::resume(away_ptr));
        }
        // The fresh context ran unmasked; coming home restored our mask.
        assert!(SAW_UNMASKED.with(|s| s.get()));
        assert!(is_masked());
        drop(guard);
        assert!(!is_masked());
    }
}
