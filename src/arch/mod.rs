//! Architecture abstraction layer for user-level context switching.
//!
//! Each supported CPU provides a register-save layout and three primitives:
//! capture the current callee-saved state, resume a captured (or freshly
//! prepared) state, and seed a state so that resuming it starts a function on
//! a new stack. Signal masks are handled one level up, in
//! [`crate::context`].

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations are inline assembly that move the stack pointer between
/// stacks. Every method has preconditions the caller must uphold.
pub trait Arch {
    /// Saved register state, `#[repr(C)]` so the assembly can address it.
    type SavedContext: Send + Default;

    /// Save the caller's callee-saved registers, stack pointer and resume
    /// address into `ctx`, then call `on_capture(arg)` on the current stack.
    ///
    /// `on_capture` must never return; it is expected to resume some other
    /// context. This function returns only when `ctx` is resumed later.
    ///
    /// # Safety
    ///
    /// - `ctx` must be valid for writes and stay valid until it is resumed
    /// - the caller's stack frame must stay untouched until `ctx` is resumed
    unsafe fn capture(
        ctx: *mut Self::SavedContext,
        on_capture: unsafe extern "C" fn(*mut u8) -> !,
        arg: *mut u8,
    );

    /// Load the state in `ctx` and jump to its resume address.
    ///
    /// # Safety
    ///
    /// `ctx` must hold a state produced by [`Arch::capture`] whose frame is
    /// still live, or one seeded by [`Arch::prepare`] whose stack is still
    /// allocated.
    unsafe fn resume(ctx: *const Self::SavedContext) -> !;

    /// Seed `ctx` so that resuming it runs `entry` on the stack ending at
    /// `stack_top`.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the one-past-the-end address of writable memory
    /// large enough for `entry` to run on.
    unsafe fn prepare(
        ctx: &mut Self::SavedContext,
        stack_top: *mut u8,
        entry: unsafe extern "C" fn() -> !,
    );
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::X86_64Arch as DefaultArch;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::Aarch64Arch as DefaultArch;

// Compile error for unsupported configurations
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("preemptive-uthreads supports x86_64 and aarch64 only");

#[cfg(not(unix))]
compile_error!("preemptive-uthreads needs POSIX signals and setitimer");

/// Round an address down to the 16-byte alignment both supported ABIs
/// require at call boundaries.
#[inline]
pub(crate) fn align_down_16(addr: usize) -> usize {
    addr & !0xF
}
