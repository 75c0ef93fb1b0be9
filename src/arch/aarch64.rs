//! AArch64 (AAPCS64) context capture and resume.

use super::{align_down_16, Arch};
use core::arch::asm;

/// Callee-saved state of a suspended thread.
///
/// Field offsets are hard-coded in the assembly below.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Aarch64Context {
    pub sp: u64,
    pub pc: u64,
    /// x19-x28
    pub x: [u64; 10],
    /// Frame pointer
    pub x29: u64,
    /// Link register
    pub x30: u64,
    /// Low halves of v8-v15
    pub d: [u64; 8],
}

pub struct Aarch64Arch;

impl Arch for Aarch64Arch {
    type SavedContext = Aarch64Context;

    unsafe fn capture(
        ctx: *mut Self::SavedContext,
        on_capture: unsafe extern "C" fn(*mut u8) -> !,
        arg: *mut u8,
    ) {
        // x19-x29 and d8-d15 come back with the values they had on entry,
        // so only the caller-saved set is reported as clobbered.
        unsafe {
            asm!(
                "adr x9, 2f",
                "mov x10, sp",
                "stp x10, x9, [x0, #0]",
                "stp x19, x20, [x0, #16]",
                "stp x21, x22, [x0, #32]",
                "stp x23, x24, [x0, #48]",
                "stp x25, x26, [x0, #64]",
                "stp x27, x28, [x0, #80]",
                "stp x29, x30, [x0, #96]",
                "stp d8, d9, [x0, #112]",
                "stp d10, d11, [x0, #128]",
                "stp d12, d13, [x0, #144]",
                "stp d14, d15, [x0, #160]",
                "mov x0, x1",
                "blr x2",
                "brk #0x1",
                "2:",
                in("x0") ctx,
                in("x1") arg,
                in("x2") on_capture,
                clobber_abi("C"),
            );
        }
    }

    unsafe fn resume(ctx: *const Self::SavedContext) -> ! {
        unsafe {
            asm!(
                "ldp x10, x9, [x0, #0]",
                "mov sp, x10",
                "ldp x19, x20, [x0, #16]",
                "ldp x21, x22, [x0, #32]",
                "ldp x23, x24, [x0, #48]",
                "ldp x25, x26, [x0, #64]",
                "ldp x27, x28, [x0, #80]",
                "ldp x29, x30, [x0, #96]",
                "ldp d8, d9, [x0, #112]",
                "ldp d10, d11, [x0, #128]",
                "ldp d12, d13, [x0, #144]",
                "ldp d14, d15, [x0, #160]",
                "br x9",
                in("x0") ctx,
                options(noreturn),
            );
        }
    }

    unsafe fn prepare(
        ctx: &mut Self::SavedContext,
        stack_top: *mut u8,
        entry: unsafe extern "C" fn() -> !,
    ) {
        // The entry shim never returns, so a null frame pointer and link
        // register terminate any backtrace cleanly.
        *ctx = Aarch64Context::default();
        ctx.sp = align_down_16(stack_top as usize) as u64;
        ctx.pc = entry as usize as u64;
    }
}
