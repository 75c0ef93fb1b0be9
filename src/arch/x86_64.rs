//! x86_64 (System V) context capture and resume.

use super::{align_down_16, Arch};
use core::arch::asm;

/// Callee-saved state of a suspended thread.
///
/// Field offsets are hard-coded in the assembly below.
#[repr(C)]
#[derive(Debug)]
pub struct X86_64Context {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    /// SSE control/status; the control bits are callee-saved
    pub mxcsr: u32,
    /// x87 control word; callee-saved
    pub fpu_cw: u16,
    _pad: u16,
}

impl Default for X86_64Context {
    fn default() -> Self {
        Self {
            rsp: 0,
            rip: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            mxcsr: 0x1F80,
            fpu_cw: 0x037F,
            _pad: 0,
        }
    }
}

pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type SavedContext = X86_64Context;

    unsafe fn capture(
        ctx: *mut Self::SavedContext,
        on_capture: unsafe extern "C" fn(*mut u8) -> !,
        arg: *mut u8,
    ) {
        // rbx, rbp and r12-r15 come back with the values they had on entry,
        // so only the caller-saved set is reported as clobbered.
        unsafe {
            asm!(
                "lea rax, [rip + 2f]",
                "mov [rdi + 0x00], rsp",
                "mov [rdi + 0x08], rax",
                "mov [rdi + 0x10], rbx",
                "mov [rdi + 0x18], rbp",
                "mov [rdi + 0x20], r12",
                "mov [rdi + 0x28], r13",
                "mov [rdi + 0x30], r14",
                "mov [rdi + 0x38], r15",
                "stmxcsr dword ptr [rdi + 0x40]",
                "fnstcw word ptr [rdi + 0x44]",
                "mov rdi, rsi",
                "call rdx",
                "ud2",
                "2:",
                in("rdi") ctx,
                in("rsi") arg,
                in("rdx") on_capture,
                clobber_abi("C"),
            );
        }
    }

    unsafe fn resume(ctx: *const Self::SavedContext) -> ! {
        unsafe {
            asm!(
                "mov rsp, [rdi + 0x00]",
                "mov rbx, [rdi + 0x10]",
                "mov rbp, [rdi + 0x18]",
                "mov r12, [rdi + 0x20]",
                "mov r13, [rdi + 0x28]",
                "mov r14, [rdi + 0x30]",
                "mov r15, [rdi + 0x38]",
                "ldmxcsr dword ptr [rdi + 0x40]",
                "fldcw word ptr [rdi + 0x44]",
                "jmp qword ptr [rdi + 0x08]",
                in("rdi") ctx,
                options(noreturn),
            );
        }
    }

    unsafe fn prepare(
        ctx: &mut Self::SavedContext,
        stack_top: *mut u8,
        entry: unsafe extern "C" fn() -> !,
    ) {
        // A function expects rsp + 8 to be 16-aligned on entry, as if a call
        // had just pushed its return address. Push a null one.
        let sp = align_down_16(stack_top as usize) - 8;
        unsafe {
            (sp as *mut u64).write(0);
        }

        *ctx = X86_64Context::default();
        ctx.rsp = sp as u64;
        ctx.rip = entry as usize as u64;
    }
}
