//! Fixed-size thread stacks.
//!
//! A [`Stack`] owns one heap block for the lifetime of its thread control
//! block and frees it on drop. With the `stack-canary` feature a known word
//! is kept at the lowest address so an overflow can be noticed when the
//! thread is destroyed.

use std::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

/// Alignment of every stack allocation.
const STACK_ALIGN: usize = 4096;

/// Value written at the low end of each stack.
pub const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Stack size classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSizeClass {
    /// Small stack: 16 KiB
    Small = 16384,
    /// Medium stack: 64 KiB
    Medium = 65536,
    /// Large stack: 256 KiB
    Large = 262144,
}

impl StackSizeClass {
    /// Get the size in bytes for this stack class.
    pub fn size(self) -> usize {
        self as usize
    }
}

impl Default for StackSizeClass {
    fn default() -> Self {
        Self::Medium
    }
}

/// Memory a spawned thread runs on. Grows down from [`Stack::top`].
pub struct Stack {
    /// Lowest address of the block
    memory: NonNull<u8>,
    size_class: StackSizeClass,
}

impl Stack {
    /// Allocate a stack of the given class, or `None` if the allocator is out
    /// of memory.
    pub fn allocate(size_class: StackSizeClass) -> Option<Self> {
        let layout = Layout::from_size_align(size_class.size(), STACK_ALIGN).ok()?;
        let memory = NonNull::new(unsafe { alloc(layout) })?;

        let stack = Self { memory, size_class };
        #[cfg(feature = "stack-canary")]
        stack.install_canary(STACK_CANARY);
        Some(stack)
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size_class.size()
    }

    pub fn size_class(&self) -> StackSizeClass {
        self.size_class
    }

    /// One past the highest usable address; the initial stack pointer is
    /// derived from this.
    pub fn top(&self) -> *mut u8 {
        unsafe { self.memory.as_ptr().add(self.size()) }
    }

    /// Lowest address of the stack.
    pub fn base(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    /// Write `canary` at the lowest address of the stack.
    pub fn install_canary(&self, canary: u64) {
        let canary_location = self.memory.as_ptr() as *mut u64;
        unsafe {
            canary_location.write(canary);
        }
    }

    /// `true` if the canary is intact, `false` if it has been overwritten.
    pub fn check_canary(&self, expected_canary: u64) -> bool {
        let canary_location = self.memory.as_ptr() as *const u64;
        unsafe { canary_location.read() == expected_canary }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::from_size_align(self.size(), STACK_ALIGN) {
            unsafe {
                dealloc(self.memory.as_ptr(), layout);
            }
        }
    }
}

// The block is only ever touched by the thread running on it, or by the
// scheduler while that thread is suspended.
unsafe impl Send for Stack {}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("base", &self.base())
            .field("size", &self.size())
            .finish()
    }
}
