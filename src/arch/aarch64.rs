//! aarch64 implementation of context switching

use std::arch::naked_asm;
use std::mem::offset_of;

use static_assertions::const_assert_eq;

/// Saved CPU context for context switching
///
/// On aarch64 (AAPCS64), these are the callee-saved registers
/// that must be preserved across function calls:
/// - x19-x28: general purpose callee-saved registers
/// - d8-d15: floating-point/SIMD callee-saved registers (lower 64 bits of v8-v15)
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Stack pointer
    sp: u64,
    /// Link register (resume address)
    lr: u64,
    /// Frame pointer
    fp: u64,
    /// General purpose (callee-saved)
    x19: u64,
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    /// Floating-point/SIMD (callee-saved, lower 64 bits)
    d8: u64,
    d9: u64,
    d10: u64,
    d11: u64,
    d12: u64,
    d13: u64,
    d14: u64,
    d15: u64,
}

const_assert_eq!(offset_of!(Context, sp), 0x00);
const_assert_eq!(offset_of!(Context, lr), 0x08);
const_assert_eq!(offset_of!(Context, fp), 0x10);
const_assert_eq!(offset_of!(Context, x28), 0x60);
const_assert_eq!(offset_of!(Context, d15), 0xa0);

impl Context {
    /// Create a context that starts executing `entry` on a fresh stack.
    ///
    /// - `stack_top`: The top of the stack, 16-byte aligned, with at least
    ///   16 writable bytes above it
    /// - `entry`: The entry point function address
    ///
    /// # Safety
    /// `stack_top..stack_top + 16` must be writable memory owned by the
    /// stack this context will run on, and `entry` must be the address of an
    /// `extern "C" fn() -> !`.
    pub unsafe fn new(stack_top: usize, entry: usize) -> Self {
        // `ret` jumps to lr, so nothing has to be pushed. The frame record
        // above stack_top is zeroed to terminate frame-pointer walks.
        unsafe {
            std::ptr::write(stack_top as *mut u64, 0);
            std::ptr::write((stack_top + 8) as *mut u64, 0);
        }

        Context {
            sp: stack_top as u64,
            lr: entry as u64,
            fp: stack_top as u64,
            ..Default::default()
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }

    pub fn frame_pointer(&self) -> usize {
        self.fp as usize
    }

    pub fn resume_address(&self) -> usize {
        self.lr as usize
    }
}

/// Switch from one context to another
///
/// Saves the current CPU state into `old` and restores state from `new`.
/// This function returns when another context switches back to `old`.
///
/// # Safety
/// Both pointers must be valid. The `new` context must have been properly
/// initialized (either by a previous `context_switch` or by `Context::new`).
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut Context, _new: *const Context) {
    // Arguments: x0 = old, x1 = new
    naked_asm!(
        // Save callee-saved registers to old context (x0)
        "mov x9, sp",
        "str x9,  [x0, #0x00]", // sp
        "str lr,  [x0, #0x08]", // lr (x30)
        "str fp,  [x0, #0x10]", // fp (x29)
        "str x19, [x0, #0x18]",
        "str x20, [x0, #0x20]",
        "str x21, [x0, #0x28]",
        "str x22, [x0, #0x30]",
        "str x23, [x0, #0x38]",
        "str x24, [x0, #0x40]",
        "str x25, [x0, #0x48]",
        "str x26, [x0, #0x50]",
        "str x27, [x0, #0x58]",
        "str x28, [x0, #0x60]",
        // Save floating-point callee-saved registers
        "str d8,  [x0, #0x68]",
        "str d9,  [x0, #0x70]",
        "str d10, [x0, #0x78]",
        "str d11, [x0, #0x80]",
        "str d12, [x0, #0x88]",
        "str d13, [x0, #0x90]",
        "str d14, [x0, #0x98]",
        "str d15, [x0, #0xa0]",
        // Load callee-saved registers from new context (x1)
        "ldr x9,  [x1, #0x00]", // sp
        "mov sp, x9",
        "ldr lr,  [x1, #0x08]", // lr (x30)
        "ldr fp,  [x1, #0x10]", // fp (x29)
        "ldr x19, [x1, #0x18]",
        "ldr x20, [x1, #0x20]",
        "ldr x21, [x1, #0x28]",
        "ldr x22, [x1, #0x30]",
        "ldr x23, [x1, #0x38]",
        "ldr x24, [x1, #0x40]",
        "ldr x25, [x1, #0x48]",
        "ldr x26, [x1, #0x50]",
        "ldr x27, [x1, #0x58]",
        "ldr x28, [x1, #0x60]",
        // Load floating-point callee-saved registers
        "ldr d8,  [x1, #0x68]",
        "ldr d9,  [x1, #0x70]",
        "ldr d10, [x1, #0x78]",
        "ldr d11, [x1, #0x80]",
        "ldr d12, [x1, #0x88]",
        "ldr d13, [x1, #0x90]",
        "ldr d14, [x1, #0x98]",
        "ldr d15, [x1, #0xa0]",
        // Return to the new context
        "ret",
    );
}
