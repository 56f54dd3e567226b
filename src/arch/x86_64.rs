//! x86_64 implementation of context switching

use std::arch::naked_asm;
use std::mem::offset_of;

use static_assertions::const_assert_eq;

/// Saved CPU context for context switching
///
/// On x86_64 System V ABI, these are the callee-saved registers
/// that must be preserved across function calls, plus the address
/// execution resumes at.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Stack pointer
    rsp: u64,
    /// Frame pointer
    rbp: u64,
    /// General purpose (callee-saved)
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    /// Resume address
    rip: u64,
}

const_assert_eq!(offset_of!(Context, rsp), 0x00);
const_assert_eq!(offset_of!(Context, rbp), 0x08);
const_assert_eq!(offset_of!(Context, rbx), 0x10);
const_assert_eq!(offset_of!(Context, r15), 0x30);
const_assert_eq!(offset_of!(Context, rip), 0x38);

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
        // System V ABI expects RSP to be 16n+8 on function entry (the `call`
        // has just pushed a return address). We enter with a `jmp`, so the
        // slot below stack_top plays the return address. It is null: the
        // entry function must never return.
        //
        //   stack_top + 8:  0 (end of frame chain)
        //   stack_top:      0 (saved frame pointer)
        //   stack_top - 8:  0 (return address) <- RSP
        let initial_rsp = stack_top - 8;

        unsafe {
            std::ptr::write(initial_rsp as *mut u64, 0);
            std::ptr::write(stack_top as *mut u64, 0);
            std::ptr::write((stack_top + 8) as *mut u64, 0);
        }

        Context {
            rsp: initial_rsp as u64,
            rbp: stack_top as u64,
            rip: entry as u64,
            ..Default::default()
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }

    pub fn frame_pointer(&self) -> usize {
        self.rbp as usize
    }

    pub fn resume_address(&self) -> usize {
        self.rip as usize
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
    naked_asm!(
        // The return address pushed by our caller becomes the resume address,
        // and the caller's RSP after returning becomes the saved RSP.
        "mov rax, [rsp]",
        "lea rdx, [rsp + 8]",
        // Save callee-saved registers to old context (rdi)
        "mov [rdi + 0x00], rdx",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "mov [rdi + 0x38], rax",
        // Load callee-saved registers from new context (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // For a fresh thread: jumps to the entry trampoline
        // For a suspended thread: lands right after its own context_switch call
        "jmp qword ptr [rsi + 0x38]",
    );
}
