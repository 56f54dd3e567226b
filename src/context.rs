//! Low-level context switching primitives.
//!
//! This module is the only place thread code touches raw register state:
//! - `Context`: CPU register state of a thread that is not running
//! - `switch`: Save the running state into one context and resume another
//! - `stack_top`: Where a fresh thread's stack begins inside its buffer

pub use crate::arch::Context;
use crate::config::STACK_ALIGN;

/// Top of a stack buffer, in the form `Context::new` expects.
///
/// Stacks grow downward, so this is the highest aligned address of the
/// buffer, minus one aligned slot for the terminating frame record.
///
/// Panics if the buffer cannot hold that slot.
pub fn stack_top(stack: &mut [u8]) -> usize {
    assert!(
        stack.len() >= 2 * STACK_ALIGN,
        "stack buffer of {} bytes is too small",
        stack.len()
    );
    let end = stack.as_mut_ptr() as usize + stack.len();
    (end & !(STACK_ALIGN - 1)) - STACK_ALIGN
}

/// Save the running register state into `save_into` and resume `load_from`.
///
/// Returns only once some later switch loads `save_into` again. If that never
/// happens, this call never returns.
///
/// # Safety
/// `save_into` must be valid for writes. `load_from` must hold either a
/// context built by `Context::new` over a stack that is still alive, or one
/// saved by an earlier `switch` whose stack is still alive and has not been
/// resumed since. Until `save_into` is loaded again, only another `switch`
/// may read or write it.
pub unsafe fn switch(save_into: *mut Context, load_from: *const Context) {
    unsafe { crate::arch::context_switch(save_into, load_from) }
}
