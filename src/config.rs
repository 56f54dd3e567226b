//! Compile-time configuration of the thread pool.

use static_assertions::const_assert;

/// Number of slots in the thread table, slot 0 included.
pub const MAX_THREAD: usize = 4;

/// 32KiB of stack for every thread.
pub const STACK_SIZE: usize = 32 * 1024;

/// Alignment the ABI requires of a stack pointer at a call boundary.
pub const STACK_ALIGN: usize = 16;

const_assert!(MAX_THREAD >= 2);
const_assert!(STACK_SIZE % STACK_ALIGN == 0);
const_assert!(STACK_SIZE >= 4 * 1024);
