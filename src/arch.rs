//! Architecture-specific register save/restore.
//!
//! Each backend provides the same `Context` record and `context_switch`
//! entry point for its calling convention.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("uthread only supports x86_64 and aarch64");
