//! Cooperative user-level threads over a fixed pool.
//!
//! A small number of threads share one OS thread and hand the CPU to each
//! other explicitly with [`thread_yield`]. Nothing is preempted: a thread
//! runs until it yields or returns, and the next runnable thread is picked
//! in strict round-robin slot order.
//!
//! - [`context`]: register save/restore over a per-architecture backend
//! - [`scheduler`]: the thread table and the round-robin policy
//! - the `thread_*` functions: the pool of the calling OS thread

mod arch;
pub mod config;
pub mod context;
mod error;
mod runtime;
pub mod scheduler;
mod thread;

pub use config::{MAX_THREAD, STACK_SIZE};
pub use error::{Error, Result};
pub use runtime::{
    current_thread, thread_create, thread_exit, thread_init, thread_schedule, thread_state,
    thread_states, thread_yield, try_schedule,
};
pub use scheduler::Scheduler;
pub use thread::{ThreadId, ThreadState};
