use std::fmt;

use crate::config::MAX_THREAD;

/// Errors reported by the thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `create` found no free slot in the table.
    PoolExhausted,
    /// The scheduler found neither a runnable nor a waiting thread to resume.
    NoRunnableThread,
    /// The pool was used before `thread_init`.
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolExhausted => write!(f, "all {} thread slots are in use", MAX_THREAD),
            Error::NoRunnableThread => write!(f, "no runnable threads"),
            Error::NotInitialized => write!(f, "thread_init has not been called"),
        }
    }
}

impl std::error::Error for Error {}
