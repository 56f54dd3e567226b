//! The per-OS-thread pool and its lifecycle functions.
//!
//! Every OS thread that calls [`thread_init`] gets its own [`Scheduler`],
//! and the caller becomes thread 0 of that pool. Green threads never leave
//! the OS thread that created them.
//!
//! # Example
//!
//! ```no_run
//! use uthread::{thread_create, thread_init, thread_schedule, thread_yield};
//!
//! thread_init();
//!
//! thread_create(|| {
//!     println!("Thread 1");
//!     thread_yield();
//!     println!("Thread 1 done");
//! })
//! .unwrap();
//!
//! thread_create(|| {
//!     println!("Thread 2");
//! })
//! .unwrap();
//!
//! // Runs both threads, returns once they have finished.
//! thread_schedule();
//! ```

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::process;

use crate::config::MAX_THREAD;
use crate::context;
use crate::error::{Error, Result};
use crate::scheduler::{Decision, Scheduler};
use crate::thread::{ThreadId, ThreadState};

thread_local! {
    static RUNTIME: UnsafeCell<Option<Scheduler>> = const { UnsafeCell::new(None) };
}

/// Get a raw pointer to the runtime (unsafe, but avoids RefCell borrow issues during context switch)
fn runtime() -> *mut Option<Scheduler> {
    RUNTIME.with(|rt| rt.get())
}

/// The scheduler of this OS thread, if `thread_init` has run on it.
///
/// # Safety
/// The returned reference must not be held across a context switch.
unsafe fn scheduler<'a>() -> Option<&'a mut Scheduler> {
    unsafe { (*runtime()).as_mut() }
}

/// Make the calling code thread 0 of a fresh pool.
///
/// Must run before any other function in this module. Calling it again
/// from thread 0 discards every thread of the previous pool.
///
/// Panics if called from any thread other than thread 0.
pub fn thread_init() {
    unsafe {
        let rt = runtime();
        if let Some(sched) = (*rt).as_ref()
            && sched.current() != ThreadId(0)
        {
            panic!(
                "thread_init called from thread {}, only thread 0 may reinitialize",
                sched.current()
            );
        }

        let mut sched = Scheduler::new();
        sched.init();
        *rt = Some(sched);
    }
    log::debug!("thread pool initialized with {} slots", MAX_THREAD);
}

/// Create a new thread running `f`.
///
/// The thread is runnable right away and starts the next time the round
/// robin reaches its slot. It terminates when `f` returns.
pub fn thread_create<F>(f: F) -> Result<ThreadId>
where
    F: FnOnce() + 'static,
{
    match unsafe { scheduler() } {
        Some(sched) => sched.create(f),
        None => Err(Error::NotInitialized),
    }
}

/// Yield execution to the next runnable thread.
///
/// Returns once the round robin comes back to the caller; immediately if no
/// other thread is runnable. Does nothing before `thread_init`.
pub fn thread_yield() {
    match unsafe { scheduler() } {
        Some(sched) => sched.set_current_state(ThreadState::Runnable),
        None => return,
    }
    thread_schedule();
}

/// Make one scheduling decision, terminating the process if it fails.
///
/// Called by a thread that is still running, this suspends the caller until
/// no other thread is runnable. That is how thread 0 runs the pool to
/// completion.
pub fn thread_schedule() {
    if let Err(err) = try_schedule() {
        fatal(err);
    }
}

/// Make one scheduling decision and switch if it picks another thread.
///
/// Fails with `NoRunnableThread` when there is nothing to run and nothing
/// waiting, leaving the table as it was.
pub fn try_schedule() -> Result<()> {
    let sched = unsafe { scheduler() }.ok_or(Error::NotInitialized)?;

    match sched.decide()? {
        Decision::Continue => Ok(()),
        Decision::Switch { from, to } => {
            log::trace!("switch {} -> {}", from, to);
            let (save_into, load_from) = sched.contexts(from, to);

            // Note: execution continues in `to`. We are back here once some
            // later switch targets `from` again.
            unsafe { context::switch(save_into, load_from) };
            Ok(())
        }
    }
}

/// Terminate the calling thread and free its slot.
pub fn thread_exit() -> ! {
    match unsafe { scheduler() } {
        Some(sched) => {
            log::debug!("thread {} exiting", sched.current());
            sched.set_current_state(ThreadState::Free);
        }
        None => fatal(Error::NotInitialized),
    }

    match try_schedule() {
        Ok(()) => unreachable!("a terminated thread was resumed"),
        Err(err) => fatal(err),
    }
}

/// The thread currently executing on this OS thread's pool.
pub fn current_thread() -> Option<ThreadId> {
    let sched = unsafe { scheduler() };
    sched.map(|sched| sched.current())
}

pub fn thread_state(id: ThreadId) -> Option<ThreadState> {
    let sched = unsafe { scheduler() };
    sched.and_then(|sched| sched.state(id))
}

/// State of every slot, empty before `thread_init`.
pub fn thread_states() -> Vec<ThreadState> {
    let sched = unsafe { scheduler() };
    sched.map(|sched| sched.states()).unwrap_or_default()
}

/// Entry point for new threads
///
/// Every freshly created context resumes here, on its own stack. The
/// scheduler has already made the new thread current.
pub(crate) extern "C" fn thread_entry() -> ! {
    let (id, entry) = match unsafe { scheduler() } {
        Some(sched) => {
            let id = sched.current();
            (id, sched.take_entry(id))
        }
        None => fatal(Error::NotInitialized),
    };

    // A panic cannot unwind past the context switch that started us.
    if let Some(entry) = entry
        && panic::catch_unwind(AssertUnwindSafe(entry)).is_err()
    {
        log::error!("thread {} panicked, aborting", id);
        process::abort();
    }

    thread_exit()
}

/// Report an unrecoverable scheduling error and terminate the process.
fn fatal(err: Error) -> ! {
    if log::log_enabled!(log::Level::Error) {
        log::error!("thread_schedule: {}", err);
    } else {
        eprintln!("thread_schedule: {}", err);
    }
    process::exit(1)
}
