//! Thread descriptors and their state machine.

use std::fmt;
#[cfg(test)]
use std::ops::Range;

use crate::config::STACK_SIZE;
use crate::context::{self, Context};

/// Identity of a thread: the index of its slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// The id of slot `index`. Ids past the table size name no thread.
    pub const fn from_index(index: usize) -> Self {
        ThreadId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a thread slot.
///
/// Besides the usual free/runnable/running cycle there is `Waiting`: a
/// thread that hands the CPU to the pool without giving up its turn for
/// good (thread 0 after `thread_schedule`) is parked there and only resumed
/// once nothing else is runnable. That is how thread 0 gets control back
/// after the pool drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Slot holds no thread and may be handed out by `create`.
    Free,
    /// Ready to run, waiting for its turn in the round robin.
    Runnable,
    /// Currently executing. Exactly one slot is in this state.
    Running,
    /// Suspended until no thread is runnable, then resumed.
    Waiting,
}

impl ThreadState {
    /// Whether a slot may move from `self` to `next`.
    ///
    /// Slot 0 is the one exception: `init` makes it `Running` directly.
    pub fn can_become(self, next: ThreadState) -> bool {
        use ThreadState::*;
        matches!(
            (self, next),
            (Free, Runnable)
                | (Runnable, Running)
                | (Running, Runnable)
                | (Running, Free)
                | (Running, Waiting)
                | (Waiting, Running)
        )
    }
}

/// Entry closure of a thread that has not started yet.
pub(crate) type Entry = Box<dyn FnOnce() + 'static>;

/// A slot in the thread table
pub(crate) struct Thread {
    /// Heap allocated so it never moves, even if the table does.
    stack: Box<[u8]>,
    state: ThreadState,
    pub(crate) context: Context,
    entry: Option<Entry>,
}

impl Thread {
    pub(crate) fn new() -> Self {
        Thread {
            stack: vec![0u8; STACK_SIZE].into_boxed_slice(),
            state: ThreadState::Free,
            context: Context::default(),
            entry: None,
        }
    }

    pub(crate) fn state(&self) -> ThreadState {
        self.state
    }

    pub(crate) fn set_state(&mut self, next: ThreadState) {
        debug_assert!(
            self.state.can_become(next),
            "illegal thread state transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Claim this slot for the code that is already executing.
    ///
    /// Its context is filled in by the first switch away from it and its
    /// stack buffer goes unused.
    pub(crate) fn adopt_caller(&mut self) {
        self.entry = None;
        self.context = Context::default();
        self.state = ThreadState::Running;
    }

    /// Give the slot back without running anything on it.
    pub(crate) fn release(&mut self) {
        self.entry = None;
        self.state = ThreadState::Free;
    }

    /// Prepare a free slot to start running `entry` through `trampoline`.
    pub(crate) fn install(&mut self, entry: Entry, trampoline: usize) {
        let stack_top = context::stack_top(&mut self.stack);
        // SAFETY: stack_top lies inside self.stack with 16 bytes above it,
        // and the boxed stack outlives the context stored next to it.
        self.context = unsafe { Context::new(stack_top, trampoline) };
        self.entry = Some(entry);
        self.set_state(ThreadState::Runnable);
    }

    pub(crate) fn take_entry(&mut self) -> Option<Entry> {
        self.entry.take()
    }

    #[cfg(test)]
    pub(crate) fn has_entry(&self) -> bool {
        self.entry.is_some()
    }

    #[cfg(test)]
    pub(crate) fn stack_range(&self) -> Range<usize> {
        let base = self.stack.as_ptr() as usize;
        base..base + self.stack.len()
    }
}
