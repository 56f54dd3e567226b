//! The thread table and the round-robin policy over it.
//!
//! `Scheduler` owns every slot and knows which one is running. It decides
//! what to switch to but never switches itself; that is left to the
//! per-thread runtime, which owns the one `Scheduler` green threads run on.

use crate::config::MAX_THREAD;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::runtime::thread_entry;
use crate::thread::{Entry, Thread, ThreadId, ThreadState};

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Keep running the current thread.
    Continue,
    /// Save `from` and resume `to`. Table state is already updated.
    Switch { from: ThreadId, to: ThreadId },
}

/// Fixed pool of thread slots plus the index of the running one.
pub struct Scheduler {
    threads: Box<[Thread; MAX_THREAD]>,
    current: ThreadId,
    initialized: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// A table with every slot free. Call `init` before anything else.
    pub fn new() -> Self {
        Scheduler {
            threads: Box::new(std::array::from_fn(|_| Thread::new())),
            current: ThreadId(0),
            initialized: false,
        }
    }

    /// Make the caller slot 0, running, and free every other slot.
    pub fn init(&mut self) {
        for thread in self.threads.iter_mut() {
            thread.release();
        }
        self.threads[0].adopt_caller();
        self.current = ThreadId(0);
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Install `f` in the first free slot, in index order.
    ///
    /// The slot becomes runnable; `f` runs the first time the round robin
    /// reaches it, and the thread terminates when `f` returns.
    pub fn create<F>(&mut self, f: F) -> Result<ThreadId>
    where
        F: FnOnce() + 'static,
    {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let (index, slot) = self
            .threads
            .iter_mut()
            .enumerate()
            .find(|(_, t)| t.state() == ThreadState::Free)
            .ok_or(Error::PoolExhausted)?;

        slot.install(Box::new(f), thread_entry as *const () as usize);

        let id = ThreadId(index);
        log::debug!("created thread {}", id);
        Ok(id)
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.threads.get(id.0).map(Thread::state)
    }

    /// State of every slot, in index order.
    pub fn states(&self) -> Vec<ThreadState> {
        self.threads.iter().map(Thread::state).collect()
    }

    /// The thread the round robin would run next, if any is runnable.
    ///
    /// Slots are scanned from the one after the current thread, wrapping
    /// around, with the current thread itself visited last.
    pub fn pick_next(&self) -> Option<ThreadId> {
        self.scan(ThreadState::Runnable, MAX_THREAD)
    }

    /// First slot in `state` within `steps` slots after the current one.
    fn scan(&self, state: ThreadState, steps: usize) -> Option<ThreadId> {
        (1..=steps)
            .map(|step| (self.current.0 + step) % MAX_THREAD)
            .find(|&index| self.threads[index].state() == state)
            .map(ThreadId)
    }

    pub(crate) fn set_current_state(&mut self, state: ThreadState) {
        self.threads[self.current.0].set_state(state);
    }

    /// Decide what runs next and update the table to match.
    ///
    /// When nothing is runnable, a waiting thread other than the caller is
    /// resumed instead. An outgoing thread that is still `Running` becomes
    /// `Waiting`.
    pub(crate) fn decide(&mut self) -> Result<Decision> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let from = self.current;
        let to = match self.pick_next() {
            Some(next) if next == from => {
                self.threads[from.0].set_state(ThreadState::Running);
                return Ok(Decision::Continue);
            }
            Some(next) => next,
            None => self
                .scan(ThreadState::Waiting, MAX_THREAD - 1)
                .ok_or(Error::NoRunnableThread)?,
        };

        if self.threads[from.0].state() == ThreadState::Running {
            self.threads[from.0].set_state(ThreadState::Waiting);
        }
        self.threads[to.0].set_state(ThreadState::Running);
        self.current = to;

        Ok(Decision::Switch { from, to })
    }

    /// Pointers to the save and load contexts of a switch.
    ///
    /// Raw because the two contexts live in the same table and the switch
    /// needs one mutably and the other shared at the same time.
    pub(crate) fn contexts(&mut self, from: ThreadId, to: ThreadId) -> (*mut Context, *const Context) {
        debug_assert_ne!(from, to);
        let base = self.threads.as_mut_ptr();
        unsafe {
            (
                &raw mut (*base.add(from.0)).context,
                &raw const (*base.add(to.0)).context,
            )
        }
    }

    pub(crate) fn take_entry(&mut self, id: ThreadId) -> Option<Entry> {
        self.threads[id.0].take_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use ThreadState::*;

    fn running_count(sched: &Scheduler) -> usize {
        sched.states().iter().filter(|&&s| s == Running).count()
    }

    /// A table with slot 0 initialized and `n` threads created.
    fn table_with(n: usize) -> Scheduler {
        let mut sched = Scheduler::new();
        sched.init();
        for _ in 0..n {
            sched.create(|| {}).unwrap();
        }
        sched
    }

    #[test]
    fn new_table_refuses_work_until_init() {
        let mut sched = Scheduler::new();
        assert!(!sched.is_initialized());
        assert_eq!(sched.states(), vec![Free; MAX_THREAD]);
        assert_eq!(sched.create(|| {}), Err(Error::NotInitialized));
        assert_eq!(sched.decide(), Err(Error::NotInitialized));
    }

    #[test]
    fn init_adopts_caller_as_slot_zero() {
        let sched = table_with(0);
        assert_eq!(sched.current(), ThreadId(0));
        assert_eq!(sched.state(ThreadId(0)), Some(Running));
        assert_eq!(running_count(&sched), 1);
        assert_eq!(sched.state(ThreadId(MAX_THREAD)), None);
    }

    #[test]
    fn create_fills_free_slots_in_index_order() {
        let mut sched = table_with(0);
        let ids: Vec<_> = (1..MAX_THREAD).map(|_| sched.create(|| {}).unwrap()).collect();
        assert_eq!(ids, (1..MAX_THREAD).map(ThreadId).collect::<Vec<_>>());
        assert_eq!(sched.states(), vec![Running, Runnable, Runnable, Runnable]);
    }

    #[test]
    fn create_past_capacity_leaves_table_unchanged() {
        let mut sched = table_with(MAX_THREAD - 1);
        let states = sched.states();
        let resume: Vec<_> = sched.threads.iter().map(|t| t.context.resume_address()).collect();

        let dropped = Rc::new(Cell::new(false));
        let guard = DropFlag(dropped.clone());
        let result = sched.create(move || drop(guard));

        assert_eq!(result, Err(Error::PoolExhausted));
        assert!(dropped.get(), "rejected entry is dropped, not kept");
        assert_eq!(sched.states(), states);
        let after: Vec<_> = sched.threads.iter().map(|t| t.context.resume_address()).collect();
        assert_eq!(after, resume);
    }

    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn pick_next_scans_circularly_after_current() {
        let mut sched = table_with(3);

        sched.current = ThreadId(2);
        assert_eq!(sched.pick_next(), Some(ThreadId(3)));

        sched.current = ThreadId(3);
        assert_eq!(sched.pick_next(), Some(ThreadId(1)), "slot 0 is running, not runnable");

        sched.threads[1].set_state(Running);
        sched.threads[1].set_state(Free);
        sched.threads[3].set_state(Running);
        sched.threads[3].set_state(Free);
        assert_eq!(sched.pick_next(), Some(ThreadId(2)));

        sched.threads[2].set_state(Running);
        sched.threads[2].set_state(Free);
        assert_eq!(sched.pick_next(), None);
    }

    #[test]
    fn yields_rotate_in_ascending_order_skipping_slot_zero() {
        let mut sched = table_with(3);
        let mut order = Vec::new();

        // Slot 0 hands off once and never runs again while others can.
        assert_eq!(
            sched.decide(),
            Ok(Decision::Switch { from: ThreadId(0), to: ThreadId(1) })
        );
        order.push(sched.current().index());
        for _ in 0..6 {
            sched.set_current_state(Runnable);
            let decision = sched.decide().unwrap();
            assert!(matches!(decision, Decision::Switch { .. }));
            assert_eq!(running_count(&sched), 1);
            order.push(sched.current().index());
        }

        assert_eq!(order, vec![1, 2, 3, 1, 2, 3, 1]);
        assert_eq!(sched.state(ThreadId(0)), Some(Waiting));
    }

    #[test]
    fn lone_yielder_keeps_running() {
        let mut sched = table_with(1);
        sched.decide().unwrap();
        assert_eq!(sched.current(), ThreadId(1));

        sched.set_current_state(Runnable);
        assert_eq!(sched.decide(), Ok(Decision::Continue));
        assert_eq!(sched.state(ThreadId(1)), Some(Running));
        assert_eq!(running_count(&sched), 1);
    }

    #[test]
    fn draining_resumes_waiter_then_reports_no_runnable_thread() {
        let mut sched = table_with(2);
        sched.decide().unwrap();

        // Thread 1 exits, thread 2 runs.
        sched.set_current_state(Free);
        assert_eq!(
            sched.decide(),
            Ok(Decision::Switch { from: ThreadId(1), to: ThreadId(2) })
        );

        // Thread 2 exits: nothing runnable, so slot 0 wakes up.
        sched.set_current_state(Free);
        assert_eq!(
            sched.decide(),
            Ok(Decision::Switch { from: ThreadId(2), to: ThreadId(0) })
        );
        assert_eq!(sched.states(), vec![Running, Free, Free, Free]);

        // Scheduling again has nothing to offer.
        assert_eq!(sched.decide(), Err(Error::NoRunnableThread));
        assert_eq!(sched.current(), ThreadId(0));
        assert_eq!(sched.state(ThreadId(0)), Some(Running));
    }

    #[test]
    fn last_thread_exiting_without_waiter_has_nowhere_to_go() {
        let mut sched = table_with(0);
        sched.set_current_state(Free);
        assert_eq!(sched.decide(), Err(Error::NoRunnableThread));
    }

    #[test]
    fn freed_slot_is_reused_with_fresh_state() {
        let mut sched = table_with(2);
        sched.decide().unwrap();
        sched.set_current_state(Free);
        sched.decide().unwrap();
        assert_eq!(sched.current(), ThreadId(2));

        // Leave junk behind in the freed slot.
        let _ = sched.take_entry(ThreadId(1));
        sched.threads[1].context = Context::default();

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let id = sched.create(move || flag.set(true)).unwrap();

        assert_eq!(id, ThreadId(1));
        assert_eq!(sched.state(id), Some(Runnable));
        let thread = &sched.threads[1];
        assert_eq!(thread.context.resume_address(), thread_entry as *const () as usize);
        assert!(thread.stack_range().contains(&thread.context.stack_pointer()));

        sched.take_entry(id).expect("new entry installed")();
        assert!(ran.get());
    }

    #[test]
    fn init_discards_previous_threads() {
        let mut sched = table_with(3);
        sched.decide().unwrap();
        sched.init();
        assert_eq!(sched.states(), vec![Running, Free, Free, Free]);
        assert_eq!(sched.current(), ThreadId(0));
        assert!(!sched.threads[1].has_entry());
    }
}
