use crate::merged::Gate;
use crate::status::{DequeError, End, Peek, Pop, Status, Wait};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Storage behind a simple deque. Shared by every handle that was copied
/// from the same original, and watched by any merged view built on it.
pub(crate) struct Core<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    watchers: Mutex<Vec<Weak<Gate>>>,
    handles: AtomicUsize,
}

pub(crate) struct State<T> {
    pub(crate) items: VecDeque<T>,
    unblocked: bool,
    pub(crate) destroyed: bool,
}

impl<T> State<T> {
    fn take(&mut self, end: End) -> Option<T> {
        match end {
            End::Front => self.items.pop_front(),
            End::Back => self.items.pop_back(),
        }
    }
}

impl<T> Core<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                unblocked: false,
                destroyed: false,
            }),
            ready: Condvar::new(),
            watchers: Mutex::new(Vec::new()),
            handles: AtomicUsize::new(1),
        })
    }

    pub(crate) fn add_handle(&self) {
        self.handles.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one handle reference, tearing down the storage when it was
    /// the last one.
    pub(crate) fn release(&self) {
        if self.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            let drained = {
                let mut state = self.state.lock();
                state.destroyed = true;
                std::mem::take(&mut state.items)
            };
            self.notify();
            drop(drained);
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock()
    }

    pub(crate) fn watch(&self, gate: &Arc<Gate>) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| w.strong_count() > 0);
        watchers.push(Arc::downgrade(gate));
    }

    /// Wakes local waiters and every merged view that includes this deque.
    /// Must be called without holding the state lock.
    pub(crate) fn notify(&self) {
        self.ready.notify_all();
        let gates: Vec<Arc<Gate>> = self
            .watchers
            .lock()
            .iter()
            .filter_map(|w| w.upgrade())
            .collect();
        for gate in gates {
            gate.wake();
        }
    }

    pub(crate) fn pop(&self, end: End, wait: Wait) -> Pop<T> {
        let mut state = self.state.lock();
        let mut expired = false;
        loop {
            if state.destroyed {
                return Pop::Destroyed;
            }
            if let Some(item) = state.take(end) {
                return Pop::Item(item);
            }
            match wait {
                Wait::Never => return Pop::Empty,
                _ if state.unblocked => return Pop::Unblocked,
                _ if expired => return Pop::TimedOut,
                Wait::Forever => self.ready.wait(&mut state),
                Wait::Until(deadline) => {
                    expired = self.ready.wait_until(&mut state, deadline).timed_out();
                }
            }
        }
    }

    /// Non-blocking removal that ignores the blocked/unblocked mode. Used by
    /// merged views, which keep their own mode.
    pub(crate) fn take(&self, end: End) -> Option<T> {
        let mut state = self.state.lock();
        if state.destroyed {
            return None;
        }
        state.take(end)
    }

    pub(crate) fn push(&self, end: End, item: T) -> Result<(), DequeError> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(DequeError::Inconsistent);
            }
            state.items.try_reserve(1).map_err(|_| DequeError::Alloc)?;
            match end {
                End::Front => state.items.push_front(item),
                End::Back => state.items.push_back(item),
            }
        }
        self.notify();
        Ok(())
    }

    pub(crate) fn peek(&self, end: End) -> Peek<T>
    where
        T: Clone,
    {
        let state = self.state.lock();
        if state.destroyed {
            return Peek::Destroyed;
        }
        let item = match end {
            End::Front => state.items.front(),
            End::Back => state.items.back(),
        };
        match item {
            Some(item) => Peek::Item(item.clone()),
            None => Peek::Empty,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn status(&self) -> Status {
        let state = self.state.lock();
        if state.destroyed {
            Status::Inconsistent
        } else if state.items.is_empty() {
            Status::Empty
        } else {
            Status::Ok
        }
    }

    pub(crate) fn set_unblocked(&self, unblocked: bool) -> Result<(), DequeError> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(DequeError::Inconsistent);
            }
            state.unblocked = unblocked;
        }
        if unblocked {
            self.notify();
        }
        Ok(())
    }
}
