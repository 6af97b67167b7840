use crate::deque::Deque;
use crate::status::{DequeError, End, Peek, Pop, Status, Wait};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wait point for a merged view. Every simple deque underneath the view
/// wakes the gate after a push, an unblock or a teardown.
pub(crate) struct Gate {
    mode: Mutex<Mode>,
    cond: Condvar,
}

#[derive(Default)]
struct Mode {
    unblocked: bool,
    destroyed: bool,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::default()),
            cond: Condvar::new(),
        })
    }

    /// Taking the mode lock before notifying means a waiter that checked
    /// the sub-deques under that lock cannot miss the wakeup.
    pub(crate) fn wake(&self) {
        let _mode = self.mode.lock();
        self.cond.notify_all();
    }
}

/// A view over `front` followed by `back`. Holds its own handle to each
/// side, so the sides outlive the view's creators.
pub(crate) struct Merged<T> {
    front: Deque<T>,
    back: Deque<T>,
    gate: Arc<Gate>,
    handles: AtomicUsize,
}

impl<T> Merged<T> {
    pub(crate) fn new(front: Deque<T>, back: Deque<T>) -> Arc<Self> {
        let gate = Gate::new();
        let mut leaves = Vec::new();
        front.leaves(&mut leaves);
        back.leaves(&mut leaves);
        for leaf in &leaves {
            leaf.watch(&gate);
        }
        Arc::new(Self {
            front,
            back,
            gate,
            handles: AtomicUsize::new(1),
        })
    }

    pub(crate) fn front(&self) -> &Deque<T> {
        &self.front
    }

    pub(crate) fn back(&self) -> &Deque<T> {
        &self.back
    }

    fn sides(&self, end: End) -> (&Deque<T>, &Deque<T>) {
        match end {
            End::Front => (&self.front, &self.back),
            End::Back => (&self.back, &self.front),
        }
    }

    pub(crate) fn add_handle(&self) {
        self.handles.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        if self.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            {
                let mut mode = self.gate.mode.lock();
                mode.destroyed = true;
                self.gate.cond.notify_all();
            }
            let _ = self.front.destroy();
            let _ = self.back.destroy();
        }
    }

    pub(crate) fn take(&self, end: End) -> Option<T> {
        let (first, second) = self.sides(end);
        first.take(end).or_else(|| second.take(end))
    }

    pub(crate) fn pop(&self, end: End, wait: Wait) -> Pop<T> {
        let mut mode = self.gate.mode.lock();
        let mut expired = false;
        loop {
            if mode.destroyed {
                return Pop::Destroyed;
            }
            if let Some(item) = self.take(end) {
                return Pop::Item(item);
            }
            match wait {
                Wait::Never => return Pop::Empty,
                _ if mode.unblocked => return Pop::Unblocked,
                _ if expired => return Pop::TimedOut,
                Wait::Forever => self.gate.cond.wait(&mut mode),
                Wait::Until(deadline) => {
                    expired = self.gate.cond.wait_until(&mut mode, deadline).timed_out();
                }
            }
        }
    }

    pub(crate) fn push(&self, end: End, item: T) -> Result<(), DequeError> {
        if self.gate.mode.lock().destroyed {
            return Err(DequeError::Inconsistent);
        }
        match end {
            End::Front => self.front.push_front(item),
            End::Back => self.back.push_back(item),
        }
    }

    pub(crate) fn peek(&self, end: End) -> Peek<T>
    where
        T: Clone,
    {
        if self.gate.mode.lock().destroyed {
            return Peek::Destroyed;
        }
        let (first, second) = self.sides(end);
        match first.peek(end) {
            Peek::Empty => second.peek(end),
            found => found,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.front.size() + self.back.size()
    }

    pub(crate) fn status(&self) -> Status {
        if self.gate.mode.lock().destroyed {
            return Status::Inconsistent;
        }
        match self.front.status() {
            Status::Empty => self.back.status(),
            other => other,
        }
    }

    /// Forwards the mode change to both sides, then applies it to the view.
    pub(crate) fn set_unblocked(&self, unblocked: bool) -> Result<(), DequeError> {
        if self.gate.mode.lock().destroyed {
            return Err(DequeError::Inconsistent);
        }
        if unblocked {
            self.front.unblock()?;
            self.back.unblock()?;
        } else {
            self.front.block()?;
            self.back.block()?;
        }
        let mut mode = self.gate.mode.lock();
        mode.unblocked = unblocked;
        self.gate.cond.notify_all();
        Ok(())
    }
}
