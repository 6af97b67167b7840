use crate::merged::Merged;
use crate::simple::{Core, State};
use crate::status::{DequeError, End, Peek, Pop, Status, Wait};
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Shape<T> {
    Simple(Arc<Core<T>>),
    Merged(Arc<Merged<T>>),
}

/// Handle to a thread-safe double-ended queue.
///
/// A handle is either a simple deque or a merged view over two other
/// deques. Handles are not `Clone`; use [`Deque::copy`] to obtain another
/// handle to the same storage. Dropping a handle releases it, exactly like
/// [`Deque::destroy`].
pub struct Deque<T> {
    shape: Shape<T>,
    released: AtomicBool,
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deque<T> {
    /// Creates an empty deque in blocking mode.
    pub fn new() -> Self {
        Self::from_shape(Shape::Simple(Core::new()))
    }

    fn from_shape(shape: Shape<T>) -> Self {
        Self {
            shape,
            released: AtomicBool::new(false),
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Creates a view that behaves as `front` followed by `back`. Both
    /// deques stay usable on their own; the view holds its own reference to
    /// each. Fails if either handle is destroyed or the two share storage.
    pub fn create_merged(front: &Deque<T>, back: &Deque<T>) -> Result<Self, DequeError> {
        let mut front_leaves = Vec::new();
        front.leaves(&mut front_leaves);
        let mut back_leaves = Vec::new();
        back.leaves(&mut back_leaves);
        if front_leaves
            .iter()
            .any(|f| back_leaves.iter().any(|b| Arc::ptr_eq(f, b)))
        {
            return Err(DequeError::Inconsistent);
        }
        let front = front.copy()?;
        let back = back.copy()?;
        Ok(Self::from_shape(Shape::Merged(Merged::new(front, back))))
    }

    /// Returns another handle to the same storage. Operations through
    /// either handle affect both; the storage lives until every handle has
    /// been destroyed or dropped.
    pub fn copy(&self) -> Result<Self, DequeError> {
        if self.is_released() || self.status() == Status::Inconsistent {
            return Err(DequeError::Inconsistent);
        }
        let shape = match &self.shape {
            Shape::Simple(core) => {
                core.add_handle();
                Shape::Simple(core.clone())
            }
            Shape::Merged(merged) => {
                merged.add_handle();
                Shape::Merged(merged.clone())
            }
        };
        Ok(Self::from_shape(shape))
    }

    /// Releases this handle. When it was the last handle, the storage is
    /// torn down: queued items are dropped and every thread waiting in a
    /// pop returns [`Pop::Destroyed`]. Further use of this handle reports
    /// the deque as destroyed.
    pub fn destroy(&self) -> Result<(), DequeError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(DequeError::Inconsistent);
        }
        match &self.shape {
            Shape::Simple(core) => core.release(),
            Shape::Merged(merged) => merged.release(),
        }
        Ok(())
    }

    fn pop(&self, end: End, wait: Wait) -> Pop<T> {
        if self.is_released() {
            return Pop::Destroyed;
        }
        match &self.shape {
            Shape::Simple(core) => core.pop(end, wait),
            Shape::Merged(merged) => merged.pop(end, wait),
        }
    }

    /// Removes the front item, waiting while the deque is empty and in
    /// blocking mode.
    pub fn pop_front(&self) -> Pop<T> {
        self.pop(End::Front, Wait::Forever)
    }

    /// Removes the back item, waiting while the deque is empty and in
    /// blocking mode.
    pub fn pop_back(&self) -> Pop<T> {
        self.pop(End::Back, Wait::Forever)
    }

    /// Removes the front item or returns [`Pop::Empty`] at once.
    pub fn pop_front_nb(&self) -> Pop<T> {
        self.pop(End::Front, Wait::Never)
    }

    /// Removes the back item or returns [`Pop::Empty`] at once.
    pub fn pop_back_nb(&self) -> Pop<T> {
        self.pop(End::Back, Wait::Never)
    }

    /// Like [`Deque::pop_front`], giving up with [`Pop::TimedOut`] after
    /// `timeout`.
    pub fn pop_front_timed(&self, timeout: Duration) -> Pop<T> {
        self.pop(End::Front, Wait::Until(Instant::now() + timeout))
    }

    /// Like [`Deque::pop_back`], giving up with [`Pop::TimedOut`] after
    /// `timeout`.
    pub fn pop_back_timed(&self, timeout: Duration) -> Pop<T> {
        self.pop(End::Back, Wait::Until(Instant::now() + timeout))
    }

    /// Waits on the front until `deadline`.
    pub fn pop_front_until(&self, deadline: Instant) -> Pop<T> {
        self.pop(End::Front, Wait::Until(deadline))
    }

    fn push(&self, end: End, item: T) -> Result<(), DequeError> {
        if self.is_released() {
            return Err(DequeError::Inconsistent);
        }
        match &self.shape {
            Shape::Simple(core) => core.push(end, item),
            Shape::Merged(merged) => merged.push(end, item),
        }
    }

    /// Adds an item at the front. It will be the next item popped from the
    /// front.
    pub fn push_front(&self, item: T) -> Result<(), DequeError> {
        self.push(End::Front, item)
    }

    /// Adds an item at the back.
    pub fn push_back(&self, item: T) -> Result<(), DequeError> {
        self.push(End::Back, item)
    }

    pub(crate) fn peek(&self, end: End) -> Peek<T>
    where
        T: Clone,
    {
        if self.is_released() {
            return Peek::Destroyed;
        }
        match &self.shape {
            Shape::Simple(core) => core.peek(end),
            Shape::Merged(merged) => merged.peek(end),
        }
    }

    /// Returns a copy of the front item without removing it.
    pub fn front(&self) -> Peek<T>
    where
        T: Clone,
    {
        self.peek(End::Front)
    }

    /// Returns a copy of the back item without removing it.
    pub fn back(&self) -> Peek<T>
    where
        T: Clone,
    {
        self.peek(End::Back)
    }

    /// Number of queued items. A destroyed deque reports zero.
    pub fn size(&self) -> usize {
        if self.is_released() {
            return 0;
        }
        match &self.shape {
            Shape::Simple(core) => core.len(),
            Shape::Merged(merged) => merged.len(),
        }
    }

    /// Reports whether the deque holds items, or is no longer usable.
    pub fn status(&self) -> Status {
        if self.is_released() {
            return Status::Inconsistent;
        }
        match &self.shape {
            Shape::Simple(core) => core.status(),
            Shape::Merged(merged) => merged.status(),
        }
    }

    fn set_unblocked(&self, unblocked: bool) -> Result<(), DequeError> {
        if self.is_released() {
            return Err(DequeError::Inconsistent);
        }
        match &self.shape {
            Shape::Simple(core) => core.set_unblocked(unblocked),
            Shape::Merged(merged) => merged.set_unblocked(unblocked),
        }
    }

    /// Switches to unblocked mode: every thread waiting in a pop wakes up,
    /// and pops that find nothing queued return [`Pop::Unblocked`] instead
    /// of waiting. Queued items are kept and are still returned.
    pub fn unblock(&self) -> Result<(), DequeError> {
        self.set_unblocked(true)
    }

    /// Switches back to blocking mode.
    pub fn block(&self) -> Result<(), DequeError> {
        self.set_unblocked(false)
    }

    /// Moves every item of `tail` onto the back of this deque, keeping
    /// their order, and consumes the `tail` handle.
    ///
    /// When this deque is a merged view the items land at the back of its
    /// back-most simple deque; when `tail` is a merged view it is drained
    /// front side first. Joining a deque with itself, or with anything that
    /// shares storage with it, is rejected and leaves both untouched.
    pub fn join(&self, tail: Deque<T>) -> Result<(), DequeError> {
        if self.is_released() || tail.is_released() {
            return Err(DequeError::Inconsistent);
        }
        let mut head_leaves = Vec::new();
        self.leaves(&mut head_leaves);
        let mut tail_leaves = Vec::new();
        tail.leaves(&mut tail_leaves);
        if tail_leaves
            .iter()
            .any(|t| head_leaves.iter().any(|h| Arc::ptr_eq(h, t)))
        {
            return Err(DequeError::Inconsistent);
        }
        let target = self.back_leaf();

        // Lock every involved deque in address order so concurrent joins
        // cannot deadlock against each other.
        let mut involved: Vec<(usize, &Arc<Core<T>>)> = Vec::with_capacity(tail_leaves.len() + 1);
        involved.push((0, &target));
        for (i, leaf) in tail_leaves.iter().enumerate() {
            involved.push((i + 1, leaf));
        }
        involved.sort_by_key(|(_, core)| Arc::as_ptr(core) as usize);
        let mut guards: Vec<Option<MutexGuard<'_, State<T>>>> =
            (0..involved.len()).map(|_| None).collect();
        for (slot, core) in &involved {
            guards[*slot] = Some(core.lock());
        }
        let mut guards: Vec<MutexGuard<'_, State<T>>> = guards.into_iter().flatten().collect();
        if guards.iter().any(|g| g.destroyed) {
            return Err(DequeError::Inconsistent);
        }

        let (head, tails) = guards.split_at_mut(1);
        let head = &mut head[0];
        let incoming: usize = tails.iter().map(|g| g.items.len()).sum();
        let non_empty = tails.iter().filter(|g| !g.items.is_empty()).count();
        if head.items.is_empty() && non_empty == 1 {
            if let Some(source) = tails.iter_mut().find(|g| !g.items.is_empty()) {
                std::mem::swap(&mut head.items, &mut source.items);
            }
        } else if incoming > 0 {
            head.items.try_reserve(incoming).map_err(|_| DequeError::Alloc)?;
            for source in tails.iter_mut() {
                head.items.append(&mut source.items);
            }
        }
        drop(guards);

        if incoming > 0 {
            target.notify();
        }
        drop(tail);
        Ok(())
    }

    pub(crate) fn take(&self, end: End) -> Option<T> {
        match &self.shape {
            Shape::Simple(core) => core.take(end),
            Shape::Merged(merged) => merged.take(end),
        }
    }

    /// Collects the simple deques underneath this handle, front to back.
    pub(crate) fn leaves(&self, out: &mut Vec<Arc<Core<T>>>) {
        match &self.shape {
            Shape::Simple(core) => out.push(core.clone()),
            Shape::Merged(merged) => {
                merged.front().leaves(out);
                merged.back().leaves(out);
            }
        }
    }

    fn back_leaf(&self) -> Arc<Core<T>> {
        match &self.shape {
            Shape::Simple(core) => core.clone(),
            Shape::Merged(merged) => merged.back().back_leaf(),
        }
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        let _ = self.destroy();
    }
}

impl<T> std::fmt::Debug for Deque<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.shape {
            Shape::Simple(_) => "simple",
            Shape::Merged(_) => "merged",
        };
        f.debug_struct("Deque")
            .field("kind", &kind)
            .field("size", &self.size())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn filled(items: &[u32]) -> Deque<u32> {
        let q = Deque::new();
        for i in items {
            q.push_back(*i).unwrap();
        }
        q
    }

    fn drain_front(q: &Deque<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Pop::Item(i) = q.pop_front_nb() {
            out.push(i);
        }
        out
    }

    #[test]
    fn push_back_pop_front_is_fifo() {
        let q = filled(&[1, 2, 3]);
        assert_eq!(drain_front(&q), vec![1, 2, 3]);
        assert_eq!(q.pop_front_nb(), Pop::Empty);
    }

    #[test]
    fn push_front_pop_front_is_lifo() {
        let q = Deque::new();
        for i in [1, 2, 3] {
            q.push_front(i).unwrap();
        }
        assert_eq!(drain_front(&q), vec![3, 2, 1]);
    }

    #[test]
    fn push_front_pop_back_is_fifo() {
        let q = Deque::new();
        for i in [1, 2, 3] {
            q.push_front(i).unwrap();
        }
        let mut out = Vec::new();
        while let Pop::Item(i) = q.pop_back_nb() {
            out.push(i);
        }
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn push_back_pop_back_is_lifo() {
        let q = filled(&[1, 2, 3]);
        assert_eq!(q.pop_back(), Pop::Item(3));
        assert_eq!(q.pop_back(), Pop::Item(2));
        assert_eq!(q.pop_back(), Pop::Item(1));
    }

    #[test]
    fn peek_does_not_remove() {
        let q = filled(&[7, 8]);
        assert_eq!(q.front(), Peek::Item(7));
        assert_eq!(q.back(), Peek::Item(8));
        assert_eq!(q.size(), 2);
        let empty: Deque<u32> = Deque::new();
        assert_eq!(empty.front(), Peek::Empty);
    }

    #[test]
    fn status_tracks_contents() {
        let q = Deque::new();
        assert_eq!(q.status(), Status::Empty);
        q.push_back(1).unwrap();
        assert_eq!(q.status(), Status::Ok);
        q.destroy().unwrap();
        assert_eq!(q.status(), Status::Inconsistent);
        assert_eq!(q.push_back(2), Err(DequeError::Inconsistent));
        assert_eq!(q.pop_front_nb(), Pop::Destroyed);
        assert_eq!(q.destroy(), Err(DequeError::Inconsistent));
    }

    #[test]
    fn timed_pop_expires_without_side_effects() {
        let q: Deque<u32> = Deque::new();
        let start = Instant::now();
        assert_eq!(q.pop_front_timed(Duration::from_millis(30)), Pop::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(q.status(), Status::Empty);
    }

    #[test]
    fn unblocked_still_returns_items() {
        let q = filled(&[1]);
        q.unblock().unwrap();
        assert_eq!(q.pop_front(), Pop::Item(1));
        assert_eq!(q.pop_front(), Pop::Unblocked);
        assert_eq!(q.pop_back_timed(Duration::from_secs(5)), Pop::Unblocked);
        q.block().unwrap();
        assert_eq!(q.pop_front_timed(Duration::from_millis(5)), Pop::TimedOut);
    }

    #[test]
    fn copy_shares_storage() {
        let a = filled(&[1]);
        let b = a.copy().unwrap();
        b.push_back(2).unwrap();
        assert_eq!(a.size(), 2);
        a.destroy().unwrap();
        assert_eq!(b.pop_front_nb(), Pop::Item(1));
        assert_eq!(b.pop_front_nb(), Pop::Item(2));
    }

    #[test]
    fn join_appends_and_consumes_tail() {
        let head = filled(&[1, 2]);
        let tail = filled(&[3, 4]);
        let observer = tail.copy().unwrap();
        head.join(tail).unwrap();
        assert_eq!(observer.size(), 0);
        assert_eq!(drain_front(&head), vec![1, 2, 3, 4]);
    }

    #[test]
    fn join_into_empty_head() {
        let head = Deque::new();
        head.join(filled(&[5, 6])).unwrap();
        assert_eq!(drain_front(&head), vec![5, 6]);
    }

    #[test]
    fn join_with_self_is_rejected() {
        let head = filled(&[1]);
        let alias = head.copy().unwrap();
        assert_eq!(head.join(alias), Err(DequeError::Inconsistent));
        assert_eq!(drain_front(&head), vec![1]);
    }

    #[test]
    fn merged_view_reads_front_then_back() {
        let q1 = filled(&[1, 2]);
        let q2 = filled(&[3, 4]);
        let merged = Deque::create_merged(&q1, &q2).unwrap();
        assert_eq!(merged.size(), 4);
        assert_eq!(merged.front(), Peek::Item(1));
        assert_eq!(merged.back(), Peek::Item(4));
        assert_eq!(merged.pop_back_nb(), Pop::Item(4));
        assert_eq!(drain_front(&merged), vec![1, 2, 3]);
        // The originals are still independent deques.
        q2.push_back(9).unwrap();
        assert_eq!(merged.pop_front_nb(), Pop::Item(9));
    }

    #[test]
    fn merged_peek_looks_past_an_empty_side() {
        let q1 = Deque::new();
        let q2 = filled(&[5, 6]);
        let merged = Deque::create_merged(&q1, &q2).unwrap();
        assert_eq!(merged.front(), Peek::Item(5));
        assert_eq!(merged.back(), Peek::Item(6));
        let _ = q2.pop_front_nb();
        let _ = q2.pop_front_nb();
        assert_eq!(merged.front(), Peek::Empty);
        q1.push_back(1).unwrap();
        assert_eq!(merged.back(), Peek::Item(1));
    }

    #[test]
    fn merged_push_goes_to_matching_side() {
        let q1 = Deque::new();
        let q2 = Deque::new();
        let merged = Deque::create_merged(&q1, &q2).unwrap();
        merged.push_front(1).unwrap();
        merged.push_back(2).unwrap();
        assert_eq!(q1.pop_front_nb(), Pop::Item(1));
        assert_eq!(q2.pop_front_nb(), Pop::Item(2));
    }

    #[test]
    fn merging_shared_storage_is_rejected() {
        let q1: Deque<u32> = Deque::new();
        let alias = q1.copy().unwrap();
        assert!(Deque::create_merged(&q1, &alias).is_err());
    }

    #[test]
    fn merged_keeps_sides_alive() {
        let q1 = filled(&[1]);
        let q2 = filled(&[2]);
        let merged = Deque::create_merged(&q1, &q2).unwrap();
        drop(q1);
        drop(q2);
        assert_eq!(drain_front(&merged), vec![1, 2]);
    }
}
