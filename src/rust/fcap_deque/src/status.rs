use thiserror::Error;

/// Result of a pop. Everything other than [`Pop::Item`] is a control state
/// that callers are expected to handle on its own terms, not a failure.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop<T> {
    /// An item was removed from the deque
    Item(T),
    /// Non-blocking pop on an empty deque
    Empty,
    /// The deque is in unblocked mode and has nothing to return
    Unblocked,
    /// The deque was destroyed, before or during the call
    Destroyed,
    /// A timed pop expired with nothing to return
    TimedOut,
}

impl<T> Pop<T> {
    /// Converts into the popped item, if any.
    pub fn into_item(self) -> Option<T> {
        match self {
            Pop::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Did the pop produce an item?
    pub fn is_item(&self) -> bool {
        matches!(self, Pop::Item(_))
    }
}

/// Result of looking at either end without removing anything.
#[derive(Debug, PartialEq, Eq)]
pub enum Peek<T> {
    /// A copy of the item at the requested end
    Item(T),
    /// Nothing queued
    Empty,
    /// The deque was destroyed
    Destroyed,
}

/// Overall deque state, as reported by [`crate::Deque::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Holds at least one item
    Ok,
    /// Holds nothing
    Empty,
    /// The handle or its storage is no longer usable
    Inconsistent,
}

/// Errors returned by pushes and structural operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeError {
    /// Memory for the new item could not be reserved
    #[error("Unable to allocate space in the deque")]
    Alloc,

    /// The deque is destroyed, or the operands of a join/merge share storage
    #[error("The deque is destroyed or the operation would corrupt it")]
    Inconsistent,
}

/// Which end of a deque an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum End {
    Front,
    Back,
}

/// How long a pop is willing to wait.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wait {
    Never,
    Forever,
    Until(std::time::Instant),
}
