//! A thread-safe double-ended queue used to hand work from producer
//! threads to consumer threads.
//!
//! Items can be pushed and popped at either end. Pops come in blocking,
//! non-blocking and timed flavours, and a deque can be switched into an
//! "unblocked" mode during shutdown so that every waiting consumer returns
//! promptly. Handles are reference counted: [`Deque::copy`] hands another
//! thread a view of the same storage, and the storage is torn down when the
//! last handle is destroyed or dropped.
//!
//! Two deques can be combined with [`Deque::create_merged`], which yields a
//! view that behaves like the first deque followed by the second, while the
//! originals remain independently usable. [`Deque::join`] moves every item
//! of one deque onto the back of another.

#![warn(missing_docs)]

mod deque;
mod merged;
mod simple;
mod status;

pub use deque::Deque;
pub use status::{DequeError, Peek, Pop, Status};
