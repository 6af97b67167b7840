//! The flowcap daemon: receives NetFlow v5 from each configured probe and
//! writes the records to rotating output files, as long as the destination
//! disk has room.

pub mod admission;
pub mod collector;
pub mod container;
pub mod rotation;
