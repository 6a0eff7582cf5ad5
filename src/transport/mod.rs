//! Process-isolation plumbing.
//!
//! The isolation transport hosts an element's work in a forked child
//! process. The pieces:
//!
//! - [`queue`] — bounded FIFO frame queues over a Unix socket pair, with
//!   length-prefixed JSON framing and bounded-timeout endpoints.
//! - [`shmem`] — the two control flags (`stop`, `shutdown`) in a shared
//!   mapping, plus the registry of named shared-memory segments.
//! - [`worker`] — the child-side context handed to the user's worker
//!   routine, and the run loop that reports errors and exits.
//!
//! The in-graph wrapper that ties these together is
//! [`Isolate`](crate::isolate::Isolate).

pub(crate) mod queue;
pub mod shmem;
pub mod worker;
