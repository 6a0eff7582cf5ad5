//! rill — a streaming dataflow engine.
//!
//! Build a directed acyclic graph of stateful elements connected by typed
//! one-to-many edges, then drive it to completion. Each element is a small
//! state machine: the scheduler walks the graph in topological order, tick
//! after tick, delivering frames to `pull` hooks, running `internal`
//! bookkeeping, and collecting new frames from `produce` hooks, until every
//! source pad has signalled end-of-stream and the graph has drained.
//!
//! # Model
//!
//! - [`Frame`] — one unit of data on an edge: an opaque JSON payload plus an
//!   EOS flag.
//! - Pads — named ports (`<element>:<src|snk>:<short>`); a source pad fans
//!   out to any number of sink pads, a sink pad binds exactly once.
//! - [`Element`] — a named node implementing up to three lifecycle hooks.
//! - [`Pipeline`] — the container: `insert` elements, `link` pads, `run`.
//! - [`Isolate`] — an element whose work runs in a separate worker process,
//!   fed through bounded queues and a shared-memory registry.
//!
//! # Example
//!
//! ```
//! use rill::{Element, Frame, Pipeline, RillError, SinkPad, SourcePad};
//!
//! struct Count {
//!     name: String,
//!     srcs: Vec<String>,
//!     next: i64,
//! }
//!
//! impl Element for Count {
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//!
//!     fn source_pad_names(&self) -> &[String] {
//!         &self.srcs
//!     }
//!
//!     fn produce(&mut self, _pad: &SourcePad) -> Result<Frame, RillError> {
//!         self.next += 1;
//!         if self.next > 3 {
//!             Ok(Frame::eos())
//!         } else {
//!             Ok(Frame::new(self.next))
//!         }
//!     }
//! }
//!
//! struct Sum {
//!     name: String,
//!     snks: Vec<String>,
//!     total: i64,
//! }
//!
//! impl Element for Sum {
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//!
//!     fn sink_pad_names(&self) -> &[String] {
//!         &self.snks
//!     }
//!
//!     fn pull(&mut self, pad: &mut SinkPad, frame: Frame) -> Result<(), RillError> {
//!         if frame.is_eos() {
//!             pad.mark_eos();
//!         }
//!         self.total += frame.payload().and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), RillError> {
//! let mut pipeline = Pipeline::new();
//! pipeline.insert(Count {
//!     name: "count".into(),
//!     srcs: vec!["out".into()],
//!     next: 0,
//! })?;
//! pipeline.insert(Sum {
//!     name: "sum".into(),
//!     snks: vec!["in".into()],
//!     total: 0,
//! })?;
//! pipeline.link("sum:snk:in", "count:src:out")?;
//! pipeline.run()?;
//! # Ok(()) }
//! ```
//!
//! # Concurrency
//!
//! The in-process scheduler is single-threaded and cooperative; element
//! hooks run on the driver and must not block for arbitrary durations. The
//! only legal suspension points are the isolation transport's queue
//! endpoints, and both wait in bounded slices while the `stop` flag is
//! unset. Process-hosted workers run with their own thread of control and
//! communicate exclusively through the queues and the shared-memory
//! registry.
//!
//! # Safety
//! The isolation transport uses `unsafe` for `fork`, `_exit`, file-backed
//! mappings, and atomics placed in shared memory. All unsafe blocks carry
//! `// SAFETY:` comments.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dag;
pub mod element;
pub mod error;
pub mod frame;
pub mod isolate;
pub mod pad;
pub mod pipeline;
mod scheduler;
pub mod transport;

pub use config::TransportConfig;
pub use element::Element;
pub use error::{RillError, RillErrorKind};
pub use frame::Frame;
pub use isolate::{Isolate, IsolateBuilder};
pub use pad::{PadDir, PadName, SinkPad, SourcePad};
pub use pipeline::{CancelToken, Pipeline};
pub use transport::shmem::ShmSegment;
pub use transport::worker::WorkerContext;
