//! The element contract.
//!
//! An element is a node in the pipeline graph: a named bundle of user state
//! with an ordered list of source pads, an ordered list of sink pads, and up
//! to three lifecycle hooks the scheduler drives each tick:
//!
//! 1. [`pull`](Element::pull) — once per pending frame on each sink pad, in
//!    sink-pad declaration order.
//! 2. [`internal`](Element::internal) — once, after all pulls for the tick.
//! 3. [`produce`](Element::produce) — once per source pad that has not sent
//!    EOS, in source-pad declaration order.
//!
//! Capability follows from the declared pads: the scheduler never asks an
//! element without sink pads to `pull`, nor an element without source pads
//! to `produce`. The default hook bodies therefore only fire when an element
//! declares a pad direction it does not actually implement, which is a
//! contract violation and fatal to the graph.

use uuid::Uuid;

use crate::error::RillError;
use crate::frame::Frame;
use crate::pad::{SinkPad, SourcePad};
use crate::pipeline::CancelToken;

/// A stateful node in the pipeline graph.
///
/// A source element declares only source pads and implements `produce`; a
/// sink element declares only sink pads and implements `pull`; a transform
/// declares both and implements both (and `internal` when it needs per-tick
/// bookkeeping between the two).
pub trait Element {
    /// Unique name within the pipeline, used for diagnostics and for the
    /// deterministic topological tie-break.
    fn name(&self) -> &str;

    /// Short names of the source pads, in declaration order.
    fn source_pad_names(&self) -> &[String] {
        &[]
    }

    /// Short names of the sink pads, in declaration order.
    fn sink_pad_names(&self) -> &[String] {
        &[]
    }

    /// Consume one frame delivered on `pad`.
    ///
    /// Must not block indefinitely and must not produce frames. May call
    /// [`SinkPad::mark_eos`] to declare the input drained. An error is fatal
    /// to the graph.
    fn pull(&mut self, pad: &mut SinkPad, frame: Frame) -> Result<(), RillError> {
        let _ = frame;
        Err(RillError::element(
            self.name(),
            format!("no pull hook for sink pad {}", pad.name()),
        ))
    }

    /// Per-tick internal bookkeeping, after pulls and before produces.
    fn internal(&mut self) -> Result<(), RillError> {
        Ok(())
    }

    /// Produce the next frame on `pad`.
    ///
    /// Must return a frame; returning one with the EOS flag set marks the
    /// pad terminal, after which the scheduler never asks again.
    fn produce(&mut self, pad: &SourcePad) -> Result<Frame, RillError> {
        Err(RillError::element(
            self.name(),
            format!("no produce hook for source pad {}", pad.name()),
        ))
    }

    /// The element was added to a pipeline; receives the pipeline's
    /// cancellation token. Default: ignored.
    ///
    /// The isolation wrapper keeps the token and polls it inside its bounded
    /// queue waits, arming its worker's `stop` and `shutdown` flags as soon
    /// as cancellation is requested — even while the scheduler is blocked
    /// inside one of this element's own hooks.
    fn attach_cancel(&mut self, token: CancelToken) {
        let _ = token;
    }

    /// The graph finished normally. Default: nothing to do.
    ///
    /// The isolation wrapper overrides this to set its worker's `stop` flag.
    fn on_stop(&mut self) {}

    /// The graph is terminating due to a fatal error or an explicit
    /// shutdown request. Default: nothing to do.
    ///
    /// The isolation wrapper overrides this to arm both `stop` and
    /// `shutdown` so its worker drains and exits.
    fn on_cancel(&mut self) {}

    /// Whether this element consumes frames (declares sink pads).
    fn consumes(&self) -> bool {
        !self.sink_pad_names().is_empty()
    }

    /// Whether this element produces frames (declares source pads).
    fn produces(&self) -> bool {
        !self.source_pad_names().is_empty()
    }
}

/// Generate a unique element name with the given prefix.
///
/// Used when the author does not care about the name; the result is only
/// seen in diagnostics and in the topological tie-break.
pub fn generated_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
