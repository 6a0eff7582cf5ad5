//! Pads: the named ports of an element.
//!
//! Every pad has a full name of the form `<element>:<dir>:<short>` where
//! `<dir>` is `src` for source (output) pads and `snk` for sink (input)
//! pads. Edges are formed by binding one sink pad to one source pad; a
//! source pad may fan out to any number of sink pads, a sink pad is bound
//! exactly once.
//!
//! Runtime pad state is owned by the pipeline, not by the element
//! implementation: a sink pad holds the one-slot frame buffer and the EOS
//! bookkeeping; a source pad tracks whether its terminal frame was sent.
//! Pads refer back to their element by index into the pipeline's element
//! table.

use std::fmt;
use std::str::FromStr;

use crate::error::RillError;
use crate::frame::Frame;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDir {
    /// An output pad; frames leave the element here.
    Src,
    /// An input pad; frames arrive at the element here.
    Snk,
}

impl PadDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            PadDir::Src => "src",
            PadDir::Snk => "snk",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, RillError> {
        match s {
            "src" => Ok(PadDir::Src),
            "snk" => Ok(PadDir::Snk),
            other => Err(RillError::InvalidName(format!(
                "unknown pad direction: {other}. Must be 'src' or 'snk'"
            ))),
        }
    }
}

impl fmt::Display for PadDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full pad name: `<element>:<dir>:<short>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadName {
    element: String,
    dir: PadDir,
    short: String,
}

impl PadName {
    pub fn new(element: impl Into<String>, dir: PadDir, short: impl Into<String>) -> Self {
        PadName {
            element: element.into(),
            dir,
            short: short.into(),
        }
    }

    /// Name of the owning element.
    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn dir(&self) -> PadDir {
        self.dir
    }

    /// Short name, unique within one element and one direction.
    pub fn short(&self) -> &str {
        &self.short
    }
}

impl fmt::Display for PadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.element, self.dir, self.short)
    }
}

impl FromStr for PadName {
    type Err = RillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(element), Some(dir), Some(short)) if !element.is_empty() && !short.is_empty() => {
                Ok(PadName::new(element, PadDir::from_str(dir)?, short))
            }
            _ => Err(RillError::InvalidName(format!(
                "malformed pad name {s:?}, expected <element>:<src|snk>:<short>"
            ))),
        }
    }
}

/// Index of a source pad: element slot plus pad position in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SrcKey {
    pub element: usize,
    pub pad: usize,
}

/// Index of a sink pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SnkKey {
    pub element: usize,
    pub pad: usize,
}

/// Runtime state of a sink (input) pad.
///
/// Holds a single-slot buffer for the most recently routed frame. The slot
/// is filled by the scheduler when the upstream source pad produces, and
/// emptied in the same tick when this pad's element is pulled.
pub struct SinkPad {
    pub(crate) name: PadName,
    pub(crate) slot: Option<Frame>,
    pub(crate) eos_received: bool,
    pub(crate) eos_marked: bool,
    pub(crate) peer: Option<SrcKey>,
}

impl SinkPad {
    pub(crate) fn new(name: PadName) -> Self {
        SinkPad {
            name,
            slot: None,
            eos_received: false,
            eos_marked: false,
            peer: None,
        }
    }

    pub fn name(&self) -> &PadName {
        &self.name
    }

    pub fn short(&self) -> &str {
        self.name.short()
    }

    /// Declare this input drained from the element's perspective.
    ///
    /// Called from a `pull` hook. A pad marked EOS with no pending frame is
    /// definitively inactive.
    pub fn mark_eos(&mut self) {
        self.eos_marked = true;
    }

    /// Whether the element called [`mark_eos`](Self::mark_eos) on this pad.
    pub fn eos_marked(&self) -> bool {
        self.eos_marked
    }

    /// Whether a terminal frame has been delivered on this pad.
    pub fn eos_received(&self) -> bool {
        self.eos_received
    }

    /// Whether a frame is waiting in the one-slot buffer.
    pub fn has_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.peer.is_some()
    }

    /// Inactive: EOS seen or declared, and nothing left to deliver.
    pub fn is_drained(&self) -> bool {
        (self.eos_received || self.eos_marked) && self.slot.is_none()
    }
}

impl fmt::Debug for SinkPad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkPad")
            .field("name", &self.name.to_string())
            .field("pending", &self.slot.is_some())
            .field("eos_received", &self.eos_received)
            .field("eos_marked", &self.eos_marked)
            .finish()
    }
}

/// Runtime state of a source (output) pad.
pub struct SourcePad {
    pub(crate) name: PadName,
    pub(crate) eos_sent: bool,
    pub(crate) peers: Vec<SnkKey>,
}

impl SourcePad {
    pub(crate) fn new(name: PadName) -> Self {
        SourcePad {
            name,
            eos_sent: false,
            peers: Vec::new(),
        }
    }

    pub fn name(&self) -> &PadName {
        &self.name
    }

    pub fn short(&self) -> &str {
        self.name.short()
    }

    /// Whether the terminal frame has been produced on this pad.
    ///
    /// Once set, the scheduler never calls `produce` on the pad again.
    pub fn eos_sent(&self) -> bool {
        self.eos_sent
    }

    /// Number of sink pads bound to this pad (fan-out width).
    pub fn fan_out(&self) -> usize {
        self.peers.len()
    }
}

impl fmt::Debug for SourcePad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePad")
            .field("name", &self.name.to_string())
            .field("eos_sent", &self.eos_sent)
            .field("fan_out", &self.peers.len())
            .finish()
    }
}
