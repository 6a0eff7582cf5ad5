//! Error types for rill.
//!
//! All errors that can occur within the engine are represented by
//! [`RillError`]. Errors are propagated via `Result<T, RillError>` throughout
//! the codebase; element hooks return the same type, so a user error and an
//! engine error travel the same path out of [`Pipeline::run`].
//!
//! # Error Classification
//!
//! Errors are classified into five categories that determine when they can
//! surface:
//! - **Construction** — duplicate names, bad pad names, double binding.
//!   Reported synchronously from `insert`/`link`; no ticks run.
//! - **Validation** — unlinked sink pads, cycles. Reported from `run()`
//!   before the first tick.
//! - **Invariant** — a scheduling invariant was violated mid-run. Always a
//!   bug in the engine or a hook breaking its contract.
//! - **Element** — an error raised from a user hook. Always fatal to the
//!   graph.
//! - **Transport** — queue, worker-process, or shared-memory failures in the
//!   isolation transport. Surfaced on the next `produce` and then treated
//!   like an element error.
//!
//! [`Pipeline::run`]: crate::pipeline::Pipeline::run

use std::fmt;

/// Primary error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum RillError {
    // ── Construction errors — reported before any tick runs ─────────────
    /// An element with this name is already in the pipeline.
    #[error("duplicate element name: {0}")]
    DuplicateElement(String),

    /// An element declared the same pad short name twice in one direction.
    #[error("duplicate pad {pad:?} on element {element:?}")]
    DuplicatePad { element: String, pad: String },

    /// A pad name did not resolve to a pad of an inserted element.
    #[error("unknown pad: {0}")]
    UnknownPad(String),

    /// The sink side of a link is already bound to a source pad.
    #[error("pad already bound: {0}")]
    PadAlreadyBound(String),

    /// A pad or element name could not be parsed or is not usable.
    #[error("invalid name: {0}")]
    InvalidName(String),

    // ── Validation errors — reported from run(), before the first tick ──
    /// A sink pad was left unbound at validation time.
    #[error("unlinked pad: {0}")]
    UnlinkedPad(String),

    /// The element graph contains a cycle.
    #[error("cycle detected in pipeline graph: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    // ── Scheduling-invariant errors — fatal mid-run ──────────────────────
    /// A frame was routed into a sink-pad slot that still held a frame.
    #[error("scheduling invariant violated: slot occupied on {0}")]
    SlotOccupied(String),

    /// `produce` was invoked on a source pad that already sent EOS.
    #[error("scheduling invariant violated: produce after EOS on {0}")]
    ProduceAfterEos(String),

    // ── Element errors — raised from user hooks, fatal ───────────────────
    /// An error raised by a user hook.
    #[error("element {element:?}: {message}")]
    Element { element: String, message: String },

    // ── Transport errors — isolation queues, workers, shared memory ──────
    /// A bounded-retry put exhausted its retry budget.
    #[error("input queue full after {retries} retries on {element:?}")]
    QueueFull { element: String, retries: u32 },

    /// The peer end of a transport queue is gone.
    #[error("transport queue closed: {0}")]
    QueueClosed(String),

    /// A frame could not be encoded or decoded for the wire.
    #[error("frame codec error: {0}")]
    FrameCodec(String),

    /// The worker process exited without delivering a frame.
    #[error("worker for {element:?} exited unexpectedly ({status})")]
    WorkerGone { element: String, status: String },

    /// The worker routine reported an error.
    #[error("worker for {element:?} failed: {message}")]
    WorkerFailed { element: String, message: String },

    /// A shared-memory segment could not be created, mapped, or released.
    #[error("shared memory error: {0}")]
    ShmError(String),

    /// The worker process could not be spawned.
    #[error("worker spawn failed: {0}")]
    SpawnError(String),
}

impl RillError {
    /// Shorthand for a user-hook error attributed to an element.
    pub fn element(element: impl Into<String>, message: impl Into<String>) -> Self {
        RillError::Element {
            element: element.into(),
            message: message.into(),
        }
    }

    /// Whether this error can only surface before the first tick.
    ///
    /// Construction and validation errors are reported synchronously from
    /// the constructing call or from validation; everything else terminates
    /// a run in progress.
    pub fn is_pre_run(&self) -> bool {
        matches!(
            self.kind(),
            RillErrorKind::Construction | RillErrorKind::Validation
        )
    }
}

/// Classification of an error for logging and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RillErrorKind {
    Construction,
    Validation,
    Invariant,
    Element,
    Transport,
}

impl fmt::Display for RillErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RillErrorKind::Construction => write!(f, "CONSTRUCTION"),
            RillErrorKind::Validation => write!(f, "VALIDATION"),
            RillErrorKind::Invariant => write!(f, "INVARIANT"),
            RillErrorKind::Element => write!(f, "ELEMENT"),
            RillErrorKind::Transport => write!(f, "TRANSPORT"),
        }
    }
}

impl RillError {
    /// Classify the error.
    pub fn kind(&self) -> RillErrorKind {
        match self {
            RillError::DuplicateElement(_)
            | RillError::DuplicatePad { .. }
            | RillError::UnknownPad(_)
            | RillError::PadAlreadyBound(_)
            | RillError::InvalidName(_) => RillErrorKind::Construction,

            RillError::UnlinkedPad(_) | RillError::CycleDetected(_) => RillErrorKind::Validation,

            RillError::SlotOccupied(_) | RillError::ProduceAfterEos(_) => RillErrorKind::Invariant,

            RillError::Element { .. } => RillErrorKind::Element,

            RillError::QueueFull { .. }
            | RillError::QueueClosed(_)
            | RillError::FrameCodec(_)
            | RillError::WorkerGone { .. }
            | RillError::WorkerFailed { .. }
            | RillError::ShmError(_)
            | RillError::SpawnError(_) => RillErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            RillError::DuplicateElement("x".into()).kind(),
            RillErrorKind::Construction
        );
        assert_eq!(
            RillError::UnlinkedPad("a:snk:in".into()).kind(),
            RillErrorKind::Validation
        );
        assert_eq!(
            RillError::CycleDetected(vec![]).kind(),
            RillErrorKind::Validation
        );
        assert_eq!(
            RillError::SlotOccupied("a:snk:in".into()).kind(),
            RillErrorKind::Invariant
        );
        assert_eq!(
            RillError::element("a", "boom").kind(),
            RillErrorKind::Element
        );
        assert_eq!(
            RillError::QueueClosed("x".into()).kind(),
            RillErrorKind::Transport
        );
        assert_eq!(
            RillError::WorkerFailed {
                element: "a".into(),
                message: "x".into()
            }
            .kind(),
            RillErrorKind::Transport
        );
    }

    #[test]
    fn test_pre_run_errors() {
        assert!(RillError::DuplicateElement("x".into()).is_pre_run());
        assert!(RillError::UnlinkedPad("x".into()).is_pre_run());
        assert!(!RillError::element("a", "boom").is_pre_run());
        assert!(
            !RillError::QueueFull {
                element: "a".into(),
                retries: 5
            }
            .is_pre_run()
        );
    }

    #[test]
    fn test_cycle_message_joins_names() {
        let err = RillError::CycleDetected(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "cycle detected in pipeline graph: a -> b -> a"
        );
    }

    #[test]
    fn test_unlinked_pad_names_the_pad() {
        let err = RillError::UnlinkedPad("double:snk:in".into());
        assert!(err.to_string().contains("double:snk:in"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(RillErrorKind::Construction.to_string(), "CONSTRUCTION");
        assert_eq!(RillErrorKind::Transport.to_string(), "TRANSPORT");
    }
}
