//! The frame envelope.
//!
//! A [`Frame`] is one unit of data flowing along an edge: an opaque payload
//! (any JSON value, possibly absent) plus an end-of-stream marker. Frames are
//! produced by an element's `produce` hook and consumed by the downstream
//! element's `pull` hook; they are never mutated after leaving the producer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of data on an edge.
///
/// An EOS frame carries the terminal signal for its edge; a payload on an
/// EOS frame, if present, is still delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    payload: Option<Value>,
    eos: bool,
}

impl Frame {
    /// A data frame carrying `payload`.
    pub fn new(payload: impl Into<Value>) -> Self {
        Frame {
            payload: Some(payload.into()),
            eos: false,
        }
    }

    /// A data frame with no payload.
    pub fn empty() -> Self {
        Frame::default()
    }

    /// A terminal frame with no payload.
    pub fn eos() -> Self {
        Frame {
            payload: None,
            eos: true,
        }
    }

    /// A terminal frame that still carries a final payload.
    pub fn eos_with(payload: impl Into<Value>) -> Self {
        Frame {
            payload: Some(payload.into()),
            eos: true,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_frame() {
        let f = Frame::new(7);
        assert_eq!(f.payload(), Some(&json!(7)));
        assert!(!f.is_eos());
    }

    #[test]
    fn test_empty_frame_has_no_payload() {
        let f = Frame::empty();
        assert!(f.payload().is_none());
        assert!(!f.is_eos());
    }

    #[test]
    fn test_eos_frame() {
        let f = Frame::eos();
        assert!(f.is_eos());
        assert!(f.payload().is_none());
    }

    #[test]
    fn test_eos_frame_may_carry_payload() {
        let f = Frame::eos_with("last");
        assert!(f.is_eos());
        assert_eq!(f.payload(), Some(&json!("last")));
    }

    #[test]
    fn test_serde_roundtrip() {
        let f = Frame::eos_with(json!({"k": [1, 2, 3]}));
        let bytes = serde_json::to_vec(&f).unwrap();
        let back: Frame = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_into_payload_moves_value() {
        let f = Frame::new(json!([1, 2]));
        assert_eq!(f.into_payload(), Some(json!([1, 2])));
    }
}
