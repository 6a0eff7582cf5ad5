//! Shared test elements for the integration suites.
//!
//! Small, deterministic elements covering the three roles: a counting
//! source, a doubling transform, a scripted multi-pad source, and a
//! recording sink whose observations are read back through shared handles
//! after the pipeline is dropped.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

use rill::{Element, Frame, RillError, SinkPad, SourcePad};
use serde_json::Value;

static TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary, so scheduler
/// and transport logging shows up under `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Emits `1..=limit` then a terminal frame on its single `out` pad.
pub struct CounterSource {
    name: String,
    srcs: Vec<String>,
    next: i64,
    limit: i64,
}

impl CounterSource {
    pub fn new(name: &str, limit: i64) -> Self {
        CounterSource {
            name: name.into(),
            srcs: vec!["out".into()],
            next: 1,
            limit,
        }
    }
}

impl Element for CounterSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_pad_names(&self) -> &[String] {
        &self.srcs
    }

    fn produce(&mut self, _pad: &SourcePad) -> Result<Frame, RillError> {
        if self.next > self.limit {
            return Ok(Frame::eos());
        }
        let frame = Frame::new(self.next);
        self.next += 1;
        Ok(frame)
    }
}

/// Replays a fixed frame sequence per source pad, then EOS.
pub struct ScriptedSource {
    name: String,
    srcs: Vec<String>,
    scripts: HashMap<String, VecDeque<Frame>>,
}

impl ScriptedSource {
    pub fn new(name: &str, scripts: Vec<(&str, Vec<Frame>)>) -> Self {
        let srcs = scripts.iter().map(|(pad, _)| pad.to_string()).collect();
        let scripts = scripts
            .into_iter()
            .map(|(pad, frames)| (pad.to_string(), frames.into_iter().collect()))
            .collect();
        ScriptedSource {
            name: name.into(),
            srcs,
            scripts,
        }
    }
}

impl Element for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_pad_names(&self) -> &[String] {
        &self.srcs
    }

    fn produce(&mut self, pad: &SourcePad) -> Result<Frame, RillError> {
        let queue = self.scripts.get_mut(pad.short()).ok_or_else(|| {
            RillError::element(self.name.as_str(), format!("no script for {}", pad.name()))
        })?;
        Ok(queue.pop_front().unwrap_or_else(Frame::eos))
    }
}

/// Doubles integer payloads and forwards EOS, one frame per tick.
pub struct DoublingTransform {
    name: String,
    srcs: Vec<String>,
    snks: Vec<String>,
    pending: Option<i64>,
    saw_eos: bool,
}

impl DoublingTransform {
    pub fn new(name: &str) -> Self {
        DoublingTransform {
            name: name.into(),
            srcs: vec!["out".into()],
            snks: vec!["in".into()],
            pending: None,
            saw_eos: false,
        }
    }
}

impl Element for DoublingTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_pad_names(&self) -> &[String] {
        &self.srcs
    }

    fn sink_pad_names(&self) -> &[String] {
        &self.snks
    }

    fn pull(&mut self, pad: &mut SinkPad, frame: Frame) -> Result<(), RillError> {
        if frame.is_eos() {
            pad.mark_eos();
            self.saw_eos = true;
        }
        if let Some(v) = frame.payload().and_then(|v| v.as_i64()) {
            self.pending = Some(v);
        }
        Ok(())
    }

    fn produce(&mut self, _pad: &SourcePad) -> Result<Frame, RillError> {
        if let Some(v) = self.pending.take() {
            Ok(Frame::new(v * 2))
        } else if self.saw_eos {
            Ok(Frame::eos())
        } else {
            Ok(Frame::empty())
        }
    }
}

/// Handle into a [`RecordingSink`]'s payload observations.
pub type Seen = Rc<RefCell<Vec<Value>>>;
/// Handle into a [`RecordingSink`]'s terminal-frame count.
pub type EosCount = Rc<RefCell<usize>>;

/// Records every payload it sees and counts terminal frames.
pub struct RecordingSink {
    name: String,
    snks: Vec<String>,
    seen: Seen,
    eos: EosCount,
}

impl RecordingSink {
    pub fn new(name: &str) -> (Self, Seen, EosCount) {
        let seen: Seen = Rc::default();
        let eos: EosCount = Rc::default();
        (
            RecordingSink {
                name: name.into(),
                snks: vec!["in".into()],
                seen: seen.clone(),
                eos: eos.clone(),
            },
            seen,
            eos,
        )
    }
}

impl Element for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_pad_names(&self) -> &[String] {
        &self.snks
    }

    fn pull(&mut self, pad: &mut SinkPad, frame: Frame) -> Result<(), RillError> {
        if frame.is_eos() {
            *self.eos.borrow_mut() += 1;
            pad.mark_eos();
        }
        if let Some(v) = frame.payload() {
            self.seen.borrow_mut().push(v.clone());
        }
        Ok(())
    }
}
