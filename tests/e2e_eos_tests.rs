//! EOS propagation, termination, ordering, and failure semantics.

mod common;

use common::{CounterSource, DoublingTransform, RecordingSink, ScriptedSource};
use rill::{Element, Frame, Pipeline, RillError, RillErrorKind, SinkPad, SourcePad};
use serde_json::json;

#[test]
fn test_eos_liveness_and_safety() {
    let mut p = Pipeline::new();
    p.insert(CounterSource::new("count", 10)).unwrap();
    let (sink, seen, eos) = RecordingSink::new("sink");
    p.insert(sink).unwrap();
    p.link("sink:snk:in", "count:src:out").unwrap();

    p.run().unwrap();

    // Liveness: run returned. Safety: exactly one terminal frame, and the
    // source pad stays terminal.
    assert_eq!(seen.borrow().len(), 10);
    assert_eq!(*eos.borrow(), 1);
    assert!(p.source_pad("count:src:out").unwrap().eos_sent());
    assert!(p.sink_pad("sink:snk:in").unwrap().eos_received());
    assert!(p.sink_pad("sink:snk:in").unwrap().is_drained());
}

#[test]
fn test_per_edge_fifo_order() {
    let script: Vec<Frame> = (0..50).map(Frame::new).collect();
    let mut p = Pipeline::new();
    p.insert(ScriptedSource::new("feed", vec![("out", script)]))
        .unwrap();
    let (sink, seen, _) = RecordingSink::new("sink");
    p.insert(sink).unwrap();
    p.link("sink:snk:in", "feed:src:out").unwrap();

    p.run().unwrap();

    let expected: Vec<_> = (0..50).map(|i| json!(i)).collect();
    assert_eq!(*seen.borrow(), expected);
}

#[test]
fn test_transform_may_delay_eos() {
    /// Forwards frames unchanged; on upstream EOS, emits three trailing
    /// flush frames before its own terminal frame.
    struct Flusher {
        name: String,
        srcs: Vec<String>,
        snks: Vec<String>,
        pending: Option<i64>,
        flush_left: i64,
        saw_eos: bool,
    }

    impl Element for Flusher {
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
                return Ok(Frame::new(v));
            }
            if self.saw_eos {
                if self.flush_left > 0 {
                    self.flush_left -= 1;
                    return Ok(Frame::new(-1));
                }
                return Ok(Frame::eos());
            }
            Ok(Frame::empty())
        }
    }

    let mut p = Pipeline::new();
    p.insert(CounterSource::new("count", 2)).unwrap();
    p.insert(Flusher {
        name: "flush".into(),
        srcs: vec!["out".into()],
        snks: vec!["in".into()],
        pending: None,
        flush_left: 3,
        saw_eos: false,
    })
    .unwrap();
    let (sink, seen, eos) = RecordingSink::new("sink");
    p.insert(sink).unwrap();
    p.link("flush:snk:in", "count:src:out").unwrap();
    p.link("sink:snk:in", "flush:src:out").unwrap();

    p.run().unwrap();

    // The graph keeps ticking until the delaying transform finally ends.
    assert_eq!(
        *seen.borrow(),
        vec![json!(1), json!(2), json!(-1), json!(-1), json!(-1)]
    );
    assert_eq!(*eos.borrow(), 1);
}

#[test]
fn test_eos_payload_still_delivered() {
    let mut p = Pipeline::new();
    p.insert(ScriptedSource::new(
        "feed",
        vec![("out", vec![Frame::new(1), Frame::eos_with("bye")])],
    ))
    .unwrap();
    let (sink, seen, eos) = RecordingSink::new("sink");
    p.insert(sink).unwrap();
    p.link("sink:snk:in", "feed:src:out").unwrap();

    p.run().unwrap();

    // The terminal frame's payload arrives with the signal.
    assert_eq!(*seen.borrow(), vec![json!(1), json!("bye")]);
    assert_eq!(*eos.borrow(), 1);
}

#[test]
fn test_independent_edges_deliver_independently() {
    // One short pad and one long pad on the same source: the sink on the
    // short edge sees EOS while the long edge is still flowing.
    let mut p = Pipeline::new();
    p.insert(ScriptedSource::new(
        "feed",
        vec![
            ("short", vec![Frame::new(1)]),
            ("long", (0..6).map(Frame::new).collect()),
        ],
    ))
    .unwrap();
    let (short_sink, seen_s, eos_s) = RecordingSink::new("short_sink");
    let (long_sink, seen_l, eos_l) = RecordingSink::new("long_sink");
    p.insert(short_sink).unwrap();
    p.insert(long_sink).unwrap();
    p.link("short_sink:snk:in", "feed:src:short").unwrap();
    p.link("long_sink:snk:in", "feed:src:long").unwrap();

    p.run().unwrap();

    assert_eq!(*seen_s.borrow(), vec![json!(1)]);
    assert_eq!(*eos_s.borrow(), 1);
    assert_eq!(seen_l.borrow().len(), 6);
    assert_eq!(*eos_l.borrow(), 1);
}

#[test]
fn test_pull_error_is_fatal_with_partial_progress() {
    struct Brittle {
        name: String,
        snks: Vec<String>,
        pulled: std::rc::Rc<std::cell::RefCell<usize>>,
    }

    impl Element for Brittle {
        fn name(&self) -> &str {
            &self.name
        }

        fn sink_pad_names(&self) -> &[String] {
            &self.snks
        }

        fn pull(&mut self, _pad: &mut SinkPad, _frame: Frame) -> Result<(), RillError> {
            let mut count = self.pulled.borrow_mut();
            *count += 1;
            if *count == 3 {
                return Err(RillError::element(self.name.as_str(), "third frame is poison"));
            }
            Ok(())
        }
    }

    let pulled = std::rc::Rc::new(std::cell::RefCell::new(0));
    let mut p = Pipeline::new();
    p.insert(CounterSource::new("count", 10)).unwrap();
    p.insert(Brittle {
        name: "brittle".into(),
        snks: vec!["in".into()],
        pulled: pulled.clone(),
    })
    .unwrap();
    p.link("brittle:snk:in", "count:src:out").unwrap();

    let err = p.run().unwrap_err();
    assert_eq!(err.kind(), RillErrorKind::Element);
    assert!(err.to_string().contains("third frame is poison"));
    // Partial progress happened and is not rolled back.
    assert_eq!(*pulled.borrow(), 3);
}

#[test]
fn test_internal_error_is_fatal() {
    struct BadBookkeeper {
        name: String,
        snks: Vec<String>,
    }

    impl Element for BadBookkeeper {
        fn name(&self) -> &str {
            &self.name
        }

        fn sink_pad_names(&self) -> &[String] {
            &self.snks
        }

        fn pull(&mut self, _pad: &mut SinkPad, _frame: Frame) -> Result<(), RillError> {
            Ok(())
        }

        fn internal(&mut self) -> Result<(), RillError> {
            Err(RillError::element(self.name.as_str(), "ledger out of balance"))
        }
    }

    let mut p = Pipeline::new();
    p.insert(CounterSource::new("count", 3)).unwrap();
    p.insert(BadBookkeeper {
        name: "books".into(),
        snks: vec!["in".into()],
    })
    .unwrap();
    p.link("books:snk:in", "count:src:out").unwrap();

    let err = p.run().unwrap_err();
    assert!(err.to_string().contains("ledger out of balance"));
}

#[test]
fn test_cancellation_from_another_thread() {
    // An endless source: only the cancel token ends the run.
    struct Endless {
        name: String,
        srcs: Vec<String>,
    }

    impl Element for Endless {
        fn name(&self) -> &str {
            &self.name
        }

        fn source_pad_names(&self) -> &[String] {
            &self.srcs
        }

        fn produce(&mut self, _pad: &SourcePad) -> Result<Frame, RillError> {
            Ok(Frame::new(0))
        }
    }

    let mut p = Pipeline::new();
    p.insert(Endless {
        name: "endless".into(),
        srcs: vec!["out".into()],
    })
    .unwrap();
    let (sink, seen, _) = RecordingSink::new("sink");
    p.insert(sink).unwrap();
    p.link("sink:snk:in", "endless:src:out").unwrap();

    let token = p.cancel_token();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        token.cancel();
    });

    p.run().unwrap();
    canceller.join().unwrap();

    // Some frames flowed, then the run stopped without an error.
    assert!(!seen.borrow().is_empty());
    assert!(p.ticks() > 0);
}

#[test]
fn test_mark_eos_makes_pad_inactive() {
    /// Gives up after two frames regardless of upstream state.
    struct Impatient {
        name: String,
        snks: Vec<String>,
        got: usize,
    }

    impl Element for Impatient {
        fn name(&self) -> &str {
            &self.name
        }

        fn sink_pad_names(&self) -> &[String] {
            &self.snks
        }

        fn pull(&mut self, pad: &mut SinkPad, _frame: Frame) -> Result<(), RillError> {
            self.got += 1;
            if self.got >= 2 {
                pad.mark_eos();
            }
            Ok(())
        }
    }

    let mut p = Pipeline::new();
    p.insert(CounterSource::new("count", 4)).unwrap();
    p.insert(Impatient {
        name: "impatient".into(),
        snks: vec!["in".into()],
        got: 0,
    })
    .unwrap();
    p.link("impatient:snk:in", "count:src:out").unwrap();

    p.run().unwrap();
    assert!(p.sink_pad("impatient:snk:in").unwrap().eos_marked());
    assert!(p.sink_pad("impatient:snk:in").unwrap().is_drained());
}
