//! The pipeline: element container, edge binding, and validation.
//!
//! A [`Pipeline`] owns its elements; elements' runtime pad state lives in
//! index-aligned tables owned by the pipeline so the scheduler can borrow an
//! element and its pads independently. Edges are declared once with
//! [`link`](Pipeline::link) and are immutable thereafter.
//!
//! Construction errors (duplicate names, double binding, unknown pads) are
//! reported synchronously from `insert`/`link`. Validation — every sink pad
//! bound, graph acyclic — runs at the start of [`run`](Pipeline::run),
//! before any hook is invoked.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::dag::Dag;
use crate::element::Element;
use crate::error::RillError;
use crate::pad::{PadDir, PadName, SinkPad, SnkKey, SourcePad, SrcKey};
use crate::scheduler;

/// Cloneable cancellation handle for a pipeline.
///
/// `cancel()` may be called from any thread (typically a signal handler
/// shim). Every inserted element receives a clone of the token via
/// [`Element::attach_cancel`]: the isolation wrapper polls it between its
/// bounded queue waits and arms its worker's stop+shutdown flags on the
/// first observation, so even a wrapper blocked inside `produce` lets the
/// tick drain. The scheduler itself observes the flag between ticks and
/// does not start another one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A directed acyclic graph of elements, ready to be driven to completion.
#[derive(Default)]
pub struct Pipeline {
    pub(crate) elements: Vec<Box<dyn Element>>,
    pub(crate) by_name: HashMap<String, usize>,
    /// Sink-pad state per element, in declaration order.
    pub(crate) snks: Vec<Vec<SinkPad>>,
    /// Source-pad state per element, in declaration order.
    pub(crate) srcs: Vec<Vec<SourcePad>>,
    /// Upstream element indices per element; filled by validation.
    pub(crate) upstream: Vec<Vec<usize>>,
    /// Downstream element indices per element; filled by validation.
    pub(crate) downstream: Vec<Vec<usize>>,
    pub(crate) ticks: u64,
    pub(crate) cancel: CancelToken,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Cancellation handle; see [`CancelToken`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Add an element to the pipeline.
    ///
    /// Fails with `DuplicateElement` when the name is taken, `InvalidName`
    /// when the element or a pad name cannot be embedded in a full pad name,
    /// and `DuplicatePad` when a short name repeats within one direction.
    pub fn insert(&mut self, element: impl Element + 'static) -> Result<(), RillError> {
        self.insert_boxed(Box::new(element))
    }

    /// Add an element and bind edges in one step.
    ///
    /// Each entry maps a full sink-pad name to a full source-pad name, so an
    /// element can be linked to already-inserted neighbours as it lands.
    pub fn insert_linked(
        &mut self,
        element: impl Element + 'static,
        links: &[(&str, &str)],
    ) -> Result<(), RillError> {
        self.insert_boxed(Box::new(element))?;
        for (snk, src) in links {
            self.link(snk, src)?;
        }
        Ok(())
    }

    fn insert_boxed(&mut self, mut element: Box<dyn Element>) -> Result<(), RillError> {
        let name = element.name().to_string();
        check_name(&name, "element")?;
        if self.by_name.contains_key(&name) {
            return Err(RillError::DuplicateElement(name));
        }

        let mut snks = Vec::new();
        for short in element.sink_pad_names() {
            check_name(short, "pad")?;
            if snks.iter().any(|p: &SinkPad| p.short() == short.as_str()) {
                return Err(RillError::DuplicatePad {
                    element: name,
                    pad: short.clone(),
                });
            }
            snks.push(SinkPad::new(PadName::new(
                name.as_str(),
                PadDir::Snk,
                short.as_str(),
            )));
        }

        let mut srcs = Vec::new();
        for short in element.source_pad_names() {
            check_name(short, "pad")?;
            if srcs.iter().any(|p: &SourcePad| p.short() == short.as_str()) {
                return Err(RillError::DuplicatePad {
                    element: name,
                    pad: short.clone(),
                });
            }
            srcs.push(SourcePad::new(PadName::new(
                name.as_str(),
                PadDir::Src,
                short.as_str(),
            )));
        }

        element.attach_cancel(self.cancel.clone());
        let idx = self.elements.len();
        self.by_name.insert(name, idx);
        self.elements.push(element);
        self.snks.push(snks);
        self.srcs.push(srcs);
        self.upstream.push(Vec::new());
        self.downstream.push(Vec::new());
        Ok(())
    }

    /// Bind an edge: frames produced on `source` are delivered to `sink`.
    ///
    /// Both arguments are full pad names (`<element>:<dir>:<short>`). A sink
    /// pad binds exactly once; a source pad may bind to any number of sinks.
    pub fn link(&mut self, sink: &str, source: &str) -> Result<(), RillError> {
        let snk_name: PadName = sink.parse()?;
        let src_name: PadName = source.parse()?;
        if snk_name.dir() != PadDir::Snk {
            return Err(RillError::InvalidName(format!(
                "link expects a sink pad first, got {snk_name}"
            )));
        }
        if src_name.dir() != PadDir::Src {
            return Err(RillError::InvalidName(format!(
                "link expects a source pad second, got {src_name}"
            )));
        }

        let snk_key = self.resolve_snk(&snk_name)?;
        let src_key = self.resolve_src(&src_name)?;

        let snk = &mut self.snks[snk_key.element][snk_key.pad];
        if snk.peer.is_some() {
            return Err(RillError::PadAlreadyBound(snk_name.to_string()));
        }
        snk.peer = Some(src_key);
        self.srcs[src_key.element][src_key.pad].peers.push(snk_key);
        debug!(sink = %snk_name, source = %src_name, "linked");
        Ok(())
    }

    /// Validate the graph and drive it to completion.
    ///
    /// Returns when every source pad has sent EOS and every sink-pad slot is
    /// empty, or after an orderly cancellation drain. The first fatal error
    /// — validation, invariant, element, or transport — is returned after
    /// cancellation has been propagated to every transport.
    pub fn run(&mut self) -> Result<(), RillError> {
        scheduler::run(self)
    }

    /// Validate bindings and acyclicity; record upstream/downstream sets.
    ///
    /// Returns the element execution order. Called by `run`, and useful on
    /// its own to check a graph without driving it.
    pub fn validate(&mut self) -> Result<Vec<usize>, RillError> {
        for pads in &self.snks {
            for pad in pads {
                if !pad.is_bound() {
                    return Err(RillError::UnlinkedPad(pad.name().to_string()));
                }
            }
        }

        let dag = self.build_dag();
        let order = dag.topological_order()?;
        for idx in 0..self.elements.len() {
            self.upstream[idx] = dag.upstream(idx);
            self.downstream[idx] = dag.downstream(idx);
        }
        Ok(order)
    }

    /// Element names in topological execution order.
    pub fn topological_order(&mut self) -> Result<Vec<String>, RillError> {
        let order = self.validate()?;
        Ok(order
            .into_iter()
            .map(|i| self.elements[i].name().to_string())
            .collect())
    }

    /// Names of all elements, in insertion order.
    pub fn element_names(&self) -> Vec<&str> {
        self.elements.iter().map(|e| e.name()).collect()
    }

    /// Immediate upstream element names. Empty before validation.
    pub fn upstream_of(&self, element: &str) -> Option<Vec<&str>> {
        let idx = *self.by_name.get(element)?;
        Some(
            self.upstream[idx]
                .iter()
                .map(|&i| self.elements[i].name())
                .collect(),
        )
    }

    /// Immediate downstream element names. Empty before validation.
    pub fn downstream_of(&self, element: &str) -> Option<Vec<&str>> {
        let idx = *self.by_name.get(element)?;
        Some(
            self.downstream[idx]
                .iter()
                .map(|&i| self.elements[i].name())
                .collect(),
        )
    }

    /// Look up a sink pad by full name.
    pub fn sink_pad(&self, full: &str) -> Result<&SinkPad, RillError> {
        let name: PadName = full.parse()?;
        let key = self.resolve_snk(&name)?;
        Ok(&self.snks[key.element][key.pad])
    }

    /// Look up a source pad by full name.
    pub fn source_pad(&self, full: &str) -> Result<&SourcePad, RillError> {
        let name: PadName = full.parse()?;
        let key = self.resolve_src(&name)?;
        Ok(&self.srcs[key.element][key.pad])
    }

    /// Render the graph in Graphviz DOT, one edge per pad binding.
    pub fn dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n  rankdir=LR;\n");
        for el in &self.elements {
            let _ = writeln!(out, "  \"{}\";", el.name());
        }
        for (el_idx, pads) in self.srcs.iter().enumerate() {
            for pad in pads {
                for peer in &pad.peers {
                    let snk = &self.snks[peer.element][peer.pad];
                    let _ = writeln!(
                        out,
                        "  \"{}\" -> \"{}\" [label=\"{} -> {}\"];",
                        self.elements[el_idx].name(),
                        self.elements[peer.element].name(),
                        pad.short(),
                        snk.short(),
                    );
                }
            }
        }
        out.push_str("}\n");
        out
    }

    // ── Private helpers ─────────────────────────────────────────────────

    fn build_dag(&self) -> Dag {
        let mut dag = Dag::new();
        for el in &self.elements {
            dag.add_node(el.name());
        }
        for (el_idx, pads) in self.srcs.iter().enumerate() {
            for pad in pads {
                for peer in &pad.peers {
                    dag.add_edge(el_idx, peer.element);
                }
            }
        }
        dag
    }

    fn resolve_snk(&self, name: &PadName) -> Result<SnkKey, RillError> {
        let element = *self
            .by_name
            .get(name.element())
            .ok_or_else(|| RillError::UnknownPad(name.to_string()))?;
        let pad = self.snks[element]
            .iter()
            .position(|p| p.short() == name.short())
            .ok_or_else(|| RillError::UnknownPad(name.to_string()))?;
        Ok(SnkKey { element, pad })
    }

    fn resolve_src(&self, name: &PadName) -> Result<SrcKey, RillError> {
        let element = *self
            .by_name
            .get(name.element())
            .ok_or_else(|| RillError::UnknownPad(name.to_string()))?;
        let pad = self.srcs[element]
            .iter()
            .position(|p| p.short() == name.short())
            .ok_or_else(|| RillError::UnknownPad(name.to_string()))?;
        Ok(SrcKey { element, pad })
    }
}

/// Element and pad short names end up embedded in `<element>:<dir>:<short>`
/// pad names, so they must be non-empty and colon-free.
fn check_name(name: &str, what: &str) -> Result<(), RillError> {
    if name.is_empty() {
        return Err(RillError::InvalidName(format!("empty {what} name")));
    }
    if name.contains(':') {
        return Err(RillError::InvalidName(format!(
            "{what} name {name:?} must not contain ':'"
        )));
    }
    Ok(())
}
