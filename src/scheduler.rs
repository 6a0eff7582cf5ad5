//! The tick driver.
//!
//! A run is a loop of ticks over the validated element order. One tick, per
//! element in topological order:
//!
//! 1. Deliver every pending frame to its sink pad (`pull`), clearing the
//!    one-slot buffer, in sink-pad declaration order.
//! 2. Call `internal()` once.
//! 3. For every source pad that has not sent EOS, call `produce` and route
//!    the frame into every bound sink pad's slot (cloning on fan-out). An
//!    EOS frame marks the pad terminal.
//!
//! Because every upstream `produce` in a tick happens before the downstream
//! `pull` later in the same tick, each slot is filled and emptied within one
//! tick; a write into an occupied slot is a scheduling-invariant failure.
//!
//! The run terminates when every source pad has sent EOS and no sink pad
//! holds an undelivered frame. A fatal error from any hook cancels every
//! transport, then propagates out of `run`. A cancellation request reaches
//! blocked transports first — each polls the token inside its bounded waits
//! and arms its own worker flags — which lets the in-flight tick drain; the
//! scheduler then observes the request between ticks and does not start
//! another one.

use tracing::{debug, info, trace};

use crate::element::Element;
use crate::error::RillError;
use crate::frame::Frame;
use crate::pad::{SinkPad, SourcePad};
use crate::pipeline::Pipeline;

pub(crate) fn run(pipeline: &mut Pipeline) -> Result<(), RillError> {
    let order = pipeline.validate()?;
    debug!(
        order = ?order
            .iter()
            .map(|&i| pipeline.elements[i].name())
            .collect::<Vec<_>>(),
        "execution order"
    );
    info!(elements = order.len(), "pipeline started");

    loop {
        if pipeline.cancel_requested() {
            cancel_all(pipeline);
            info!(ticks = pipeline.ticks, "pipeline cancelled");
            return Ok(());
        }

        if let Err(err) = tick(pipeline, &order) {
            cancel_all(pipeline);
            info!(ticks = pipeline.ticks, kind = %err.kind(), "pipeline failed: {err}");
            return Err(err);
        }
        pipeline.ticks += 1;

        if finished(pipeline) {
            stop_all(pipeline);
            info!(ticks = pipeline.ticks, "pipeline finished");
            return Ok(());
        }
    }
}

/// One full pass over the elements in topological order.
fn tick(pipeline: &mut Pipeline, order: &[usize]) -> Result<(), RillError> {
    let Pipeline {
        elements,
        snks,
        srcs,
        ..
    } = pipeline;

    for &i in order {
        // Step 1: deliver pending frames, sink-pad declaration order.
        for j in 0..snks[i].len() {
            let Some(frame) = snks[i][j].slot.take() else {
                continue;
            };
            let eos = frame.is_eos();
            trace!(pad = %snks[i][j].name(), eos, "pull");
            elements[i].pull(&mut snks[i][j], frame)?;
            if eos {
                snks[i][j].eos_received = true;
            }
        }

        // Step 2: per-tick bookkeeping.
        elements[i].internal()?;

        // Step 3: produce on every live source pad, declaration order.
        for j in 0..srcs[i].len() {
            if srcs[i][j].eos_sent {
                continue;
            }
            let frame = produce_next(elements[i].as_mut(), &srcs[i][j])?;
            let eos = frame.is_eos();
            trace!(pad = %srcs[i][j].name(), eos, "produce");
            route(snks, &srcs[i][j].peers, frame)?;
            if eos {
                srcs[i][j].eos_sent = true;
                debug!(pad = %srcs[i][j].name(), "source pad sent EOS");
            }
        }
    }

    Ok(())
}

/// Ask the element for the next frame on `pad`.
///
/// The terminal check sits here, in front of the hook: every `produce` call
/// goes through this gate, so reaching it with a pad that already sent EOS
/// is a scheduling-invariant failure, not a silent repeat.
fn produce_next(element: &mut dyn Element, pad: &SourcePad) -> Result<Frame, RillError> {
    if pad.eos_sent {
        return Err(RillError::ProduceAfterEos(pad.name().to_string()));
    }
    element.produce(pad)
}

/// Place one produced frame into every bound sink slot.
///
/// The frame moves into the last peer's slot; earlier peers (fan-out) get
/// clones. An unbound source pad drops its frames on the floor.
fn route(
    snks: &mut [Vec<SinkPad>],
    peers: &[crate::pad::SnkKey],
    frame: Frame,
) -> Result<(), RillError> {
    let Some((last, rest)) = peers.split_last() else {
        return Ok(());
    };
    for key in rest {
        place(snks, *key, frame.clone())?;
    }
    place(snks, *last, frame)
}

fn place(
    snks: &mut [Vec<SinkPad>],
    key: crate::pad::SnkKey,
    frame: Frame,
) -> Result<(), RillError> {
    let pad = &mut snks[key.element][key.pad];
    if pad.slot.is_some() {
        return Err(RillError::SlotOccupied(pad.name().to_string()));
    }
    pad.slot = Some(frame);
    Ok(())
}

/// Terminal condition: every source pad EOS-sent, every sink slot empty.
fn finished(pipeline: &Pipeline) -> bool {
    pipeline
        .srcs
        .iter()
        .all(|pads| pads.iter().all(|p| p.eos_sent))
        && pipeline
            .snks
            .iter()
            .all(|pads| pads.iter().all(|p| p.slot.is_none()))
}

fn stop_all(pipeline: &mut Pipeline) {
    for el in &mut pipeline.elements {
        el.on_stop();
    }
}

fn cancel_all(pipeline: &mut Pipeline) {
    for el in &mut pipeline.elements {
        el.on_cancel();
    }
}
