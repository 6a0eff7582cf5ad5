//! The worker side of the isolation transport.
//!
//! After the fork, the child process runs the user's worker routine with a
//! [`WorkerContext`]: the input and output queues, the `stop`/`shutdown`
//! flags, the opaque argument map, and the registered shared-memory
//! segments. When the routine returns (or panics) the child reports any
//! failure on the output queue and exits without returning to the parent's
//! code.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::TransportConfig;
use crate::error::RillError;
use crate::frame::Frame;
use crate::transport::queue::{self, QueueReceiver, QueueSender, WireMsg};
use crate::transport::shmem::{ControlRegion, ShmRegistry, ShmSegment};

/// Everything a worker routine gets to work with.
pub struct WorkerContext {
    element: String,
    input: QueueReceiver,
    output: QueueSender,
    control: ControlRegion,
    args: Map<String, Value>,
    shm: ShmRegistry,
    cfg: TransportConfig,
}

impl WorkerContext {
    pub(crate) fn new(
        element: String,
        input: QueueReceiver,
        output: QueueSender,
        control: ControlRegion,
        args: Map<String, Value>,
        shm: ShmRegistry,
        cfg: TransportConfig,
    ) -> Self {
        WorkerContext {
            element,
            input,
            output,
            control,
            args,
            shm,
            cfg,
        }
    }

    /// Name of the hosting element, for diagnostics.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// The opaque argument map given to the builder.
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// A registered shared-memory segment by name.
    pub fn shm(&self, name: &str) -> Option<&ShmSegment> {
        self.shm.get(name)
    }

    pub fn shm_mut(&mut self, name: &str) -> Option<&mut ShmSegment> {
        self.shm.get_mut(name)
    }

    pub fn shm_names(&self) -> Vec<&str> {
        self.shm.names()
    }

    /// Whether the graph asked this worker to cease work.
    pub fn stop_requested(&self) -> bool {
        self.control.stop_requested()
    }

    /// Whether the graph is terminating (error or explicit shutdown).
    pub fn shutdown_requested(&self) -> bool {
        self.control.shutdown_requested()
    }

    /// One bounded wait on the input queue.
    ///
    /// Returns the next `(sink pad short name, frame)` pair, or `None` when
    /// nothing arrived within the configured receive timeout.
    pub fn recv(&mut self) -> Result<Option<(String, Frame)>, RillError> {
        self.recv_within(self.cfg.recv_timeout)
    }

    /// The canonical read loop: wait for the next frame, observing the
    /// control flags between waits.
    ///
    /// Returns `None` once `stop` is set — immediately when only `stop` is
    /// up, or after the input queue has been drained when `shutdown` is set
    /// as well.
    pub fn next_frame(&mut self) -> Result<Option<(String, Frame)>, RillError> {
        loop {
            if self.control.stop_requested() {
                if self.control.shutdown_requested() {
                    // Drain-before-exit: short, non-blocking-ish reads until
                    // the queue is empty.
                    return self.recv_within(Duration::from_millis(10));
                }
                return Ok(None);
            }
            if let Some(pair) = self.recv()? {
                return Ok(Some(pair));
            }
        }
    }

    /// Enqueue a frame for `pad` (a source pad short name) on the output
    /// queue, with the bounded-retry put.
    pub fn send(&mut self, pad: &str, frame: Frame) -> Result<(), RillError> {
        let msg = WireMsg::Frame {
            pad: pad.to_string(),
            frame,
        };
        queue::put_with_retry(&mut self.output, &msg, &self.cfg, &self.element, || false)
    }

    fn recv_within(&mut self, timeout: Duration) -> Result<Option<(String, Frame)>, RillError> {
        match self.input.recv(timeout)? {
            Some(WireMsg::Frame { pad, frame }) => Ok(Some((pad, frame))),
            Some(WireMsg::Error { message }) => Err(RillError::QueueClosed(format!(
                "unexpected error message on input queue: {message}"
            ))),
            None => Ok(None),
        }
    }

    fn report_error(&mut self, message: &str) {
        let msg = WireMsg::Error {
            message: message.to_string(),
        };
        // Best effort: the parent may already be gone.
        let _ = self.output.try_send(&msg, self.cfg.put_timeout);
    }
}

/// Drive the user routine in the child process and never return.
///
/// A returned error or a panic is reported on the output queue so the graph
/// process can raise it from the next `produce`; the exit code carries the
/// same verdict for the join path.
pub(crate) fn run_worker<F>(mut ctx: WorkerContext, f: F) -> !
where
    F: FnOnce(&mut WorkerContext) -> Result<(), RillError>,
{
    let result = catch_unwind(AssertUnwindSafe(|| f(&mut ctx)));
    let code = match result {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            ctx.report_error(&err.to_string());
            1
        }
        Err(panic) => {
            ctx.report_error(&format!("worker panicked: {}", panic_message(&panic)));
            2
        }
    };
    // SAFETY: _exit goes straight to the kernel, skipping atexit handlers
    // and destructors inherited from the parent process image.
    unsafe { nix::libc::_exit(code) }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
