//! Process-hosted elements.
//!
//! An [`Isolate`] presents the ordinary element contract to the graph while
//! its actual work runs in a forked worker process. Frames delivered to the
//! wrapper's sink pads are enqueued to the worker; frames for its source
//! pads are dequeued from the worker, with every wait bounded, observing the
//! `stop` flag and the pipeline's cancellation token between slices — a
//! cancel fired from another thread releases a blocked wrapper without
//! waiting for the scheduler to come back around.
//!
//! The wrapper is a scoped resource. Construction spawns the worker and
//! creates the shared-memory segments; on drop — normal completion, error
//! unwind, whatever — it sets `shutdown` and `stop`, joins the worker with a
//! bounded timeout, kills it past the timeout, and unlinks every segment.
//! All of that is idempotent.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::element::Element;
use crate::error::RillError;
use crate::frame::Frame;
use crate::pad::{SinkPad, SourcePad};
use crate::pipeline::CancelToken;
use crate::transport::queue::{self, QueueReceiver, QueueSender, WireMsg};
use crate::transport::shmem::{ControlRegion, ShmRegistry};
use crate::transport::worker::{self, WorkerContext};

/// Builder for a process-hosted element.
///
/// ```no_run
/// # use rill::{IsolateBuilder, Frame};
/// # fn main() -> Result<(), rill::RillError> {
/// let isolate = IsolateBuilder::new("square")
///     .sink_pads(["in"])
///     .source_pads(["out"])
///     .spawn(|ctx| {
///         while let Some((_pad, frame)) = ctx.next_frame()? {
///             if frame.is_eos() {
///                 ctx.send("out", Frame::eos())?;
///                 break;
///             }
///             let n = frame.payload().and_then(|v| v.as_i64()).unwrap_or(0);
///             ctx.send("out", Frame::new(n * n))?;
///         }
///         Ok(())
///     })?;
/// # Ok(()) }
/// ```
pub struct IsolateBuilder {
    name: String,
    srcs: Vec<String>,
    snks: Vec<String>,
    args: Map<String, Value>,
    shm: Vec<(String, Vec<u8>)>,
    cfg: TransportConfig,
}

impl IsolateBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        IsolateBuilder {
            name: name.into(),
            srcs: Vec::new(),
            snks: Vec::new(),
            args: Map::new(),
            shm: Vec::new(),
            cfg: TransportConfig::default(),
        }
    }

    /// Source pad short names, in declaration order.
    pub fn source_pads<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.srcs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sink pad short names, in declaration order.
    pub fn sink_pads<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.snks = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add an entry to the opaque argument map handed to the worker.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Register a named shared-memory segment, created before the worker
    /// spawns and initialized with `bytes`.
    pub fn to_shm(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.shm.push((name.into(), bytes.into()));
        self
    }

    pub fn config(mut self, cfg: TransportConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Create the shared state, fork, and run `worker` in the child.
    ///
    /// The worker routine runs once in the child process with a
    /// [`WorkerContext`]; when it returns the child exits. The parent gets
    /// the in-graph wrapper element.
    pub fn spawn<F>(self, worker: F) -> Result<Isolate, RillError>
    where
        F: FnOnce(&mut WorkerContext) -> Result<(), RillError>,
    {
        let tag = Uuid::new_v4().simple().to_string();
        let control = ControlRegion::create(&tag)?;
        let mut registry = ShmRegistry::new(&tag);
        for (name, bytes) in &self.shm {
            registry.register(name, bytes)?;
        }
        let (in_tx, in_rx) = queue::frame_queue(self.cfg.queue_capacity)?;
        let (out_tx, out_rx) = queue::frame_queue(self.cfg.queue_capacity)?;

        // SAFETY: the scheduler is single-threaded by design; the child only
        // touches state constructed above and leaves via _exit, never
        // returning into the parent's code.
        match unsafe { fork() }.map_err(|e| RillError::SpawnError(e.to_string()))? {
            ForkResult::Child => {
                drop(in_tx);
                drop(out_rx);
                registry.disown();
                let ctx = WorkerContext::new(
                    self.name, in_rx, out_tx, control, self.args, registry, self.cfg,
                );
                worker::run_worker(ctx, worker)
            }
            ForkResult::Parent { child } => {
                drop(in_rx);
                drop(out_tx);
                info!(element = %self.name, pid = child.as_raw(), "isolated worker spawned");
                let inbox = self
                    .srcs
                    .iter()
                    .map(|s| (s.clone(), VecDeque::new()))
                    .collect();
                Ok(Isolate {
                    name: self.name,
                    srcs: self.srcs,
                    snks: self.snks,
                    child: Some(child),
                    input: in_tx,
                    output: out_rx,
                    control,
                    registry,
                    inbox,
                    worker_error: None,
                    cancel: None,
                    cfg: self.cfg,
                })
            }
        }
    }
}

/// The in-graph wrapper around a worker process.
pub struct Isolate {
    name: String,
    srcs: Vec<String>,
    snks: Vec<String>,
    child: Option<Pid>,
    input: QueueSender,
    output: QueueReceiver,
    control: ControlRegion,
    registry: ShmRegistry,
    /// Frames that arrived for a source pad other than the one being asked.
    inbox: HashMap<String, VecDeque<Frame>>,
    /// Sticky first worker failure; every later `produce` re-raises it.
    worker_error: Option<String>,
    /// The owning pipeline's cancellation token, attached at insert.
    cancel: Option<CancelToken>,
    cfg: TransportConfig,
}

impl Isolate {
    /// PID of the worker while it has not been joined.
    pub fn child_id(&self) -> Option<i32> {
        self.child.map(|p| p.as_raw())
    }

    /// Backing-file path of a registered segment, while it exists.
    pub fn segment_path(&self, name: &str) -> Option<PathBuf> {
        self.registry.get(name).map(|s| s.path().to_path_buf())
    }

    /// Tear the transport down now instead of at drop. Idempotent.
    ///
    /// Sets `shutdown` and `stop`, joins the worker within the configured
    /// timeout, force-terminates it past that, and unlinks every segment.
    pub fn shutdown_now(&mut self) {
        self.control.set_shutdown();
        self.control.set_stop();
        if let Some(pid) = self.child.take() {
            let deadline = Instant::now() + self.cfg.join_timeout;
            loop {
                match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => {
                        if Instant::now() >= deadline {
                            warn!(
                                element = %self.name,
                                pid = pid.as_raw(),
                                "worker exceeded join timeout, killing"
                            );
                            let _ = kill(pid, Signal::SIGKILL);
                            let _ = waitpid(pid, None);
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Ok(_) => break,
                    Err(_) => break,
                }
            }
        }
        self.registry.release();
    }

    /// Non-blocking check whether the worker has exited; reaps it if so.
    fn try_wait(&mut self) -> Option<String> {
        let pid = self.child?;
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(WaitStatus::Exited(_, code)) => {
                self.child = None;
                Some(format!("exit code {code}"))
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                self.child = None;
                Some(format!("signal {sig}"))
            }
            Ok(_) => None,
            Err(_) => {
                self.child = None;
                Some("already reaped".into())
            }
        }
    }

    fn fail(&mut self, message: String) -> RillError {
        self.worker_error = Some(message.clone());
        RillError::WorkerFailed {
            element: self.name.clone(),
            message,
        }
    }

    /// Check for a pending teardown, arming the worker flags on the first
    /// observation of a cancellation — the propagation order is signal the
    /// transport, then let the tick drain.
    ///
    /// Returns true once the transport is stopping, whether by cancellation
    /// or because `stop` was set directly.
    fn shutdown_observed(&self) -> bool {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            self.control.set_shutdown();
            self.control.set_stop();
        }
        self.control.stop_requested()
    }

    /// The worker's side of a queue is closed: prefer the error it reported
    /// on the output queue over a bare exit status.
    fn classify_dead_worker(&mut self) -> RillError {
        loop {
            match self.output.recv(Duration::from_millis(10)) {
                Ok(Some(WireMsg::Error { message })) => return self.fail(message),
                // Skip any frames still buffered ahead of the error report.
                Ok(Some(WireMsg::Frame { .. })) => {}
                Ok(None) | Err(_) => break,
            }
        }
        let status = self.try_wait().unwrap_or_else(|| "queue closed".into());
        RillError::WorkerGone {
            element: self.name.clone(),
            status,
        }
    }
}

impl Element for Isolate {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_pad_names(&self) -> &[String] {
        &self.srcs
    }

    fn sink_pad_names(&self) -> &[String] {
        &self.snks
    }

    /// Enqueue the frame to the worker, tagged with the sink pad short name.
    ///
    /// During teardown the frame is dropped instead: the worker is exiting
    /// and an undeliverable frame must not fail an orderly cancellation.
    fn pull(&mut self, pad: &mut SinkPad, frame: Frame) -> Result<(), RillError> {
        if self.shutdown_observed() {
            return Ok(());
        }
        let eos = frame.is_eos();
        let msg = WireMsg::Frame {
            pad: pad.short().to_string(),
            frame,
        };
        let put = queue::put_with_retry(&mut self.input, &msg, &self.cfg, &self.name, || {
            self.control.stop_requested()
                || self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
        });
        match put {
            Ok(()) => {
                if eos {
                    pad.mark_eos();
                }
                Ok(())
            }
            // The put was cut short by a teardown that started mid-wait.
            Err(RillError::QueueClosed(_)) if self.shutdown_observed() => Ok(()),
            // A closed input queue means the worker is gone; surface what it
            // left on the output queue instead of the raw pipe error.
            Err(RillError::QueueClosed(_)) => Err(self.classify_dead_worker()),
            Err(other) => Err(other),
        }
    }

    /// Dequeue the next frame for `pad` from the worker.
    ///
    /// Waits in bounded slices, re-checking the teardown flags and worker
    /// liveness between them; a cancellation observed mid-wait ends the pad
    /// with a synthesized EOS so the tick drains. Frames for other source
    /// pads are parked in a per-pad inbox and handed out by their own
    /// `produce` calls. A worker error is raised here and sticks.
    fn produce(&mut self, pad: &SourcePad) -> Result<Frame, RillError> {
        if let Some(message) = self.worker_error.clone() {
            return Err(RillError::WorkerFailed {
                element: self.name.clone(),
                message,
            });
        }
        if let Some(frame) = self
            .inbox
            .get_mut(pad.short())
            .and_then(|q| q.pop_front())
        {
            return Ok(frame);
        }

        loop {
            if self.shutdown_observed() {
                // Orderly shutdown: end this pad so the graph can drain.
                return Ok(Frame::eos());
            }
            match self.output.recv(self.cfg.recv_timeout) {
                Ok(Some(WireMsg::Frame { pad: from, frame })) => {
                    if from == pad.short() {
                        return Ok(frame);
                    }
                    self.inbox.entry(from).or_default().push_back(frame);
                }
                Ok(Some(WireMsg::Error { message })) => {
                    return Err(self.fail(message));
                }
                Ok(None) => {
                    if let Some(status) = self.try_wait() {
                        return Err(RillError::WorkerGone {
                            element: self.name.clone(),
                            status,
                        });
                    }
                }
                Err(RillError::QueueClosed(_)) => return Err(self.classify_dead_worker()),
                Err(other) => return Err(other),
            }
        }
    }

    fn attach_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    fn on_stop(&mut self) {
        self.control.set_stop();
    }

    fn on_cancel(&mut self) {
        self.control.set_shutdown();
        self.control.set_stop();
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
