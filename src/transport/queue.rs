//! Bounded frame queues between the graph process and a worker process.
//!
//! Each queue is one direction of a `UnixStream` socket pair carrying
//! length-prefixed JSON messages: a 4-byte big-endian length, then the
//! serialized [`WireMsg`]. The kernel socket buffer is the queue's bound —
//! once it is full, sends time out and fall into the bounded-retry path.
//!
//! Both endpoints wait in bounded slices (`TransportConfig` timeouts) so
//! stop requests are observed promptly; neither side ever blocks forever.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::sys::socket::{setsockopt, sockopt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::RillError;
use crate::frame::Frame;

/// Hard cap on one message body; anything larger is a codec bug, not data.
const MAX_MSG_LEN: usize = 64 * 1024 * 1024;

/// One message on a transport queue.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum WireMsg {
    /// A frame tagged with the short name of the pad it belongs to.
    Frame { pad: String, frame: Frame },
    /// A worker-side failure, surfaced on the next `produce`.
    Error { message: String },
}

/// Sending half of a queue.
pub(crate) struct QueueSender {
    stream: UnixStream,
    /// Encoded message currently being pushed, with its write offset.
    /// Survives across `try_send` calls so a message larger than the free
    /// buffer space resumes where it left off instead of tearing the frame.
    pending: Vec<u8>,
    pending_off: usize,
}

/// Receiving half of a queue.
pub(crate) struct QueueReceiver {
    stream: UnixStream,
}

/// Create a bounded queue with roughly `capacity` bytes of buffer.
pub(crate) fn frame_queue(capacity: usize) -> Result<(QueueSender, QueueReceiver), RillError> {
    let (tx, rx) =
        UnixStream::pair().map_err(|e| RillError::SpawnError(format!("socketpair: {e}")))?;
    setsockopt(&tx, sockopt::SndBuf, &capacity)
        .map_err(|e| RillError::SpawnError(format!("set queue capacity: {e}")))?;
    setsockopt(&rx, sockopt::RcvBuf, &capacity)
        .map_err(|e| RillError::SpawnError(format!("set queue capacity: {e}")))?;
    Ok((
        QueueSender {
            stream: tx,
            pending: Vec::new(),
            pending_off: 0,
        },
        QueueReceiver { stream: rx },
    ))
}

impl QueueSender {
    /// Try to enqueue one message within `timeout`.
    ///
    /// Returns `Ok(false)` when the queue stayed full for the whole slice.
    /// A partially written message is remembered and resumed on the next
    /// call, so callers must keep retrying the same message until `Ok(true)`
    /// (the [`put_with_retry`] loop does) — the framing is never torn.
    pub fn try_send(&mut self, msg: &WireMsg, timeout: Duration) -> Result<bool, RillError> {
        if self.pending.is_empty() {
            let body = serde_json::to_vec(msg).map_err(|e| RillError::FrameCodec(e.to_string()))?;
            if body.len() > MAX_MSG_LEN {
                return Err(RillError::FrameCodec(format!(
                    "message of {} bytes exceeds the {MAX_MSG_LEN}-byte cap",
                    body.len()
                )));
            }
            self.pending.reserve(4 + body.len());
            self.pending
                .extend_from_slice(&(body.len() as u32).to_be_bytes());
            self.pending.extend_from_slice(&body);
            self.pending_off = 0;
        }

        self.stream
            .set_write_timeout(Some(clamp_timeout(timeout)))
            .map_err(|e| RillError::QueueClosed(e.to_string()))?;

        loop {
            match (&self.stream).write(&self.pending[self.pending_off..]) {
                Ok(0) => return Err(RillError::QueueClosed("peer closed the queue".into())),
                Ok(n) => {
                    self.pending_off += n;
                    if self.pending_off == self.pending.len() {
                        self.pending.clear();
                        self.pending_off = 0;
                        return Ok(true);
                    }
                }
                Err(e) if is_timeout(&e) => return Ok(false),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(RillError::QueueClosed(e.to_string())),
            }
        }
    }
}

impl QueueReceiver {
    /// Dequeue one message, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time, and `QueueClosed`
    /// when the peer is gone.
    pub fn recv(&self, timeout: Duration) -> Result<Option<WireMsg>, RillError> {
        self.stream
            .set_read_timeout(Some(clamp_timeout(timeout)))
            .map_err(|e| RillError::QueueClosed(e.to_string()))?;

        let mut header = [0u8; 4];
        match read_full(&self.stream, &mut header)? {
            ReadOutcome::TimedOutEmpty => return Ok(None),
            ReadOutcome::Eof => {
                return Err(RillError::QueueClosed("peer closed the queue".into()));
            }
            ReadOutcome::Done => {}
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_MSG_LEN {
            return Err(RillError::FrameCodec(format!(
                "message length {len} exceeds the {MAX_MSG_LEN}-byte cap"
            )));
        }
        let mut body = vec![0u8; len];
        match read_full(&self.stream, &mut body)? {
            ReadOutcome::Done => {}
            // A header without its body means the peer died mid-write.
            ReadOutcome::Eof | ReadOutcome::TimedOutEmpty => {
                return Err(RillError::QueueClosed(
                    "peer closed the queue mid-message".into(),
                ));
            }
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RillError::FrameCodec(e.to_string()))
    }
}

enum ReadOutcome {
    /// The whole buffer was filled.
    Done,
    /// Nothing at all arrived within the read timeout.
    TimedOutEmpty,
    /// Clean end of stream before the first byte.
    Eof,
}

/// Fill `buf` from the stream.
///
/// A timeout with zero bytes read is reported as `TimedOutEmpty`; once any
/// byte has arrived the remainder is awaited to completion, because a
/// partially consumed message would desynchronize the framing. Messages are
/// written in one piece by the peer, so the tail arrives promptly or the
/// peer is dead (which surfaces as EOF / connection reset).
fn read_full(mut stream: &UnixStream, buf: &mut [u8]) -> Result<ReadOutcome, RillError> {
    let mut filled = 0;
    loop {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return if filled == 0 {
                    Ok(ReadOutcome::Eof)
                } else {
                    Err(RillError::QueueClosed("peer closed the queue mid-message".into()))
                };
            }
            Ok(n) => {
                filled += n;
                if filled == buf.len() {
                    return Ok(ReadOutcome::Done);
                }
            }
            Err(e) if is_timeout(&e) => {
                if filled == 0 {
                    return Ok(ReadOutcome::TimedOutEmpty);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(RillError::QueueClosed(e.to_string())),
        }
    }
}

/// Enqueue with the configured bounded-retry policy.
///
/// Each attempt waits `put_timeout` for queue space; `should_abort` is
/// checked between attempts so a stop request cuts the wait short.
pub(crate) fn put_with_retry(
    sender: &mut QueueSender,
    msg: &WireMsg,
    cfg: &TransportConfig,
    element: &str,
    should_abort: impl Fn() -> bool,
) -> Result<(), RillError> {
    for attempt in 0..=cfg.put_retries {
        if should_abort() {
            return Err(RillError::QueueClosed(
                "stop requested while enqueueing".into(),
            ));
        }
        if sender.try_send(msg, cfg.put_timeout)? {
            return Ok(());
        }
        debug!(element, attempt, "queue full, retrying");
    }
    Err(RillError::QueueFull {
        element: element.to_string(),
        retries: cfg.put_retries,
    })
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Zero means "no timeout" to the socket API; keep waits strictly bounded.
fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}
