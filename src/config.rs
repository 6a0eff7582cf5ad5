//! Tuning knobs for the isolation transport.
//!
//! The in-process scheduler has no configuration of its own — it runs ticks
//! until the graph terminates. Everything here governs the process-hosted
//! side: queue sizing, the bounded timeouts at the two legal suspension
//! points, and how long a worker gets to exit before it is killed.

use std::time::Duration;

/// Configuration for one isolation transport instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Size in bytes of each queue's kernel buffer.
    ///
    /// This is the bound on the input and output queues: once the buffer is
    /// full, puts block and fall into the bounded-retry path. Frames are
    /// small JSON envelopes, so the default of 64 KiB holds hundreds of
    /// in-flight frames.
    pub queue_capacity: usize,

    /// How long one put waits for queue space before counting a retry.
    pub put_timeout: Duration,

    /// How many times a put retries before failing with `QueueFull`.
    ///
    /// The worst-case enqueue latency is `put_timeout * (put_retries + 1)`.
    pub put_retries: u32,

    /// How long one receive waits before re-checking the stop flag.
    ///
    /// Both blocking points (the wrapper's `produce` and the worker's read
    /// loop) wait in slices of this length so a stop request is observed
    /// promptly.
    pub recv_timeout: Duration,

    /// How long to wait for a worker to exit after `stop`/`shutdown` are set
    /// before it is forcibly terminated.
    pub join_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            queue_capacity: 64 * 1024,
            put_timeout: Duration::from_secs(1),
            put_retries: 5,
            recv_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    pub fn with_queue_capacity(mut self, bytes: usize) -> Self {
        self.queue_capacity = bytes;
        self
    }

    pub fn with_put_timeout(mut self, timeout: Duration) -> Self {
        self.put_timeout = timeout;
        self
    }

    pub fn with_put_retries(mut self, retries: u32) -> Self {
        self.put_retries = retries;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }
}
