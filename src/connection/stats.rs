//! Link statistics.
//!
//! Counters are plain relaxed atomics. One `LinkStats` may be shared by all
//! links of a session so the session layer can read aggregate numbers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one or more links
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Drain tasks started
    pub links_started: AtomicU64,
    /// Links that reached the terminal state
    pub links_terminated: AtomicU64,
    /// Buffers accepted into an outbound queue
    pub buffers_queued: AtomicU64,
    /// Non-blocking writes rejected because the queue was full
    pub queue_full: AtomicU64,
    /// Blocking writes that had to wait for queue space
    pub blocking_fallbacks: AtomicU64,
    /// Buffers fully written to a transport
    pub buffers_written: AtomicU64,
    /// Total bytes written to transports
    pub bytes_written: AtomicU64,
    /// Total bytes read from transports
    pub bytes_read: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn link_started(&self) {
        self.links_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn link_terminated(&self) {
        self.links_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_queued(&self) {
        self.buffers_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn blocking_fallback(&self) {
        self.blocking_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_written(&self, count: usize) {
        self.buffers_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Links started but not yet terminated.
    pub fn active_links(&self) -> u64 {
        let started = self.links_started.load(Ordering::Relaxed);
        let terminated = self.links_terminated.load(Ordering::Relaxed);
        started.saturating_sub(terminated)
    }
}
