//! Link configuration.

use std::time::Duration;

/// Number of buffers the outbound queue holds before writers see backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Upper bound on a single transport write.
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(15);

/// Configuration for a single link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Capacity of the outbound queue (default: 4, minimum: 1)
    pub queue_capacity: usize,

    /// Deadline armed before every transport write (default: 15s)
    pub write_deadline: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_deadline: DEFAULT_WRITE_DEADLINE,
        }
    }
}

impl LinkConfig {
    /// Queue capacity as handed to the channel, which rejects zero.
    pub(crate) fn effective_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
