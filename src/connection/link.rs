//! Link Engine
//!
//! A `Connection` wraps one physical byte stream of a multipath session.
//! Many producers enqueue outbound buffers without blocking, one background
//! drain task moves them onto the wire, and either side may tear the link
//! down at any time.
//!
//! ## Link Lifecycle
//!
//! ```text
//! 1. Dialer/acceptor hands over a transport
//!        │
//!        ▼
//! 2. Idle ── no queue, no task, write half parked in the state
//!        │
//!        │ first try_write()/write()
//!        ▼
//! 3. Running ── bounded queue (4) ──> drain task ──> transport
//!        │
//!        │ transport write fails, or close()
//!        ▼
//! 4. Terminated(cause) ── every call returns the latched cause
//! ```
//!
//! ## Locking
//!
//! One mutex guards the state: the phase, the latched cause and the queue
//! sender. It is held for transitions and for the non-blocking enqueue only,
//! never across an await. The blocking write path clones the sender out of
//! the lock and waits on the queue itself; if the link closes meanwhile the
//! send fails and the caller gets the latched cause.

use crate::connection::config::LinkConfig;
use crate::connection::drain::{wait_closed, DrainTask};
use crate::connection::error::LinkError;
use crate::connection::stats::LinkStats;
use crate::connection::transport::Transport;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// The local network interface a link was dialed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name, e.g. `eth0`
    pub label: String,
    /// Numeric interface identifier
    pub id: u64,
}

impl Interface {
    /// Creates an interface description from its name and numeric id.
    pub fn new(label: impl Into<String>, id: u64) -> Self {
        Self {
            label: label.into(),
            id,
        }
    }
}

/// Observable lifecycle phase of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Drain task not started yet
    Idle,
    /// Drain task active, queue accepting
    Running,
    /// Terminal; the cause is latched
    Terminated,
}

pub(crate) enum LinkState<T> {
    Idle { writer: WriteHalf<T> },
    Running { queue: mpsc::Sender<Bytes> },
    Terminated { cause: LinkError },
}

impl<T> LinkState<T> {
    fn phase(&self) -> LinkPhase {
        match self {
            LinkState::Idle { .. } => LinkPhase::Idle,
            LinkState::Running { .. } => LinkPhase::Running,
            LinkState::Terminated { .. } => LinkPhase::Terminated,
        }
    }
}

/// State shared by every handle of one link and, weakly, by its drain task.
pub(crate) struct Shared<T> {
    state: Mutex<LinkState<T>>,
    reader: tokio::sync::Mutex<Option<ReadHalf<T>>>,
    closed: watch::Sender<bool>,
    interface: Option<Interface>,
    local_addr: Option<SocketAddr>,
    tag: Arc<str>,
    config: LinkConfig,
    stats: Arc<LinkStats>,
}

impl<T> Shared<T> {
    fn lock_state(&self) -> MutexGuard<'_, LinkState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.lock_state(), LinkState::Running { .. })
    }

    fn cause(&self) -> Option<LinkError> {
        match &*self.lock_state() {
            LinkState::Terminated { cause } => Some(cause.clone()),
            _ => None,
        }
    }

    /// Moves the link to Terminated with `cause` unless a cause is already
    /// latched. Dropping the queue sender here closes the queue.
    ///
    /// Returns true if this call latched the cause.
    pub(crate) fn terminate(&self, cause: LinkError) -> bool {
        let mut state = self.lock_state();
        Self::terminate_locked(&mut state, cause, &self.stats)
    }

    fn terminate_locked(state: &mut LinkState<T>, cause: LinkError, stats: &LinkStats) -> bool {
        match state {
            LinkState::Terminated { .. } => false,
            LinkState::Running { .. } => {
                stats.link_terminated();
                *state = LinkState::Terminated { cause };
                true
            }
            LinkState::Idle { .. } => {
                *state = LinkState::Terminated { cause };
                true
            }
        }
    }
}

/// Outcome of a non-blocking enqueue attempt.
enum Enqueue {
    Accepted,
    Full(Bytes, mpsc::Sender<Bytes>),
}

/// Handle to one physical link.
///
/// Cloning is cheap and every clone refers to the same link. The drain task
/// keeps only a weak reference: once every handle is gone the queue closes,
/// the task flushes what is left and shuts the transport down.
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Connection<T> {
    /// Wraps a transport accepted from a listener. Accept-side links have no
    /// interface.
    pub fn accepted(transport: T) -> Self {
        Self::with_config(
            transport,
            None,
            LinkConfig::default(),
            Arc::new(LinkStats::new()),
        )
    }

    /// Wraps a transport dialed from the given local interface.
    pub fn dialed(transport: T, interface: Interface) -> Self {
        Self::with_config(
            transport,
            Some(interface),
            LinkConfig::default(),
            Arc::new(LinkStats::new()),
        )
    }

    /// Wraps a transport with explicit configuration and a stats sink that
    /// may be shared with the other links of a session.
    pub fn with_config(
        transport: T,
        interface: Option<Interface>,
        config: LinkConfig,
        stats: Arc<LinkStats>,
    ) -> Self {
        let local_addr = transport.local_addr().ok();
        let tag: Arc<str> = match (&interface, local_addr) {
            (Some(iface), _) => format!("{}#{}", iface.label, iface.id).into(),
            (None, Some(addr)) => addr.to_string().into(),
            (None, None) => "link".into(),
        };
        let (reader, writer) = tokio::io::split(transport);
        let (closed, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState::Idle { writer }),
                reader: tokio::sync::Mutex::new(Some(reader)),
                closed,
                interface,
                local_addr,
                tag,
                config,
                stats,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Reads whatever the transport has available.
    ///
    /// Returns the latched cause instead of touching the transport once the
    /// link has terminated. A close while the read is pending interrupts it.
    /// A single reader per link is assumed.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.check_open()?;

        let mut reader = self.shared.reader.lock().await;
        let mut closed = self.shared.closed.subscribe();
        let outcome = match reader.as_mut() {
            Some(half) => tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => None,
                result = half.read(buf) => Some(result),
            },
            None => None,
        };

        match outcome {
            Some(result) => {
                let n = result?;
                self.shared.stats.bytes_read(n);
                trace!(link = %self.shared.tag, bytes = n, "Read data");
                Ok(n)
            }
            None => {
                reader.take();
                Err(self.latched_cause())
            }
        }
    }

    /// Fills `buf` completely from the transport.
    pub async fn read_full(&self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.check_open()?;

        let mut reader = self.shared.reader.lock().await;
        let mut closed = self.shared.closed.subscribe();
        let outcome = match reader.as_mut() {
            Some(half) => tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => None,
                result = half.read_exact(buf) => Some(result),
            },
            None => None,
        };

        match outcome {
            Some(result) => {
                let n = result?;
                self.shared.stats.bytes_read(n);
                trace!(link = %self.shared.tag, bytes = n, "Read full buffer");
                Ok(())
            }
            None => {
                reader.take();
                Err(self.latched_cause())
            }
        }
    }

    /// Queues `buf` without waiting.
    ///
    /// Starts the drain task on first use. Returns `Ok(false)` when the queue
    /// is full: that is backpressure, not a failure. Starting the link needs
    /// a Tokio runtime; without one the call fails with `InvalidState` and
    /// the link stays Idle.
    pub fn try_write(&self, buf: impl Into<Bytes>) -> Result<bool, LinkError> {
        match self.enqueue(buf.into())? {
            Enqueue::Accepted => Ok(true),
            Enqueue::Full(..) => {
                self.shared.stats.queue_full();
                Ok(false)
            }
        }
    }

    /// Queues `buf`, waiting for queue space if necessary.
    ///
    /// The wait has no timeout. A close during the wait ends it with the
    /// latched cause. `Ok` means the buffer was queued: a close that lands
    /// afterwards may still discard it before it reaches the wire.
    pub async fn write(&self, buf: impl Into<Bytes>) -> Result<(), LinkError> {
        let (buf, queue) = match self.enqueue(buf.into())? {
            Enqueue::Accepted => return Ok(()),
            Enqueue::Full(buf, queue) => (buf, queue),
        };

        self.check_open()?;
        self.shared.stats.blocking_fallback();
        debug!(link = %self.shared.tag, "Had to fall back to blocking write");

        match queue.send(buf).await {
            Ok(()) => {
                self.shared.stats.buffer_queued();
                Ok(())
            }
            Err(_) => {
                trace!(link = %self.shared.tag, "Queue closed during blocking write");
                Err(self.latched_cause())
            }
        }
    }

    /// Closes the link. Idempotent and safe from any context.
    ///
    /// Latches `CloseRequested` unless a transport failure got there first,
    /// wakes the drain task and releases the transport.
    pub fn close(&self) {
        let latched = {
            let mut state = self.shared.lock_state();
            if let LinkState::Running { queue } = &*state {
                // A full queue means the drain task is awake already.
                let _ = queue.try_send(Bytes::new());
            }
            Shared::terminate_locked(&mut state, LinkError::CloseRequested, &self.shared.stats)
        };

        self.shared.closed.send_replace(true);

        // An in-flight read drops the half itself once it sees the signal.
        if let Ok(mut reader) = self.shared.reader.try_lock() {
            reader.take();
        }

        if latched {
            debug!(link = %self.shared.tag, "Link closed by request");
        }
    }

    /// Local address of the transport.
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        self.shared
            .local_addr
            .ok_or(LinkError::InvalidState("transport has no local address"))
    }

    /// Name of the interface this link was dialed from.
    ///
    /// Accept-side links never know it and fail with `InvalidState`.
    pub fn interface_label(&self) -> Result<&str, LinkError> {
        self.shared
            .interface
            .as_ref()
            .map(|iface| iface.label.as_str())
            .ok_or(LinkError::InvalidState(
                "interface label is unknown on the accepting side",
            ))
    }

    /// Numeric identifier of the interface this link was dialed from.
    pub fn interface_id(&self) -> Option<u64> {
        self.shared.interface.as_ref().map(|iface| iface.id)
    }

    /// The interface this link was dialed from, if any.
    pub fn interface(&self) -> Option<&Interface> {
        self.shared.interface.as_ref()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LinkPhase {
        self.shared.lock_state().phase()
    }

    /// True once a termination cause is latched.
    pub fn is_terminated(&self) -> bool {
        self.phase() == LinkPhase::Terminated
    }

    /// The latched termination cause, if the link has terminated.
    pub fn termination_cause(&self) -> Option<LinkError> {
        self.shared.cause()
    }

    /// Counters this link reports into.
    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.shared.stats
    }

    /// Configuration the link was built with.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    fn check_open(&self) -> Result<(), LinkError> {
        match self.shared.cause() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    fn latched_cause(&self) -> LinkError {
        self.shared.cause().unwrap_or(LinkError::CloseRequested)
    }

    /// Starts the drain task if needed and tries to queue `buf`, all under
    /// the state lock. Nothing in here waits.
    fn enqueue(&self, buf: Bytes) -> Result<Enqueue, LinkError> {
        let mut state = self.shared.lock_state();
        if matches!(*state, LinkState::Idle { .. }) {
            // Resolved before leaving Idle so a missing runtime changes nothing.
            let runtime = Handle::try_current()
                .map_err(|_| LinkError::InvalidState("no Tokio runtime to start the link"))?;
            self.start(&mut state, &runtime);
        }

        let queue = match &*state {
            LinkState::Running { queue } => queue,
            LinkState::Terminated { cause } => return Err(cause.clone()),
            LinkState::Idle { .. } => return Err(LinkError::InvalidState("link failed to start")),
        };

        match queue.try_send(buf) {
            Ok(()) => {
                self.shared.stats.buffer_queued();
                Ok(Enqueue::Accepted)
            }
            Err(TrySendError::Full(buf)) => Ok(Enqueue::Full(buf, queue.clone())),
            Err(TrySendError::Closed(_)) => {
                warn!(link = %self.shared.tag, "Outbound queue closed while running");
                Shared::terminate_locked(&mut state, LinkError::QueueClosed, &self.shared.stats);
                Err(LinkError::QueueClosed)
            }
        }
    }

    /// Idle -> Running. The caller holds the state lock, so at most one
    /// drain task is ever spawned.
    fn start(&self, state: &mut LinkState<T>, runtime: &Handle) {
        let (queue, outbound) = mpsc::channel(self.shared.config.effective_capacity());
        let LinkState::Idle { writer } = std::mem::replace(state, LinkState::Running { queue })
        else {
            return;
        };

        self.shared.stats.link_started();
        DrainTask::new(
            Arc::downgrade(&self.shared),
            writer,
            outbound,
            self.shared.closed.subscribe(),
            Arc::clone(&self.shared.tag),
            self.shared.config.write_deadline,
            Arc::clone(&self.shared.stats),
        )
        .spawn(runtime);
    }
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("link", &self.shared.tag)
            .field("interface", &self.shared.interface)
            .field("phase", &self.shared.lock_state().phase())
            .finish()
    }
}

impl<T> fmt::Display for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shared.tag)
    }
}
