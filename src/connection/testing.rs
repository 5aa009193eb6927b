//! Test transports and helpers.

use crate::connection::transport::Transport;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds, giving up after two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[derive(Debug, Default)]
struct Wire {
    chunks: Vec<Vec<u8>>,
    inbound: VecDeque<u8>,
    shutdowns: usize,
    dropped: bool,
    fail_with: Option<io::ErrorKind>,
    stall: bool,
    zero_progress: bool,
    max_write: Option<usize>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

/// The test's view of a `ScriptedTransport`.
#[derive(Debug, Clone, Default)]
pub(crate) struct WireHandle(Arc<Mutex<Wire>>);

impl WireHandle {
    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.0.lock().unwrap()
    }

    /// Every successful write call, in order.
    pub(crate) fn chunks(&self) -> Vec<Vec<u8>> {
        self.lock().chunks.clone()
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.lock().chunks.len()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    /// True once both halves of the transport have been dropped.
    pub(crate) fn dropped(&self) -> bool {
        self.lock().dropped
    }

    pub(crate) fn inbound_len(&self) -> usize {
        self.lock().inbound.len()
    }

    pub(crate) fn push_inbound(&self, data: &[u8]) {
        let mut wire = self.lock();
        wire.inbound.extend(data);
        if let Some(waker) = wire.read_waker.take() {
            waker.wake();
        }
    }

    /// Writes hang until unstalled.
    pub(crate) fn set_stall(&self, stall: bool) {
        let mut wire = self.lock();
        wire.stall = stall;
        if !stall {
            if let Some(waker) = wire.write_waker.take() {
                waker.wake();
            }
        }
    }

    pub(crate) fn fail_writes(&self, kind: io::ErrorKind) {
        self.lock().fail_with = Some(kind);
    }

    /// Writes succeed without accepting a single byte.
    pub(crate) fn stall_progress(&self) {
        self.lock().zero_progress = true;
    }

    /// Each write call accepts at most `max` bytes.
    pub(crate) fn limit_write_size(&self, max: usize) {
        self.lock().max_write = Some(max);
    }
}

/// An in-memory transport whose behaviour the test scripts through a
/// `WireHandle`.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    wire: WireHandle,
}

impl ScriptedTransport {
    pub(crate) fn new() -> (Self, WireHandle) {
        let wire = WireHandle::default();
        (Self { wire: wire.clone() }, wire)
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        if let Ok(mut wire) = self.wire.0.lock() {
            wire.dropped = true;
        }
    }
}

impl Transport for ScriptedTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([10, 0, 0, 2], 40000)))
    }
}

impl AsyncRead for ScriptedTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut wire = self.wire.lock();
        if wire.inbound.is_empty() {
            wire.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(wire.inbound.len());
        let data: Vec<u8> = wire.inbound.drain(..n).collect();
        buf.put_slice(&data);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut wire = self.wire.lock();
        if let Some(kind) = wire.fail_with {
            return Poll::Ready(Err(io::Error::new(kind, "scripted write failure")));
        }
        if wire.stall {
            wire.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        if wire.zero_progress {
            return Poll::Ready(Ok(0));
        }
        let n = wire.max_write.map_or(buf.len(), |max| max.min(buf.len()));
        wire.chunks.push(buf[..n].to_vec());
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.wire.lock().shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

/// Scripted mock streams have no socket address.
impl Transport for tokio_test::io::Mock {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mock transport has no local address",
        ))
    }
}
