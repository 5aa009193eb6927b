//! Drain Task
//!
//! The single background writer of a link. It owns the transport's write
//! half exclusively and is the only code path that terminates a link because
//! of a transport failure.
//!
//! ## Loop
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   │ wait for next buffer (or close signal)   │◄──┐
//!   └────────────────────┬─────────────────────┘   │
//!                        ▼                         │
//!   ┌──────────────────────────────────────────┐   │
//!   │ still running?  no ──> exit              │   │
//!   └────────────────────┬─────────────────────┘   │
//!                        ▼                         │
//!   ┌──────────────────────────────────────────┐   │
//!   │ write_all under the write deadline,      │   │
//!   │ raced against the close signal           │───┘
//!   └────────────────────┬─────────────────────┘
//!                        │ error
//!                        ▼
//!   latch cause, close queue, spawn close(), exit
//! ```
//!
//! On exit the write half is shut down (bounded by the same deadline) and
//! dropped.

use crate::connection::error::LinkError;
use crate::connection::link::{Connection, Shared};
use crate::connection::stats::LinkStats;
use crate::connection::transport::Transport;
use bytes::Bytes;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace};

/// Resolves once the link's close signal is raised.
///
/// If the signal's sender is gone every handle to the link has been dropped;
/// nobody can close it any more, so this never resolves and the queue is
/// drained to the end instead.
pub(crate) async fn wait_closed(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// The background writer of one link.
pub(crate) struct DrainTask<T> {
    shared: Weak<Shared<T>>,
    writer: WriteHalf<T>,
    outbound: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
    tag: Arc<str>,
    write_deadline: Duration,
    stats: Arc<LinkStats>,
}

impl<T: Transport> DrainTask<T> {
    pub(crate) fn new(
        shared: Weak<Shared<T>>,
        writer: WriteHalf<T>,
        outbound: mpsc::Receiver<Bytes>,
        closed: watch::Receiver<bool>,
        tag: Arc<str>,
        write_deadline: Duration,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            shared,
            writer,
            outbound,
            closed,
            tag,
            write_deadline,
            stats,
        }
    }

    pub(crate) fn spawn(self, runtime: &Handle) {
        runtime.spawn(self.run());
    }

    async fn run(mut self) {
        debug!(link = %self.tag, "Drain task started");

        if let Err(cause) = self.drain().await {
            self.fail(cause);
        }

        // Pending writers see the closed queue once the receiver is gone.
        self.outbound.close();
        match tokio::time::timeout(self.write_deadline, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(link = %self.tag, error = %err, "Write half shutdown failed")
            }
            Err(_) => debug!(link = %self.tag, "Write half shutdown timed out"),
        }
        debug!(link = %self.tag, "Drain task exited");
    }

    /// Moves queued buffers onto the transport until the link stops.
    ///
    /// Returns `Ok` when the link was closed or abandoned, `Err` with the
    /// cause to latch when the transport failed.
    async fn drain(&mut self) -> Result<(), LinkError> {
        let deadline = self.write_deadline;

        loop {
            let buf = tokio::select! {
                biased;
                _ = wait_closed(&mut self.closed) => return Ok(()),
                next = self.outbound.recv() => match next {
                    Some(buf) => buf,
                    None => return Ok(()),
                },
            };

            // Close may have landed since the last write
            if !self.still_running() {
                trace!(link = %self.tag, "Link no longer running, dropping buffer");
                return Ok(());
            }

            let len = buf.len();
            let write = tokio::time::timeout(deadline, write_buffer(&mut self.writer, &buf));
            let result = tokio::select! {
                biased;
                _ = wait_closed(&mut self.closed) => return Ok(()),
                result = write => result,
            };

            match result {
                Ok(Ok(())) => {
                    self.stats.buffer_written(len);
                    trace!(link = %self.tag, bytes = len, "Wrote buffer");
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(LinkError::WriteTimeout(deadline)),
            }
        }
    }

    /// A link whose handles are all gone still counts as running: nobody can
    /// close it, so the queue is flushed.
    fn still_running(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(true, |shared| shared.is_running())
    }

    /// Latches `cause` (unless close got there first) and dispatches an
    /// independent close to release the transport.
    fn fail(&self, cause: LinkError) {
        let Some(shared) = self.shared.upgrade() else {
            debug!(link = %self.tag, error = %cause, "Write failed on abandoned link");
            return;
        };

        if shared.terminate(cause.clone()) {
            if let LinkError::ShortWrite { .. } = cause {
                error!(link = %self.tag, error = %cause, "Transport broke the full-write contract");
            } else {
                error!(link = %self.tag, error = %cause, "Closing link in drain task");
            }
        }

        let link = Connection::from_shared(shared);
        tokio::spawn(async move { link.close() });
    }
}

/// Writes `buf` completely. A transport that accepts zero bytes without an
/// error has stopped making progress; that is reported as a short write.
async fn write_buffer<W>(writer: &mut W, buf: &[u8]) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]).await? {
            0 => {
                return Err(LinkError::ShortWrite {
                    written,
                    expected: buf.len(),
                })
            }
            n => written += n,
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{ScriptedTransport, WireHandle};
    use tokio_test::{assert_err, assert_ok};

    fn split_writer() -> (WriteHalf<ScriptedTransport>, WireHandle) {
        let (transport, wire) = ScriptedTransport::new();
        let (_reader, writer) = tokio::io::split(transport);
        (writer, wire)
    }

    #[tokio::test]
    async fn test_write_buffer_writes_everything() {
        let (mut writer, wire) = split_writer();
        assert_ok!(write_buffer(&mut writer, b"payload").await);
        assert_eq!(wire.chunks(), vec![b"payload".to_vec()]);
    }

    #[tokio::test]
    async fn test_write_buffer_resumes_partial_writes() {
        let (mut writer, wire) = split_writer();
        wire.limit_write_size(3);
        assert_ok!(write_buffer(&mut writer, b"abcdefgh").await);
        assert_eq!(
            wire.chunks(),
            vec![b"abc".to_vec(), b"def".to_vec(), b"gh".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_write_buffer_zero_progress() {
        let (mut writer, wire) = split_writer();
        wire.stall_progress();
        let err = assert_err!(write_buffer(&mut writer, b"abc").await);
        assert!(matches!(
            err,
            LinkError::ShortWrite {
                written: 0,
                expected: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_buffer_is_a_no_op() {
        let (mut writer, wire) = split_writer();
        assert_ok!(write_buffer(&mut writer, b"").await);
        assert_eq!(wire.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_wait_closed_sees_earlier_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        let waited = tokio::time::timeout(Duration::from_millis(100), wait_closed(&mut rx)).await;
        assert!(waited.is_ok());

        // Later calls keep resolving
        let again = tokio::time::timeout(Duration::from_millis(100), wait_closed(&mut rx)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_wait_closed_pends_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_closed(&mut rx)).await;
        assert!(waited.is_err());
    }
}
