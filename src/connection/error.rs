//! Link Errors
//!
//! Every failure a link can report. The first transport failure (or an
//! explicit close) is latched as the link's termination cause and handed
//! back to every later caller, so the type is cheaply cloneable: I/O errors
//! are kept behind an `Arc`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur on a link.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    /// Transport I/O failure (network issue)
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// A single transport write exceeded the write deadline
    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    /// The transport stopped making progress without reporting an error
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The link was closed by an explicit request
    #[error("close requested")]
    CloseRequested,

    /// The caller asked for something this link cannot answer
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The outbound queue closed while the link still looked alive
    #[error("outbound queue closed")]
    QueueClosed,
}

impl LinkError {
    /// Returns the I/O error kind for transport failures, `None` otherwise.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            LinkError::Io(err) => Some(err.kind()),
            LinkError::WriteTimeout(_) => Some(io::ErrorKind::TimedOut),
            _ => None,
        }
    }

    /// True for the distinguished explicit-close cause.
    pub fn is_close_requested(&self) -> bool {
        matches!(self, LinkError::CloseRequested)
    }
}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        LinkError::Io(Arc::new(err))
    }
}
