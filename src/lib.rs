//! # multilink - Per-Link Engine for a Multipath Tunnel
//!
//! A multipath tunnel dials one logical session over several physical links,
//! one per local interface. This crate is the piece that manages a single
//! link: it takes an established byte stream and lets any number of producers
//! queue outbound data without blocking, while one background task writes it
//! to the wire and the link can be torn down from either side at any time.
//!
//! Interface discovery, dialing, accept loops and session multiplexing live in
//! the layers above; they hand this crate a ready transport.
//!
//! ## Quick Start
//!
//! ```ignore
//! use multilink::{Connection, Interface};
//! use tokio::net::{TcpListener, TcpStream};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:5022").await?;
//!
//!     let stream = TcpStream::connect("127.0.0.1:5022").await?;
//!     let dialed = Connection::dialed(stream, Interface::new("lo", 1));
//!
//!     let (stream, _) = listener.accept().await?;
//!     let accepted = Connection::accepted(stream);
//!
//!     dialed.write(&b"hello"[..]).await?;
//!
//!     let mut buf = [0u8; 5];
//!     accepted.read_full(&mut buf).await?;
//!
//!     dialed.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Design Highlights
//!
//! ### One Lock, Short Critical Sections
//!
//! The lifecycle (Idle, Running, Terminated) is a tagged state behind one
//! mutex. It is never held across an await, so writers cannot deadlock
//! against the drain task.
//!
//! ### Closed Queues Fail Gracefully
//!
//! A writer waiting for queue space while the link closes gets the latched
//! cause back from the failed send. Nothing panics.
//!
//! ### Bounded Writes
//!
//! Every transport write runs under a deadline (15 seconds by default) and
//! races the close signal, so an explicit close always takes effect.

pub mod connection;

// Re-export commonly used types for convenience
pub use connection::{
    Connection, Interface, LinkConfig, LinkError, LinkPhase, LinkStats, Transport,
};

/// Version of multilink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
