//! Link Management Module
//!
//! This module owns one physical link of a multipath session: the
//! connection state machine, the bounded outbound queue and the background
//! drain task that moves queued buffers onto the wire.
//!
//! ## Architecture
//!
//! ```text
//!   producers (any task)                 single reader
//!   try_write() / write()                read() / read_full()
//!          │                                    ▲
//!          ▼                                    │
//! ┌─────────────────────────────────────────────┼───────────────┐
//! │                  Connection                 │               │
//! │                                             │               │
//! │  ┌───────────────┐    ┌──────────────┐   ┌──┴───────────┐   │
//! │  │ state (mutex) │    │ queue (cap 4)│   │  read half   │   │
//! │  │ Idle/Running/ │    └──────┬───────┘   └──────────────┘   │
//! │  │ Terminated    │           │                              │
//! │  └───────────────┘           ▼                              │
//! │                      ┌──────────────┐    ┌──────────────┐   │
//! │                      │  drain task  │───>│  write half  │   │
//! │                      └──────────────┘    └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy start**: no queue and no task until the first write
//! - **Backpressure**: `try_write` reports a full queue instead of waiting
//! - **Latched cause**: the first failure or close reason sticks
//! - **Safe teardown**: `close` is idempotent and always effective
//!
//! ## Example
//!
//! ```ignore
//! use multilink::connection::{Connection, Interface};
//! use tokio::net::TcpStream;
//!
//! let stream = TcpStream::connect("203.0.113.7:5022").await?;
//! let link = Connection::dialed(stream, Interface::new("wlan0", 3));
//!
//! if !link.try_write(&b"frame"[..])? {
//!     link.write(&b"frame"[..]).await?;
//! }
//! link.close();
//! ```

pub mod config;
mod drain;
pub mod error;
pub mod link;
pub mod stats;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{LinkConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_DEADLINE};
pub use error::LinkError;
pub use link::{Connection, Interface, LinkPhase};
pub use stats::LinkStats;
pub use transport::Transport;
