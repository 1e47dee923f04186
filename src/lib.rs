//! # EmberKV - A Minimal In-Memory Key-Value Server
//!
//! EmberKV is a single-threaded, in-memory key-value store served over
//! a custom length-prefixed binary protocol. It demonstrates systems
//! programming fundamentals: a non-blocking event loop, per-connection
//! state machines, incremental hash-table resizing, and an
//! order-statistics tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           EmberKV                               │
//! │                                                                 │
//! │  ┌────────────┐    ┌──────────────┐    ┌─────────────┐          │
//! │  │ Event Loop │───>│  Connection  │───>│   Command   │          │
//! │  │ (mio Poll) │    │State Machine │    │  Dispatch   │          │
//! │  └────────────┘    └──────┬───────┘    └──────┬──────┘          │
//! │                           │                   │                 │
//! │                           ▼                   ▼                 │
//! │  ┌─────────────┐   ┌─────────────┐    ┌──────────────────────┐  │
//! │  │  RankTree   │   │ Wire Codec  │    │       KeySpace       │  │
//! │  │ (rank ops)  │   │ (framing +  │    │  ┌──────┐ ┌────────┐ │  │
//! │  │             │   │  tagged     │    │  │ live │ │draining│ │  │
//! │  └─────────────┘   │  values)    │    │  └──────┘ └────────┘ │  │
//! │                    └─────────────┘    │   progressive resize │  │
//! │                                       └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! Every message is a frame: `u32 length` (little-endian) followed by
//! that many payload bytes, capped at 4096. A request payload is
//! `u32 argc` then `argc` length-prefixed arguments; a response payload
//! is one tagged value (Nil, Err, Str, Int, or Array).
//!
//! ## Supported Commands
//!
//! - `GET key` - value as Str, or Nil if absent
//! - `SET key value` - upsert, replies Nil
//! - `DEL key` - Int 1 if removed, else Int 0
//! - `KEYS` - Array of every stored key
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame and tagged-value codec
//! - [`commands`]: command dispatch against the key space
//! - [`storage`]: the key space and the order-statistics tree
//! - [`server`]: event loop, connection state machine, I/O buffers
//!
//! ## Design Highlights
//!
//! ### One Thread, No Locks
//!
//! Exactly one thread runs the event loop and touches all state. Socket
//! readiness is multiplexed with `mio::Poll`; every read and write is
//! non-blocking, and "would block" simply parks a connection until the
//! kernel reports it ready again.
//!
//! ### Pauseless Table Growth
//!
//! The key space never rehashes in one go. When it outgrows its bucket
//! array it keeps the old array alongside a doubled one and moves one
//! bucket's chain per operation, so the worst-case cost added to any
//! single call is one short chain.
//!
//! ### Rank Queries
//!
//! [`storage::RankTree`] augments an AVL tree with subtree sizes,
//! answering "k-th smallest" and "rank of value" in `O(log n)` for
//! future sorted collections.

pub mod commands;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use protocol::{FrameError, Response};
pub use server::Server;
pub use storage::{KeySpace, RankTree};

/// The default port EmberKV listens on.
pub const DEFAULT_PORT: u16 = 1234;

/// The default host EmberKV binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
