//! Command Processing
//!
//! The dispatch layer between the wire protocol and the storage layer:
//! a decoded argument list goes in, a [`crate::protocol::Response`]
//! comes out.
//!
//! ```text
//! decoded request args
//!        │
//!        ▼
//! ┌─────────────────┐
//! │    dispatch     │  name + arity match
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    KeySpace     │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::dispatch;
