//! Storage Layer
//!
//! In-memory data structures owned by the server thread.
//!
//! - [`keyspace`]: the key space itself — a chained hash table that
//!   resizes progressively, one bucket per call, so no single operation
//!   pays for a full rehash.
//! - [`rank_tree`]: an order-statistics AVL tree, the backing structure
//!   for future ranked collections.
//!
//! Neither structure is synchronized. The whole server is one thread
//! (see [`crate::server`]), so the storage layer is plain mutable state
//! passed down by reference.
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::KeySpace;
//! use bytes::Bytes;
//!
//! let mut db = KeySpace::new();
//! db.insert(Bytes::from("name"), Bytes::from("ember"));
//! assert_eq!(db.get(b"name"), Some(&Bytes::from("ember")));
//! assert_eq!(db.remove(b"name"), Some(Bytes::from("ember")));
//! ```

pub mod keyspace;
pub mod rank_tree;

// Re-export commonly used types
pub use keyspace::KeySpace;
pub use rank_tree::RankTree;
