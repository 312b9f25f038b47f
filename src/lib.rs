#![forbid(unsafe_code)]

//! In-memory order-256 B+ tree mapping 64-bit keys to 64-bit values.
//!
//! Every node occupies one 4096-byte page-aligned block of 512 eight-byte
//! slots, obtained from a pluggable [`BlockAllocator`]. Records live in the
//! leaves, chained in ascending key order; lookups descend the index layers
//! in O(log n). Insertion pre-allocates everything a split cascade could
//! need, so a failed insert leaves the tree untouched, and deletion never
//! allocates. Open [`Cursor`]s survive every structural mutation of the tree
//! they observe.
//!
//! ```
//! use pagetree::BPlusTree;
//!
//! let mut tree = BPlusTree::new()?;
//! tree.insert(1, 10)?;
//! tree.insert(2, 20)?;
//! assert_eq!(tree.get(2), Some(20));
//! assert!(tree.remove(1));
//!
//! let cursor = tree.first_record();
//! assert_eq!(cursor.record(), Some((2, 20)));
//! # Ok::<(), pagetree::TreeError>(())
//! ```

mod alloc;
mod block;
mod cursor;
mod error;
mod stats;
mod tree;

pub mod verify;

pub use alloc::{BlockAllocator, HeapAllocator};
pub use block::{Block, BLOCK_BYTES, HALF, MAX_KEYS, ORDER};
pub use cursor::Cursor;
pub use error::{Result, TreeError};
pub use stats::{ActiveStorage, TreeStats};
pub use tree::BPlusTree;

#[cfg(test)]
mod tests;
