//! Persistent bulk-loaded B+ tree over block-addressable storage.
//!
//! The tree is built once from a sorted sequence of (key, payload) pairs
//! and is immutable thereafter. It operates entirely through the
//! [`BlockStorage`] trait: fixed-size block reads and writes against
//! opaque addresses.
//!
//! # Block layouts
//!
//! All numeric fields are little-endian u64 unless noted.
//!
//! - **META block** (reserved address 1): root node address, tree height.
//! - **Node block**: entry count, then that many (key, child) pairs sorted
//!   ascending by key.
//! - **Data head block**: next address, total payload length, fragment.
//! - **Data follow block**: next address, fragment.
//!
//! A payload of arbitrary length becomes a chain of data blocks terminated
//! by the `EMPTY` (0) address; index layers are stacked over the chain
//! heads until a single root block remains. The META block is written
//! last, making it the commit point of construction.
//!
//! # Usage
//!
//! ```
//! use blocktree::{MemoryStorage, Tree};
//!
//! let mut storage = MemoryStorage::new(4096)?;
//! let entries = vec![(7, b"seven".to_vec()), (40, b"forty".to_vec())];
//!
//! let mut tree = Tree::bulk_load(&mut storage, &entries)?;
//! assert_eq!(tree.lookup(40)?, Some(b"forty".to_vec()));
//! assert_eq!(tree.lookup(41)?, None);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Forbid unwrap() outside tests so storage corruption surfaces as errors,
// not panics.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod block;
mod chain;
mod meta;
mod node;
mod storage;
mod tree;

pub use block::Block;
pub use chain::{
    blocks_needed, decode_follow, decode_head, encode_follow, encode_head, follow_capacity,
    head_capacity, read_chain, write_chain, ChainError,
};
pub use meta::Meta;
pub use node::{fan_out, Key, NodeBlock, NodeError};
pub use storage::{
    Address, BlockStorage, FileStorage, MemoryStorage, StorageError, EMPTY, FORMAT_VERSION, MAGIC,
    META, MIN_BLOCK_SIZE,
};
pub use tree::{Tree, TreeError};
