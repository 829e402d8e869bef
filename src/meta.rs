//! META block codec.
//!
//! The META block lives at the reserved [`META`](crate::storage::META)
//! address and is the tree's commit point: it is written once, last, after
//! every other block of the tree. It stores the root node address and the
//! number of node levels between the root and the data chains.

use crate::block::Block;
use crate::storage::{Address, BlockStorage, StorageError, EMPTY};

/// META block field offsets.
mod offsets {
    pub const ROOT: usize = 0;
    pub const HEIGHT: usize = 8;
    // remainder of the block: reserved, zeroed
}

/// Decoded contents of the META block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Address of the root node block, or [`EMPTY`] for an empty tree.
    pub root: Address,
    /// Number of node levels a lookup descends before reaching a data
    /// chain head. Zero iff the tree is empty.
    pub height: u64,
}

impl Meta {
    /// Create a meta record.
    #[must_use]
    pub const fn new(root: Address, height: u64) -> Self {
        Self { root, height }
    }

    /// Serialize into a block of the given size.
    #[must_use]
    pub fn to_block(&self, block_size: usize) -> Block {
        let mut block = Block::new(block_size);
        block.write_u64(offsets::ROOT, self.root);
        block.write_u64(offsets::HEIGHT, self.height);
        block
    }

    /// Deserialize from a block. A zeroed block decodes as the empty tree.
    #[must_use]
    pub fn from_block(block: &Block) -> Self {
        Self {
            root: block.read_u64(offsets::ROOT),
            height: block.read_u64(offsets::HEIGHT),
        }
    }

    /// Read the meta record from the storage's reserved block.
    pub fn load<S: BlockStorage>(storage: &mut S) -> Result<Self, StorageError> {
        let address = storage.meta();
        let block = storage.get(address)?;
        Ok(Self::from_block(&block))
    }

    /// Write the meta record to the storage's reserved block.
    pub fn store<S: BlockStorage>(&self, storage: &mut S) -> Result<(), StorageError> {
        let address = storage.meta();
        let block = self.to_block(storage.block_size());
        storage.set(address, &block)
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new(EMPTY, 0)
    }
}
