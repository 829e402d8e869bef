//! In-memory storage adapter.

use std::collections::HashMap;

use crate::block::Block;
use crate::storage::{Address, BlockStorage, StorageError, META, MIN_BLOCK_SIZE};

/// Map-backed storage adapter.
///
/// Addresses are allocated by a monotonic counter starting just past
/// [`META`]. Reading an address that was never written fails, which makes
/// this adapter the stricter of the two and the default for tests.
#[derive(Debug)]
pub struct MemoryStorage {
    blocks: HashMap<Address, Vec<u8>>,
    block_size: usize,
    next_address: Address,
}

impl MemoryStorage {
    /// Create an empty adapter with the given block size.
    pub fn new(block_size: usize) -> Result<Self, StorageError> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(StorageError::InvalidBlockSize(block_size));
        }

        Ok(Self {
            blocks: HashMap::new(),
            block_size,
            next_address: META + 1,
        })
    }

    fn check_writable(&self, address: Address) -> Result<(), StorageError> {
        if address == META || (address > META && address < self.next_address) {
            Ok(())
        } else {
            Err(StorageError::Unallocated(address))
        }
    }
}

impl BlockStorage for MemoryStorage {
    fn get(&mut self, address: Address) -> Result<Block, StorageError> {
        self.blocks
            .get(&address)
            .map(|data| Block::from_vec(data.clone()))
            .ok_or(StorageError::Unallocated(address))
    }

    fn set(&mut self, address: Address, block: &Block) -> Result<(), StorageError> {
        self.check_writable(address)?;
        if block.len() != self.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size,
                actual: block.len(),
            });
        }

        self.blocks.insert(address, block.as_bytes().to_vec());
        Ok(())
    }

    fn malloc(&mut self) -> Result<Address, StorageError> {
        let address = self.next_address;
        self.next_address += 1;
        Ok(address)
    }

    fn size(&self) -> u64 {
        (self.next_address - META - 1) * self.block_size as u64
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}
