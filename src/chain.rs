//! Data chains: payloads stitched across fixed-size blocks.
//!
//! A payload of arbitrary length is stored as a linked chain of data
//! blocks. The head block carries the total payload length so the reader
//! knows where the zero padding of the final block begins:
//!
//! ```text
//! head:    +----------------+----------------+------------------------+
//!          | Next address   | Total length   | Fragment (B - 16)      |
//!          | (8 bytes)      | (8 bytes)      |                        |
//!          +----------------+----------------+------------------------+
//! follow:  +----------------+-----------------------------------------+
//!          | Next address   | Fragment (B - 8)                        |
//!          | (8 bytes)      |                                         |
//!          +----------------+-----------------------------------------+
//! ```
//!
//! The last block of a chain has `next = EMPTY`; its fragment is
//! zero-padded when the payload length is not a multiple of the fragment
//! capacity. An empty payload still occupies one head block so that every
//! index entry has a real address to point at.

use crate::block::Block;
use crate::storage::{Address, BlockStorage, StorageError, EMPTY};

/// Size of the `next` pointer prefix carried by every data block.
pub const LINK_SIZE: usize = 8;

/// Size of the head block's header (`next` + `total_length`).
pub const HEAD_HEADER_SIZE: usize = 16;

/// Fragment capacity of a head block.
#[must_use]
pub const fn head_capacity(block_size: usize) -> usize {
    block_size - HEAD_HEADER_SIZE
}

/// Fragment capacity of a follow block.
#[must_use]
pub const fn follow_capacity(block_size: usize) -> usize {
    block_size - LINK_SIZE
}

/// Number of blocks a payload of `payload_len` bytes occupies.
#[must_use]
pub fn blocks_needed(block_size: usize, payload_len: usize) -> usize {
    if payload_len <= head_capacity(block_size) {
        1
    } else {
        1 + (payload_len - head_capacity(block_size)).div_ceil(follow_capacity(block_size))
    }
}

/// Encode a chain head block.
pub fn encode_head(
    fragment: &[u8],
    total_length: u64,
    next: Address,
    block_size: usize,
) -> Result<Block, ChainError> {
    let max = head_capacity(block_size);
    if fragment.len() > max {
        return Err(ChainError::FragmentOverflow {
            len: fragment.len(),
            max,
        });
    }

    let mut block = Block::new(block_size);
    block.write_u64(0, next);
    block.write_u64(LINK_SIZE, total_length);
    block.write_bytes(HEAD_HEADER_SIZE, fragment);
    Ok(block)
}

/// Encode a chain follow block.
pub fn encode_follow(fragment: &[u8], next: Address, block_size: usize) -> Result<Block, ChainError> {
    let max = follow_capacity(block_size);
    if fragment.len() > max {
        return Err(ChainError::FragmentOverflow {
            len: fragment.len(),
            max,
        });
    }

    let mut block = Block::new(block_size);
    block.write_u64(0, next);
    block.write_bytes(LINK_SIZE, fragment);
    Ok(block)
}

/// Decode a head block into (next, `total_length`, raw fragment).
///
/// The fragment is returned unpadded at full capacity; the caller trims
/// using `total_length`.
#[must_use]
pub fn decode_head(block: &Block) -> (Address, u64, &[u8]) {
    let next = block.read_u64(0);
    let total_length = block.read_u64(LINK_SIZE);
    let fragment = block.read_bytes(HEAD_HEADER_SIZE, head_capacity(block.len()));
    (next, total_length, fragment)
}

/// Decode a follow block into (next, raw fragment).
#[must_use]
pub fn decode_follow(block: &Block) -> (Address, &[u8]) {
    let next = block.read_u64(0);
    let fragment = block.read_bytes(LINK_SIZE, follow_capacity(block.len()));
    (next, fragment)
}

/// Write a payload as a chain of data blocks.
///
/// All addresses are allocated up front so every block can be written with
/// its successor already known. Returns the head address and the payload
/// length.
pub fn write_chain<S: BlockStorage>(
    storage: &mut S,
    payload: &[u8],
) -> Result<(Address, u64), ChainError> {
    let block_size = storage.block_size();
    let count = blocks_needed(block_size, payload.len());

    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        addresses.push(storage.malloc()?);
    }

    let total_length = payload.len() as u64;
    let head_len = payload.len().min(head_capacity(block_size));
    let (fragment, mut rest) = payload.split_at(head_len);
    let next = if count > 1 { addresses[1] } else { EMPTY };
    storage.set(addresses[0], &encode_head(fragment, total_length, next, block_size)?)?;

    for i in 1..count {
        let fragment_len = rest.len().min(follow_capacity(block_size));
        let (fragment, remaining) = rest.split_at(fragment_len);
        rest = remaining;

        let next = if i + 1 < count { addresses[i + 1] } else { EMPTY };
        storage.set(addresses[i], &encode_follow(fragment, next, block_size)?)?;
    }

    Ok((addresses[0], total_length))
}

/// Read a payload back by walking its chain from the head block.
pub fn read_chain<S: BlockStorage>(storage: &mut S, head: Address) -> Result<Vec<u8>, ChainError> {
    let block = storage.get(head)?;
    let (next, total_length, fragment) = decode_head(&block);

    #[allow(clippy::cast_possible_truncation)] // payloads are in-memory Vecs
    let total = total_length as usize;
    let mut payload = Vec::with_capacity(total.max(fragment.len()));
    payload.extend_from_slice(fragment);

    let mut current = next;
    while current != EMPTY {
        let block = storage.get(current)?;
        let (next, fragment) = decode_follow(&block);
        payload.extend_from_slice(fragment);
        current = next;
    }

    if payload.len() < total {
        return Err(ChainError::Truncated {
            expected: total_length,
            actual: payload.len() as u64,
        });
    }

    payload.truncate(total);
    Ok(payload)
}

/// Errors that can occur during chain operations.
#[derive(Debug)]
pub enum ChainError {
    /// Fragment larger than the block layout permits.
    FragmentOverflow { len: usize, max: usize },
    /// Chain ended before `total_length` bytes were collected.
    Truncated { expected: u64, actual: u64 },
    /// Storage operation failed.
    Storage(StorageError),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FragmentOverflow { len, max } => {
                write!(f, "fragment of {len} bytes exceeds capacity {max}")
            }
            Self::Truncated { expected, actual } => {
                write!(f, "chain truncated: expected {expected} bytes, found {actual}")
            }
            Self::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for ChainError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
