//! Block storage adapters.
//!
//! The tree operates entirely through the [`BlockStorage`] trait: fixed-size
//! block reads and writes against opaque addresses handed out by `malloc`.
//! Two adapters are provided, a map-backed one for tests and short-lived
//! trees ([`MemoryStorage`]) and a single-file one ([`FileStorage`]).
//!
//! Two addresses are reserved and never returned by `malloc`:
//!
//! - [`EMPTY`] (0): the null sentinel used to terminate data chains.
//! - [`META`] (1): the block holding the tree's root address and height.

mod file;
mod memory;

pub use file::{FileStorage, FORMAT_VERSION, MAGIC};
pub use memory::MemoryStorage;

use crate::block::Block;

/// A block address. Opaque to the tree; produced by [`BlockStorage::malloc`].
pub type Address = u64;

/// The null address. Never allocated, never writable.
pub const EMPTY: Address = 0;

/// The reserved meta block address.
pub const META: Address = 1;

/// Smallest supported block size.
///
/// A node block must hold at least two 16-byte entries after its 8-byte
/// count, and a head data block loses 16 bytes to its header, so anything
/// smaller degenerates.
pub const MIN_BLOCK_SIZE: usize = 40;

/// Abstraction over secondary storage as an array of fixed-size blocks.
///
/// The tree owns the adapter exclusively during construction. All adapters
/// hand out addresses monotonically; no address is ever reused.
pub trait BlockStorage {
    /// Read the block at `address`.
    ///
    /// Fails with [`StorageError::Unallocated`] if the address was never
    /// allocated. The file adapter cannot distinguish allocated-but-unwritten
    /// blocks and returns them zeroed.
    fn get(&mut self, address: Address) -> Result<Block, StorageError>;

    /// Write a block at `address`.
    ///
    /// The address must have been returned by [`malloc`](Self::malloc) or be
    /// [`META`], and the block must be exactly `block_size` bytes.
    fn set(&mut self, address: Address, block: &Block) -> Result<(), StorageError>;

    /// Allocate a fresh address, distinct from [`EMPTY`], [`META`], and all
    /// previously returned addresses.
    fn malloc(&mut self) -> Result<Address, StorageError>;

    /// The null sentinel address.
    fn empty(&self) -> Address {
        EMPTY
    }

    /// The reserved meta block address.
    fn meta(&self) -> Address {
        META
    }

    /// Total bytes allocated via [`malloc`](Self::malloc) so far.
    fn size(&self) -> u64;

    /// The block size in bytes.
    fn block_size(&self) -> usize;
}

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error from the backing file.
    Io(std::io::Error),
    /// Address was never allocated (or is a reserved sentinel).
    Unallocated(Address),
    /// Block passed to `set` does not match the adapter's block size.
    BlockSizeMismatch { expected: usize, actual: usize },
    /// Block size below [`MIN_BLOCK_SIZE`] at adapter construction.
    InvalidBlockSize(usize),
    /// File already exists at the given path.
    AlreadyExists(std::path::PathBuf),
    /// File does not start with the expected magic.
    InvalidMagic([u8; 8]),
    /// File was written by an unsupported format version.
    UnsupportedVersion(u32),
    /// Identification header failed its checksum.
    HeaderCorrupted { stored: u32, computed: u32 },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Unallocated(address) => write!(f, "address {address} was never allocated"),
            Self::BlockSizeMismatch { expected, actual } => {
                write!(f, "block size mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidBlockSize(size) => {
                write!(f, "block size {size} below minimum {MIN_BLOCK_SIZE}")
            }
            Self::AlreadyExists(path) => {
                write!(f, "file already exists: {}", path.display())
            }
            Self::InvalidMagic(magic) => {
                write!(f, "invalid magic: {:?}", String::from_utf8_lossy(magic))
            }
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported format version: {version}")
            }
            Self::HeaderCorrupted { stored, computed } => {
                write!(
                    f,
                    "header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
                )
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
