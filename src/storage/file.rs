//! File-backed storage adapter.
//!
//! Blocks live in a single binary file at offset `address * block_size`.
//! Block 0 is the [`EMPTY`](crate::storage::EMPTY) sentinel, which the tree
//! never reads, so the adapter stamps an identification header there:
//!
//! ```text
//! +----------------+----------------+----------------+----------------+
//! | Magic          | Format version | Block size     | CRC32 of 0..16 |
//! | (8 bytes)      | (4 bytes)      | (4 bytes)      | (4 bytes)      |
//! +----------------+----------------+----------------+----------------+
//! ```
//!
//! Block 1 is the META block, zero-initialized on create (a zeroed META
//! decodes as an empty tree). Blocks 2.. are handed out by `malloc` in
//! allocation order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::block::Block;
use crate::storage::{Address, BlockStorage, StorageError, META, MIN_BLOCK_SIZE};

/// Magic identifying a blocktree file.
pub const MAGIC: [u8; 8] = *b"BLOCTREE";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Bytes of block 0 occupied by the identification header.
const HEADER_SIZE: usize = 20;

fn header_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Single-file storage adapter.
pub struct FileStorage {
    file: File,
    block_size: usize,
    next_address: Address,
}

impl FileStorage {
    /// Create a new storage file at the given path.
    ///
    /// Returns an error if the file already exists. Writes the
    /// identification header and a zeroed META block.
    #[allow(clippy::cast_possible_truncation)] // block sizes are far below u32::MAX
    pub fn create(path: &Path, block_size: usize) -> Result<Self, StorageError> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(StorageError::InvalidBlockSize(block_size));
        }
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut header = Block::new(block_size);
        header.write_bytes(0, &MAGIC);
        header.write_u32(8, FORMAT_VERSION);
        header.write_u32(12, block_size as u32);
        let checksum = header_checksum(header.read_bytes(0, 16));
        header.write_u32(16, checksum);
        file.write_all(header.as_bytes())?;

        let meta = Block::new(block_size);
        file.write_all(meta.as_bytes())?;
        file.sync_all()?;

        Ok(Self {
            file,
            block_size,
            next_address: META + 1,
        })
    }

    /// Open an existing storage file, validating its identification header.
    ///
    /// The block size is taken from the header.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&header[0..8]);
        if magic != MAGIC {
            return Err(StorageError::InvalidMagic(magic));
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }

        let stored = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
        let computed = header_checksum(&header[0..16]);
        if stored != computed {
            return Err(StorageError::HeaderCorrupted { stored, computed });
        }

        let block_size = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
        if block_size < MIN_BLOCK_SIZE {
            return Err(StorageError::InvalidBlockSize(block_size));
        }

        let file_len = file.metadata()?.len();
        let next_address = (file_len / block_size as u64).max(META + 1);

        Ok(Self {
            file,
            block_size,
            next_address,
        })
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_allocated(&self, address: Address) -> Result<(), StorageError> {
        if address == META || (address > META && address < self.next_address) {
            Ok(())
        } else {
            Err(StorageError::Unallocated(address))
        }
    }

    fn offset(&self, address: Address) -> u64 {
        address * self.block_size as u64
    }
}

impl BlockStorage for FileStorage {
    fn get(&mut self, address: Address) -> Result<Block, StorageError> {
        self.check_allocated(address)?;

        self.file.seek(SeekFrom::Start(self.offset(address)))?;
        let mut data = vec![0u8; self.block_size];
        self.file.read_exact(&mut data)?;
        Ok(Block::from_vec(data))
    }

    fn set(&mut self, address: Address, block: &Block) -> Result<(), StorageError> {
        self.check_allocated(address)?;
        if block.len() != self.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size,
                actual: block.len(),
            });
        }

        self.file.seek(SeekFrom::Start(self.offset(address)))?;
        self.file.write_all(block.as_bytes())?;
        Ok(())
    }

    fn malloc(&mut self) -> Result<Address, StorageError> {
        let address = self.next_address;
        // Extend the file so the new block reads back zeroed.
        self.file.set_len(self.offset(address + 1))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EMPTY;
    use tempfile::tempdir;

    fn storage_path() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.btree");
        (dir, path)
    }

    #[test]
    fn test_create_and_open() {
        let (_dir, path) = storage_path();

        {
            let storage = FileStorage::create(&path, 64).expect("create");
            assert_eq!(storage.block_size(), 64);
            assert_eq!(storage.size(), 0);
        }

        {
            let storage = FileStorage::open(&path).expect("open");
            assert_eq!(storage.block_size(), 64);
            assert_eq!(storage.size(), 0);
        }
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let (_dir, path) = storage_path();
        std::fs::write(&path, b"existing").expect("write file");

        assert!(matches!(
            FileStorage::create(&path, 64),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let (_dir, path) = storage_path();
        std::fs::write(&path, vec![0u8; 128]).expect("write file");

        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_open_rejects_corrupted_header() {
        let (_dir, path) = storage_path();
        {
            FileStorage::create(&path, 64).expect("create");
        }

        // Flip a bit inside the checksummed region.
        let mut contents = std::fs::read(&path).expect("read file");
        contents[12] ^= 0x01;
        std::fs::write(&path, contents).expect("rewrite file");

        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::HeaderCorrupted { .. })
        ));
    }

    #[test]
    fn test_open_rejects_unsupported_version() {
        let (_dir, path) = storage_path();
        {
            FileStorage::create(&path, 64).expect("create");
        }

        let mut contents = std::fs::read(&path).expect("read file");
        contents[8] = 0xFF;
        // Keep the checksum consistent so the version check is what fires.
        let checksum = header_checksum(&contents[0..16]);
        contents[16..20].copy_from_slice(&checksum.to_le_bytes());
        std::fs::write(&path, contents).expect("rewrite file");

        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_blocks_persist_across_reopen() {
        let (_dir, path) = storage_path();
        let address;

        {
            let mut storage = FileStorage::create(&path, 64).expect("create");
            address = storage.malloc().expect("malloc");

            let mut block = Block::new(64);
            block.write_u64(8, 0xDEAD_BEEF_CAFE_BABE);
            storage.set(address, &block).expect("set");

            let mut meta = Block::new(64);
            meta.write_u64(0, address);
            storage.set(META, &meta).expect("set meta");
            storage.sync().expect("sync");
        }

        {
            let mut storage = FileStorage::open(&path).expect("open");
            assert_eq!(storage.size(), 64);

            let meta = storage.get(META).expect("get meta");
            assert_eq!(meta.read_u64(0), address);

            let block = storage.get(address).expect("get");
            assert_eq!(block.read_u64(8), 0xDEAD_BEEF_CAFE_BABE);
        }
    }

    #[test]
    fn test_fresh_meta_reads_zeroed() {
        let (_dir, path) = storage_path();
        let mut storage = FileStorage::create(&path, 64).expect("create");

        let meta = storage.get(META).expect("get meta");
        assert_eq!(meta.as_bytes(), &[0u8; 64]);
    }

    #[test]
    fn test_allocated_but_unwritten_reads_zeroed() {
        let (_dir, path) = storage_path();
        let mut storage = FileStorage::create(&path, 64).expect("create");

        let address = storage.malloc().expect("malloc");
        let block = storage.get(address).expect("get");
        assert_eq!(block.as_bytes(), &[0u8; 64]);
    }

    #[test]
    fn test_bounds_checks() {
        let (_dir, path) = storage_path();
        let mut storage = FileStorage::create(&path, 64).expect("create");

        assert!(matches!(
            storage.get(EMPTY),
            Err(StorageError::Unallocated(_))
        ));
        assert!(matches!(storage.get(7), Err(StorageError::Unallocated(7))));

        let block = Block::new(64);
        assert!(matches!(
            storage.set(7, &block),
            Err(StorageError::Unallocated(7))
        ));
    }
}
