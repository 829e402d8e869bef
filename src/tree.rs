//! Bulk construction and lookup.
//!
//! The tree is built once, bottom-up, from a sorted sequence of
//! (key, payload) pairs: every payload becomes a data chain, then index
//! layers are stacked over the (key, chain head) pairs until a single node
//! block remains. The META block is written last, so a partially built tree
//! is never visible through it.
//!
//! Lookups descend exactly `height` node levels from the root. At each
//! level the entry to follow is the last one whose key is `<=` the probe
//! key; at the lowest level the entry's key must match exactly, otherwise
//! the key is absent.

use crate::chain::{self, ChainError};
use crate::meta::Meta;
use crate::node::{fan_out, Key, NodeBlock, NodeError};
use crate::storage::{Address, BlockStorage, StorageError, EMPTY};

/// A B+ tree bound to a storage adapter.
///
/// Construction takes the adapter exclusively; the handle keeps the borrow
/// for its lifetime, so the tree and direct storage access cannot be mixed.
pub struct Tree<'a, S: BlockStorage> {
    storage: &'a mut S,
    root: Address,
    height: u64,
}

impl<'a, S: BlockStorage> Tree<'a, S> {
    /// Build a tree from entries sorted strictly ascending by key, and
    /// commit it by writing the META block.
    ///
    /// Fails with [`TreeError::UnsortedEntries`] if the input is not
    /// strictly ascending. On any failure the storage is left with orphaned
    /// blocks but an untouched META block.
    pub fn bulk_load(storage: &'a mut S, entries: &[(Key, Vec<u8>)]) -> Result<Self, TreeError> {
        if let Some(position) = entries.windows(2).position(|pair| pair[1].0 <= pair[0].0) {
            return Err(TreeError::UnsortedEntries {
                index: position + 1,
            });
        }

        if entries.is_empty() {
            Meta::new(EMPTY, 0).store(storage)?;
            tracing::debug!("bulk load: no entries, committed empty tree");
            return Ok(Self {
                storage,
                root: EMPTY,
                height: 0,
            });
        }

        let mut level: Vec<(Key, Address)> = Vec::with_capacity(entries.len());
        for (key, payload) in entries {
            let (head, _) = chain::write_chain(storage, payload)?;
            level.push((*key, head));
        }
        tracing::debug!("data layer: {} chains written", level.len());

        let max_entries = fan_out(storage.block_size());
        let mut height = 0;
        while level.len() > max_entries {
            level = build_layer(storage, &level, max_entries)?;
            height += 1;
            tracing::debug!("index layer {}: {} nodes", height, level.len());
        }

        let root = write_node(storage, &level)?;
        height += 1;
        Meta::new(root, height).store(storage)?;
        tracing::debug!(
            "bulk load committed: root {}, height {}, {} bytes allocated",
            root,
            height,
            storage.size()
        );

        Ok(Self {
            storage,
            root,
            height,
        })
    }

    /// Open the tree previously committed to this storage's META block.
    pub fn open(storage: &'a mut S) -> Result<Self, TreeError> {
        let meta = Meta::load(storage)?;
        Ok(Self {
            storage,
            root: meta.root,
            height: meta.height,
        })
    }

    /// Look up the payload stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn lookup(&mut self, key: Key) -> Result<Option<Vec<u8>>, TreeError> {
        if self.root == EMPTY {
            return Ok(None);
        }

        let mut address = self.root;
        for level in 1..=self.height {
            let block = self.storage.get(address)?;
            let node = NodeBlock::from_block(&block)?;

            let Some(index) = node.find(key) else {
                return Ok(None);
            };
            let (entry_key, child) = node.entries[index];

            // Only the lowest level names keys exactly; upper levels hold
            // group minimums.
            if level == self.height && entry_key != key {
                return Ok(None);
            }
            address = child;
        }

        Ok(Some(chain::read_chain(self.storage, address)?))
    }

    /// Address of the root node block, or [`EMPTY`] for an empty tree.
    #[must_use]
    pub const fn root(&self) -> Address {
        self.root
    }

    /// Number of node levels between the root and the data chains.
    #[must_use]
    pub const fn height(&self) -> u64 {
        self.height
    }
}

/// Write one node block and return its address.
fn write_node<S: BlockStorage>(
    storage: &mut S,
    entries: &[(Key, Address)],
) -> Result<Address, TreeError> {
    let block = NodeBlock::new(entries.to_vec()).to_block(storage.block_size())?;
    let address = storage.malloc()?;
    storage.set(address, &block)?;
    Ok(address)
}

/// Build one index layer over `entries`, returning the (group minimum key,
/// node address) pairs that form the layer above.
fn build_layer<S: BlockStorage>(
    storage: &mut S,
    entries: &[(Key, Address)],
    max_entries: usize,
) -> Result<Vec<(Key, Address)>, TreeError> {
    let mut next = Vec::with_capacity(entries.len().div_ceil(max_entries));
    for group in partition(entries, max_entries) {
        let address = write_node(storage, group)?;
        next.push((group[0].0, address));
    }
    Ok(next)
}

/// Partition a layer into groups of `max_entries`, keeping the tail at no
/// fewer than `⌈max/2⌉` entries.
///
/// A short tail takes `⌊max/2⌋` entries from the preceding (full) group.
/// Only called with more entries than fit in one node, so a preceding full
/// group always exists.
fn partition(entries: &[(Key, Address)], max_entries: usize) -> Vec<&[(Key, Address)]> {
    let min_fill = max_entries.div_ceil(2);
    let remainder = entries.len() % max_entries;

    let mut groups = Vec::with_capacity(entries.len().div_ceil(max_entries) + 1);
    if remainder == 0 || remainder >= min_fill {
        groups.extend(entries.chunks(max_entries));
    } else {
        let donated = max_entries / 2;
        let prefix = entries.len() - remainder - max_entries;
        groups.extend(entries[..prefix].chunks(max_entries));
        groups.push(&entries[prefix..prefix + max_entries - donated]);
        groups.push(&entries[prefix + max_entries - donated..]);
    }
    groups
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Input keys not strictly ascending; `index` is the first offender.
    UnsortedEntries { index: usize },
    /// Node block error.
    Node(NodeError),
    /// Data chain error.
    Chain(ChainError),
    /// Storage error.
    Storage(StorageError),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsortedEntries { index } => {
                write!(f, "entries not sorted strictly ascending at index {index}")
            }
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Chain(e) => write!(f, "chain error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnsortedEntries { .. } => None,
            Self::Node(e) => Some(e),
            Self::Chain(e) => Some(e),
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<ChainError> for TreeError {
    fn from(e: ChainError) -> Self {
        Self::Chain(e)
    }
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
