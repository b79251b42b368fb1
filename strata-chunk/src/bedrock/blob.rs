//! The content-addressed blob cache used by cached chunk transfer.
//!
//! A sender hashes each encoded sub-chunk and the biome data, stores the
//! buffers under their hashes and sends only the hashes. A receiver looks the
//! hashes up in its own store and asks for whatever it is missing.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64 as XxHasher;

/// What a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobType {
    /// One encoded sub-chunk.
    ChunkSection,
    /// The encoded biomes of a column.
    Biomes,
}

/// An immutable cached buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// What the buffer encodes.
    pub kind: BlobType,
    /// The encoded bytes.
    pub buffer: Vec<u8>,
}

/// Storage for blobs keyed by content hash. The caller owns the store.
pub trait BlobStore {
    /// Whether a blob with this hash is stored.
    fn has(&self, hash: u64) -> bool {
        self.get(hash).is_some()
    }

    /// The blob stored under `hash`.
    fn get(&self, hash: u64) -> Option<&BlobEntry>;

    /// Stores a blob. An entry already stored under `hash` is kept.
    fn set(&mut self, hash: u64, entry: BlobEntry);
}

/// A [`BlobStore`] backed by a hash map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: FxHashMap<u64, BlobEntry>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, hash: u64) -> Option<&BlobEntry> {
        self.blobs.get(&hash)
    }

    fn set(&mut self, hash: u64, entry: BlobEntry) {
        self.blobs.entry(hash).or_insert(entry);
    }
}

/// A pure 64-bit content hash.
pub trait Checksum {
    /// Stable name, used to tell cached hashes of different functions apart.
    fn name(&self) -> &'static str;

    /// Hashes `data`.
    fn checksum(&self, data: &[u8]) -> u64;
}

/// xxHash64 with seed 0, the hash Bedrock clients use for blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxHash64;

impl Checksum for XxHash64 {
    fn name(&self) -> &'static str {
        "xxhash64"
    }

    fn checksum(&self, data: &[u8]) -> u64 {
        XxHasher::oneshot(0, data)
    }
}

/// A cached network chunk: blob hashes plus the uncached remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChunk {
    /// One hash per sent sub-chunk, then the biome hash.
    pub blobs: Vec<u64>,
    /// Border blocks and block entities.
    pub payload: Vec<u8>,
}

impl CachedChunk {
    /// Number of sub-chunks the hashes cover.
    #[must_use]
    pub fn sub_chunk_count(&self) -> usize {
        self.blobs.len().saturating_sub(1)
    }
}

/// Hashes remembered for units that have not changed since they were encoded.
#[derive(Debug, Clone, Default)]
pub(super) struct BlobHashes {
    checksum: Option<&'static str>,
    sections: Vec<Option<u64>>,
    biomes: Option<u64>,
}

// Remembered hashes are derived from the column, so they never affect equality.
impl PartialEq for BlobHashes {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for BlobHashes {}

impl BlobHashes {
    /// Forgets every hash if they were made by a different checksum.
    pub(super) fn use_checksum(&mut self, checksum: &dyn Checksum, sections: usize) {
        if self.checksum != Some(checksum.name()) || self.sections.len() != sections {
            *self = Self {
                checksum: Some(checksum.name()),
                sections: vec![None; sections],
                biomes: None,
            };
        }
    }

    pub(super) fn section(&self, index: usize) -> Option<u64> {
        self.sections.get(index).copied().flatten()
    }

    pub(super) fn set_section(&mut self, index: usize, hash: u64) {
        if let Some(slot) = self.sections.get_mut(index) {
            *slot = Some(hash);
        }
    }

    pub(super) fn biomes(&self) -> Option<u64> {
        self.biomes
    }

    pub(super) fn set_biomes(&mut self, hash: u64) {
        self.biomes = Some(hash);
    }

    pub(super) fn mark_section_dirty(&mut self, index: usize) {
        if let Some(slot) = self.sections.get_mut(index) {
            *slot = None;
        }
    }

    pub(super) fn mark_biomes_dirty(&mut self) {
        self.biomes = None;
    }

    pub(super) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keeps_first_entry() {
        let mut store = MemoryBlobStore::new();
        let hash = XxHash64.checksum(b"section");
        store.set(
            hash,
            BlobEntry {
                kind: BlobType::ChunkSection,
                buffer: b"section".to_vec(),
            },
        );
        store.set(
            hash,
            BlobEntry {
                kind: BlobType::Biomes,
                buffer: Vec::new(),
            },
        );
        assert_eq!(store.len(), 1);
        assert!(store.has(hash));
        assert_eq!(store.get(hash).map(|entry| entry.kind), Some(BlobType::ChunkSection));
    }

    #[test]
    fn test_xxhash_is_stable() {
        assert_eq!(XxHash64.checksum(b""), 0xEF46_DB37_51D8_E999);
        assert_eq!(XxHash64.checksum(b"abc"), XxHash64.checksum(b"abc"));
        assert_ne!(XxHash64.checksum(b"abc"), XxHash64.checksum(b"abd"));
    }

    #[test]
    fn test_hashes_reset_on_checksum_change() {
        struct Zero;
        impl Checksum for Zero {
            fn name(&self) -> &'static str {
                "zero"
            }

            fn checksum(&self, _: &[u8]) -> u64 {
                0
            }
        }

        let mut hashes = BlobHashes::default();
        hashes.use_checksum(&XxHash64, 4);
        hashes.set_section(2, 99);
        hashes.use_checksum(&XxHash64, 4);
        assert_eq!(hashes.section(2), Some(99));
        hashes.use_checksum(&Zero, 4);
        assert_eq!(hashes.section(2), None);
    }
}
