//! Bedrock edition chunk columns, for the 1.16 and 1.18 layouts.
//!
//! Sub-chunks hold one or two paletted block layers. Columns serialize to
//! the level database entries, to the uncached level chunk payload and to
//! the blob cache used by cached chunk transfer.

mod biome;
mod blob;
mod column;
mod layer;
mod paletted_storage;
mod profile;
mod sub_chunk;

pub use biome::{BedrockBiomes, COPY_PREVIOUS, HEIGHTMAP_LEN};
pub use blob::{BlobEntry, BlobStore, BlobType, CachedChunk, Checksum, MemoryBlobStore, XxHash64};
pub use column::{BedrockColumn, BedrockOptions, DiskChunk, NetworkChunk};
pub use layer::{LayerCodec, PaletteType, StorageLayer};
pub use paletted_storage::{ALLOWED_BITS, PalettedStorage, STORAGE_SIZE, bits_for_palette, storage_index};
pub use profile::{BedrockProfile, BedrockVersion, BiomeLayout};
pub use sub_chunk::{MAX_LAYERS, SubChunk, SubChunkFormat};
