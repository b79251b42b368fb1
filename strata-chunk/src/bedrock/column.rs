use std::io::{Cursor, Write};

use serde::{Deserialize, Serialize};
use strata_registry::{BiomeId, BlockRegistry, BlockStateId};
use strata_utils::{
    codec::BitSet,
    nbt::{self, NbtCompound, NbtFlavor, Tag},
    serial::LittleEndianRead,
};

use super::{
    biome::{BedrockBiomes, HEIGHTMAP_LEN},
    blob::{BlobEntry, BlobHashes, BlobStore, BlobType, CachedChunk, Checksum, XxHash64},
    layer::LayerCodec,
    profile::{BedrockProfile, BedrockVersion, BiomeLayout},
    sub_chunk::SubChunk,
};
use crate::{
    block_entities::BlockEntities,
    error::{ChunkError, DecodeContext},
    light_storage::LightStorage,
    pos::{Block, BlockPos},
};

/// Construction options for a [`BedrockColumn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockOptions {
    /// The runtime id of air.
    pub air: BlockStateId,
    /// Whether the dimension has sky light.
    pub sky_light: bool,
}

impl Default for BedrockOptions {
    fn default() -> Self {
        Self {
            air: BlockStateId::AIR,
            sky_light: true,
        }
    }
}

/// A column in the form the level database stores it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskChunk {
    /// Encoded non-empty sub-chunks keyed by vertical index.
    pub sub_chunks: Vec<(i8, Vec<u8>)>,
    /// Heightmap and biomes (`Data2D` or `Data3D`).
    pub biomes: Vec<u8>,
    /// Concatenated little-endian NBT block entities.
    pub block_entities: Vec<u8>,
}

/// A column encoded for a level chunk packet without the blob cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkChunk {
    /// Sub-chunks at the start of `payload`, counted from the bottom.
    pub sub_chunk_count: usize,
    /// Sub-chunks, biomes, border blocks, then block entities.
    pub payload: Vec<u8>,
}

/// A Bedrock edition chunk column.
///
/// Light is kept in memory and in snapshots only; Bedrock computes it on the
/// client and never stores or sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockColumn {
    version: BedrockVersion,
    air: BlockStateId,
    has_sky_light: bool,
    sub_chunks: Vec<Option<SubChunk>>,
    biomes: BedrockBiomes,
    block_light: Vec<Option<LightStorage>>,
    sky_light: Vec<Option<LightStorage>>,
    block_entities: BlockEntities,
    #[serde(skip)]
    hashes: BlobHashes,
}

impl BedrockColumn {
    /// Creates an empty column.
    #[must_use]
    pub fn new(version: BedrockVersion, options: BedrockOptions) -> Self {
        let profile = version.profile();
        let count = profile.sub_chunk_count();
        let biomes = match profile.biomes {
            BiomeLayout::Column2d => BedrockBiomes::column2d(),
            BiomeLayout::Sectioned => BedrockBiomes::sectioned(count),
        };
        Self {
            version,
            air: options.air,
            has_sky_light: options.sky_light,
            sub_chunks: vec![None; count],
            biomes,
            block_light: vec![None; count],
            sky_light: vec![None; count],
            block_entities: BlockEntities::default(),
            hashes: BlobHashes::default(),
        }
    }

    /// The layout version.
    #[must_use]
    pub fn version(&self) -> BedrockVersion {
        self.version
    }

    /// The layout rules.
    #[must_use]
    pub fn profile(&self) -> BedrockProfile {
        self.version.profile()
    }

    /// The runtime id treated as air.
    #[must_use]
    pub fn air(&self) -> BlockStateId {
        self.air
    }

    /// Lowest block height.
    #[must_use]
    pub fn min_y(&self) -> i32 {
        self.profile().min_y
    }

    /// One past the highest block height.
    #[must_use]
    pub fn max_y(&self) -> i32 {
        let profile = self.profile();
        profile.min_y + profile.height as i32
    }

    /// Number of sub-chunks in the column.
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sub_chunks.len()
    }

    /// The sub-chunk at `index`, counted from the bottom.
    #[must_use]
    pub fn sub_chunk(&self, index: usize) -> Option<&SubChunk> {
        self.sub_chunks.get(index).and_then(Option::as_ref)
    }

    fn slot(&self, y: i32) -> Option<usize> {
        (self.min_y()..self.max_y())
            .contains(&y)
            .then(|| ((y - self.min_y()) >> 4) as usize)
    }

    fn checked_slot(&self, y: i32) -> Result<usize, ChunkError> {
        self.slot(y).ok_or(ChunkError::OutOfWorld {
            y,
            min_y: self.min_y(),
            max_y: self.max_y(),
        })
    }

    fn sub_chunk_y(&self, index: usize) -> i8 {
        (self.profile().min_section() + index as i32) as i8
    }

    fn check_index(&self, index: usize) -> Result<(), ChunkError> {
        if index < self.sub_chunks.len() {
            Ok(())
        } else {
            Err(ChunkError::Bounds {
                index,
                capacity: self.sub_chunks.len(),
            })
        }
    }

    /// The block-layer state at `pos`; air outside the world.
    #[must_use]
    pub fn get_block_state_id(&self, pos: BlockPos) -> BlockStateId {
        self.get_block_layer(pos, 0)
    }

    /// Stores a block-layer state.
    pub fn set_block_state_id(&mut self, pos: BlockPos, state: BlockStateId) -> Result<(), ChunkError> {
        self.set_block_layer(pos, 0, state)
    }

    /// The state on `layer` at `pos`; air outside the world or on a missing layer.
    #[must_use]
    pub fn get_block_layer(&self, pos: BlockPos, layer: usize) -> BlockStateId {
        self.slot(pos.y)
            .and_then(|slot| self.sub_chunks[slot].as_ref())
            .map_or(self.air, |sub_chunk| sub_chunk.get(layer, pos.x, pos.local_y(), pos.z))
    }

    /// Stores a state on `layer`. Air written into an absent sub-chunk is dropped.
    pub fn set_block_layer(&mut self, pos: BlockPos, layer: usize, state: BlockStateId) -> Result<(), ChunkError> {
        let slot = self.checked_slot(pos.y)?;
        let (y, air) = (self.sub_chunk_y(slot), self.air);
        let sub_chunk = match &mut self.sub_chunks[slot] {
            Some(sub_chunk) => sub_chunk,
            None if state == air => return Ok(()),
            empty => empty.insert(SubChunk::new(y, air)),
        };
        sub_chunk.set(layer, pos.x, pos.local_y(), pos.z, state)?;
        self.hashes.mark_section_dirty(slot);
        Ok(())
    }

    /// The biome at `pos`; biome 0 outside the world.
    #[must_use]
    pub fn get_biome(&self, pos: BlockPos) -> BiomeId {
        self.slot(pos.y).map_or(BiomeId(0), |slot| {
            BiomeId(self.biomes.get(slot, pos.x, pos.local_y(), pos.z))
        })
    }

    /// Stores a biome.
    pub fn set_biome(&mut self, pos: BlockPos, biome: BiomeId) -> Result<(), ChunkError> {
        let slot = self.checked_slot(pos.y)?;
        self.biomes.set(slot, pos.x, pos.local_y(), pos.z, biome.0)?;
        self.hashes.mark_biomes_dirty();
        Ok(())
    }

    /// Block light at `pos`; 0 where nothing is stored.
    #[must_use]
    pub fn get_block_light(&self, pos: BlockPos) -> u8 {
        self.slot(pos.y)
            .and_then(|slot| self.block_light[slot].as_ref())
            .map_or(0, |light| light.get(usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z)))
    }

    /// Sky light at `pos`; 15 where nothing is stored in a dimension with sky.
    #[must_use]
    pub fn get_sky_light(&self, pos: BlockPos) -> u8 {
        let default = if self.has_sky_light { 15 } else { 0 };
        self.slot(pos.y)
            .and_then(|slot| self.sky_light[slot].as_ref())
            .map_or(default, |light| {
                light.get(usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z))
            })
    }

    /// Stores block light.
    pub fn set_block_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
        let slot = self.checked_slot(pos.y)?;
        self.block_light[slot].get_or_insert_with(LightStorage::new_empty).set(
            usize::from(pos.x),
            usize::from(pos.local_y()),
            usize::from(pos.z),
            level,
        );
        Ok(())
    }

    /// Stores sky light. Columns without sky light ignore the write.
    pub fn set_sky_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
        let slot = self.checked_slot(pos.y)?;
        if self.has_sky_light {
            self.sky_light[slot].get_or_insert_with(|| LightStorage::new_filled(15)).set(
                usize::from(pos.x),
                usize::from(pos.local_y()),
                usize::from(pos.z),
                level,
            );
        }
        Ok(())
    }

    /// Everything stored at `pos`.
    #[must_use]
    pub fn get_block(&self, pos: BlockPos) -> Block {
        Block {
            state: self.get_block_state_id(pos),
            biome: self.get_biome(pos),
            block_light: self.get_block_light(pos),
            sky_light: self.get_sky_light(pos),
        }
    }

    /// Stores every part of `block` at `pos`.
    pub fn set_block(&mut self, pos: BlockPos, block: &Block) -> Result<(), ChunkError> {
        self.set_block_state_id(pos, block.state)?;
        self.set_biome(pos, block.biome)?;
        self.set_block_light(pos, block.block_light)?;
        self.set_sky_light(pos, block.sky_light)
    }

    /// Sub-chunks holding anything other than air.
    #[must_use]
    pub fn get_mask(&self) -> BitSet {
        let mut mask = BitSet::with_len(self.sub_chunks.len());
        for (index, sub_chunk) in self.sub_chunks.iter().enumerate() {
            if sub_chunk.as_ref().is_some_and(|sub_chunk| !sub_chunk.is_empty()) {
                mask.set(index, true);
            }
        }
        mask
    }

    /// Number of sub-chunks up to and including the highest non-empty one.
    #[must_use]
    pub fn sub_chunk_count(&self) -> usize {
        self.sub_chunks
            .iter()
            .rposition(|sub_chunk| sub_chunk.as_ref().is_some_and(|sub_chunk| !sub_chunk.is_empty()))
            .map_or(0, |index| index + 1)
    }

    /// Fills the column from `generate`, skipping positions where it returns `None`.
    pub fn initialize(&mut self, generate: &mut dyn FnMut(BlockPos) -> Option<BlockStateId>) -> Result<(), ChunkError> {
        for y in self.min_y()..self.max_y() {
            for z in 0..16 {
                for x in 0..16 {
                    let pos = BlockPos::new(x, y, z);
                    if let Some(state) = generate(pos) {
                        self.set_block_state_id(pos, state)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stores a block entity, taking ownership of `payload`.
    ///
    /// When the stored `x`, `y` and `z` tags do not already point at `pos`
    /// (world coordinates count when they match modulo 16), they are replaced
    /// with the column-local position.
    pub fn set_block_entity(&mut self, pos: BlockPos, payload: NbtCompound) -> Result<(), ChunkError> {
        self.checked_slot(pos.y)?;
        self.block_entities.insert(pos, with_position(pos, payload));
        Ok(())
    }

    /// The block entity payload at `pos`.
    #[must_use]
    pub fn get_block_entity(&self, pos: BlockPos) -> Option<&NbtCompound> {
        self.block_entities.get(pos)
    }

    /// Removes the block entity payload at `pos`.
    pub fn remove_block_entity(&mut self, pos: BlockPos) -> Option<NbtCompound> {
        self.block_entities.remove(pos)
    }

    /// All block entities.
    #[must_use]
    pub fn block_entities(&self) -> &BlockEntities {
        &self.block_entities
    }

    /// Encodes sub-chunk `index` in this version's layout; absent sub-chunks encode as air.
    pub fn encode_sub_chunk(&self, index: usize, codec: LayerCodec<'_>) -> Result<Vec<u8>, ChunkError> {
        self.check_index(index)?;
        let mut buf = Vec::new();
        let format = self.profile().sub_chunk_format;
        match &self.sub_chunks[index] {
            Some(sub_chunk) => sub_chunk.write(&mut buf, format, codec)?,
            None => SubChunk::new(self.sub_chunk_y(index), self.air).write(&mut buf, format, codec)?,
        }
        Ok(buf)
    }

    /// Replaces sub-chunk `index` with `data`, which must hold exactly one sub-chunk.
    pub fn decode_sub_chunk(&mut self, index: usize, data: &[u8], codec: LayerCodec<'_>) -> Result<(), ChunkError> {
        self.check_index(index)?;
        self.sub_chunks[index] = self.read_sub_chunk(index, data, codec)?;
        self.hashes.mark_section_dirty(index);
        Ok(())
    }

    fn read_sub_chunk(&self, index: usize, data: &[u8], codec: LayerCodec<'_>) -> Result<Option<SubChunk>, ChunkError> {
        let mut cursor = Cursor::new(data);
        let sub_chunk = SubChunk::read(&mut cursor, self.sub_chunk_y(index), self.air, codec)?;
        expect_end(&cursor, "data")?;
        Ok((!sub_chunk.is_empty()).then_some(sub_chunk))
    }

    /// Encodes the column into its database entries.
    pub fn dump(&self, registry: &dyn BlockRegistry) -> Result<DiskChunk, ChunkError> {
        let codec = LayerCodec::Persistent(registry);
        let mut sub_chunks = Vec::new();
        for (index, sub_chunk) in self.sub_chunks.iter().enumerate() {
            if sub_chunk.as_ref().is_some_and(|sub_chunk| !sub_chunk.is_empty()) {
                sub_chunks.push((self.sub_chunk_y(index), self.encode_sub_chunk(index, codec)?));
            }
        }

        let mut biomes = Vec::new();
        self.biomes.write_disk(&mut biomes, &self.heightmap())?;

        let mut block_entities = Vec::new();
        self.write_block_entities(&mut block_entities, NbtFlavor::LittleEndian)?;

        Ok(DiskChunk {
            sub_chunks,
            biomes,
            block_entities,
        })
    }

    /// Height above the column bottom of the block over the highest non-air
    /// block of each `(x, z)`, indexed `(z << 4) | x`.
    #[must_use]
    pub fn heightmap(&self) -> [u16; HEIGHTMAP_LEN] {
        let mut heightmap = [0; HEIGHTMAP_LEN];
        for (column, height) in heightmap.iter_mut().enumerate() {
            let (x, z) = ((column & 0xF) as u8, (column >> 4) as u8);
            *height = self
                .sub_chunks
                .iter()
                .enumerate()
                .rev()
                .find_map(|(index, sub_chunk)| {
                    let top = sub_chunk.as_ref()?.top_solid(x, z)?;
                    Some((index * 16 + usize::from(top) + 1) as u16)
                })
                .unwrap_or(0);
        }
        heightmap
    }

    /// Replaces the column with stored database entries. The column is left
    /// unchanged when decoding fails.
    pub fn load(&mut self, chunk: &DiskChunk, registry: &dyn BlockRegistry) -> Result<(), ChunkError> {
        let codec = LayerCodec::Persistent(registry);
        let min_section = self.profile().min_section();
        let mut sub_chunks = vec![None; self.sub_chunks.len()];
        for (y, data) in &chunk.sub_chunks {
            let field = format!("sub_chunks[{y}]");
            let index = usize::try_from(i32::from(*y) - min_section)
                .ok()
                .filter(|&index| index < sub_chunks.len())
                .ok_or_else(|| ChunkError::decode(field.as_str(), "outside the column"))?;
            sub_chunks[index] = self.read_sub_chunk(index, data, codec).field(&field)?;
        }

        let mut cursor = Cursor::new(chunk.biomes.as_slice());
        let biomes = self.biomes.read_disk(&mut cursor).field("biomes")?;
        expect_end(&cursor, "biomes")?;

        let block_entities = self
            .read_block_entities(&chunk.block_entities, NbtFlavor::LittleEndian)
            .field("block_entities")?;

        self.sub_chunks = sub_chunks;
        self.biomes = biomes;
        self.block_entities = block_entities;
        self.hashes.clear();
        Ok(())
    }

    /// Encodes the column for a level chunk packet with caching disabled.
    pub fn network_encode_no_cache(&self) -> Result<NetworkChunk, ChunkError> {
        let sub_chunk_count = self.sub_chunk_count();
        let mut payload = Vec::new();
        for index in 0..sub_chunk_count {
            payload.extend(self.encode_sub_chunk(index, LayerCodec::Network)?);
        }
        self.biomes.write_network(&mut payload)?;
        self.write_tail(&mut payload)?;
        Ok(NetworkChunk {
            sub_chunk_count,
            payload,
        })
    }

    /// Replaces the column from an uncached level chunk payload.
    pub fn network_decode_no_cache(&mut self, data: &[u8], sub_chunk_count: usize) -> Result<(), ChunkError> {
        if sub_chunk_count > self.sub_chunks.len() {
            return Err(ChunkError::decode(
                "sub_chunk_count",
                format!("{sub_chunk_count} exceeds the {} sub-chunks", self.sub_chunks.len()),
            ));
        }
        let mut cursor = Cursor::new(data);
        let mut sub_chunks = vec![None; self.sub_chunks.len()];
        for (index, slot) in sub_chunks.iter_mut().enumerate().take(sub_chunk_count) {
            let sub_chunk = SubChunk::read(&mut cursor, self.sub_chunk_y(index), self.air, LayerCodec::Network)
                .field(&format!("sub_chunk[{index}]"))?;
            *slot = (!sub_chunk.is_empty()).then_some(sub_chunk);
        }
        let biomes = self.biomes.read_network(&mut cursor)?;
        let position = cursor.position() as usize;
        let block_entities = self.read_tail(&data[position..])?;

        self.sub_chunks = sub_chunks;
        self.biomes = biomes;
        self.block_entities = block_entities;
        self.hashes.clear();
        Ok(())
    }

    /// Encodes the column for a cached level chunk using xxHash64.
    pub fn network_encode(&mut self, store: &mut dyn BlobStore) -> Result<CachedChunk, ChunkError> {
        self.network_encode_with(store, &XxHash64)
    }

    /// Encodes the column for a cached level chunk.
    ///
    /// Units unchanged since the last call reuse their hash and are not
    /// encoded again while `store` still holds their blob.
    pub fn network_encode_with(
        &mut self,
        store: &mut dyn BlobStore,
        checksum: &dyn Checksum,
    ) -> Result<CachedChunk, ChunkError> {
        let count = self.sub_chunk_count();
        let mut blobs = Vec::with_capacity(count + 1);
        for index in 0..count {
            blobs.push(self.encode_sub_chunk_blob_with(index, store, checksum)?);
        }
        blobs.push(self.encode_biome_blob(store, checksum)?);

        let mut payload = Vec::new();
        self.write_tail(&mut payload)?;
        Ok(CachedChunk { blobs, payload })
    }

    /// Stores sub-chunk `index` as a blob and returns its xxHash64.
    pub fn encode_sub_chunk_blob(&mut self, index: usize, store: &mut dyn BlobStore) -> Result<u64, ChunkError> {
        self.encode_sub_chunk_blob_with(index, store, &XxHash64)
    }

    fn encode_sub_chunk_blob_with(
        &mut self,
        index: usize,
        store: &mut dyn BlobStore,
        checksum: &dyn Checksum,
    ) -> Result<u64, ChunkError> {
        self.check_index(index)?;
        self.hashes.use_checksum(checksum, self.sub_chunks.len());
        if let Some(hash) = self.hashes.section(index).filter(|&hash| store.has(hash)) {
            log::trace!("sub-chunk {index} unchanged, reusing blob {hash:#018x}");
            return Ok(hash);
        }
        let buffer = self.encode_sub_chunk(index, LayerCodec::Network)?;
        let hash = checksum.checksum(&buffer);
        store.set(
            hash,
            BlobEntry {
                kind: BlobType::ChunkSection,
                buffer,
            },
        );
        self.hashes.set_section(index, hash);
        Ok(hash)
    }

    fn encode_biome_blob(&mut self, store: &mut dyn BlobStore, checksum: &dyn Checksum) -> Result<u64, ChunkError> {
        self.hashes.use_checksum(checksum, self.sub_chunks.len());
        if let Some(hash) = self.hashes.biomes().filter(|&hash| store.has(hash)) {
            log::trace!("biomes unchanged, reusing blob {hash:#018x}");
            return Ok(hash);
        }
        let mut buffer = Vec::new();
        self.biomes.write_network(&mut buffer)?;
        let hash = checksum.checksum(&buffer);
        store.set(
            hash,
            BlobEntry {
                kind: BlobType::Biomes,
                buffer,
            },
        );
        self.hashes.set_biomes(hash);
        Ok(hash)
    }

    /// Replaces sub-chunk `index` from the blob stored under `hash`.
    ///
    /// Returns `false`, leaving the column unchanged, when the blob is missing.
    pub fn decode_sub_chunk_blob(&mut self, index: usize, hash: u64, store: &dyn BlobStore) -> Result<bool, ChunkError> {
        self.check_index(index)?;
        if !store.has(hash) {
            return Ok(false);
        }
        let buffer = blob_buffer(store, hash, BlobType::ChunkSection)?;
        self.sub_chunks[index] = self.read_sub_chunk(index, buffer, LayerCodec::Network)?;
        self.hashes.mark_section_dirty(index);
        Ok(true)
    }

    /// Decodes a cached level chunk.
    ///
    /// `blobs` holds one hash per sub-chunk followed by the biome hash. Returns
    /// the hashes `store` does not hold yet; while any are missing the column
    /// is left unchanged and the call can be repeated once they arrive. An
    /// empty result means the column was replaced.
    pub fn network_decode(
        &mut self,
        blobs: &[u64],
        store: &dyn BlobStore,
        payload: &[u8],
    ) -> Result<Vec<u64>, ChunkError> {
        let mut misses = Vec::new();
        for &hash in blobs {
            if !store.has(hash) && !misses.contains(&hash) {
                misses.push(hash);
            }
        }
        if !misses.is_empty() {
            log::debug!("cached chunk is missing {} of {} blobs", misses.len(), blobs.len());
            return Ok(misses);
        }

        let Some((&biome_hash, section_hashes)) = blobs.split_last() else {
            return Err(ChunkError::decode("blobs", "expected at least the biome blob"));
        };
        if section_hashes.len() > self.sub_chunks.len() {
            return Err(ChunkError::decode(
                "blobs",
                format!("{} sub-chunk blobs for {} sub-chunks", section_hashes.len(), self.sub_chunks.len()),
            ));
        }

        let mut sub_chunks = vec![None; self.sub_chunks.len()];
        for (index, &hash) in section_hashes.iter().enumerate() {
            let field = format!("blobs[{index}]");
            let buffer = blob_buffer(store, hash, BlobType::ChunkSection).field(&field)?;
            sub_chunks[index] = self.read_sub_chunk(index, buffer, LayerCodec::Network).field(&field)?;
        }

        let field = format!("blobs[{}]", section_hashes.len());
        let buffer = blob_buffer(store, biome_hash, BlobType::Biomes).field(&field)?;
        let mut cursor = Cursor::new(buffer);
        let biomes = self.biomes.read_network(&mut cursor).field(&field)?;
        expect_end(&cursor, &field)?;

        let block_entities = self.read_tail(payload)?;

        self.sub_chunks = sub_chunks;
        self.biomes = biomes;
        self.block_entities = block_entities;
        self.hashes.clear();
        Ok(Vec::new())
    }

    fn write_tail(&self, writer: &mut impl Write) -> Result<(), ChunkError> {
        // No border blocks.
        writer.write_all(&[0])?;
        self.write_block_entities(writer, NbtFlavor::NetworkLittleEndian)
    }

    fn read_tail(&self, data: &[u8]) -> Result<BlockEntities, ChunkError> {
        let mut cursor = Cursor::new(data);
        let border_blocks = cursor.read_u8_le().field("border_blocks")?;
        if border_blocks != 0 {
            return Err(ChunkError::decode(
                "border_blocks",
                format!("expected no border blocks, got {border_blocks}"),
            ));
        }
        let position = cursor.position() as usize;
        self.read_block_entities(&data[position..], NbtFlavor::NetworkLittleEndian)
            .field("block_entities")
    }

    fn write_block_entities(&self, writer: &mut impl Write, flavor: NbtFlavor) -> Result<(), ChunkError> {
        for (_, payload) in self.block_entities.sorted() {
            nbt::write_root(writer, "", payload, flavor)?;
        }
        Ok(())
    }

    fn read_block_entities(&self, data: &[u8], flavor: NbtFlavor) -> Result<BlockEntities, ChunkError> {
        let mut cursor = Cursor::new(data);
        let mut entities = BlockEntities::default();
        let mut index = 0;
        while (cursor.position() as usize) < data.len() {
            let field = format!("[{index}]");
            let (_, payload) = nbt::read_root(&mut cursor, flavor).field(&field)?;
            let coordinate = |name: &str| {
                payload
                    .get_i64(name)
                    .map(|value| value as i32)
                    .ok_or_else(|| ChunkError::decode(format!("{field}.{name}"), "missing coordinate"))
            };
            let pos = BlockPos::new(coordinate("x")?, coordinate("y")?, coordinate("z")?);
            if self.slot(pos.y).is_none() {
                return Err(ChunkError::decode(
                    format!("{field}.y"),
                    format!("y={} is outside the column", pos.y),
                ));
            }
            entities.insert(pos, payload);
            index += 1;
        }
        Ok(entities)
    }

    /// A lossless JSON snapshot.
    pub fn to_json(&self) -> Result<String, ChunkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a snapshot written by [`BedrockColumn::to_json`].
    pub fn from_json(json: &str) -> Result<Self, ChunkError> {
        let column: Self = serde_json::from_str(json)?;
        column.check_shape()?;
        Ok(column)
    }

    pub(crate) fn check_shape(&self) -> Result<(), ChunkError> {
        let expected = Self::new(
            self.version,
            BedrockOptions {
                air: self.air,
                sky_light: self.has_sky_light,
            },
        );
        let sub_chunks_match = self.sub_chunks.iter().enumerate().all(|(index, sub_chunk)| {
            sub_chunk.as_ref().is_none_or(|sub_chunk| sub_chunk.y() == self.sub_chunk_y(index))
        });
        if self.sub_chunks.len() != expected.sub_chunks.len()
            || self.block_light.len() != expected.block_light.len()
            || self.sky_light.len() != expected.sky_light.len()
            || !self.biomes.same_shape(&expected.biomes)
            || !sub_chunks_match
        {
            return Err(ChunkError::decode("snapshot", "storage does not match the column shape"));
        }
        Ok(())
    }
}

fn with_position(pos: BlockPos, mut payload: NbtCompound) -> NbtCompound {
    let stored = (payload.get_i64("x"), payload.get_i64("y"), payload.get_i64("z"));
    let points_at_pos = matches!(
        stored,
        (Some(x), Some(y), Some(z)) if BlockPos::new(x as i32, y as i32, z as i32) == pos
    );
    if !points_at_pos {
        payload.insert("x", Tag::Int(i32::from(pos.x)));
        payload.insert("y", Tag::Int(pos.y));
        payload.insert("z", Tag::Int(i32::from(pos.z)));
    }
    payload
}

fn blob_buffer(store: &dyn BlobStore, hash: u64, kind: BlobType) -> Result<&[u8], ChunkError> {
    let entry = store
        .get(hash)
        .ok_or_else(|| ChunkError::decode("", format!("blob {hash:#018x} is not stored")))?;
    if entry.kind != kind {
        return Err(ChunkError::decode(
            "",
            format!("blob {hash:#018x} holds {:?}, expected {kind:?}", entry.kind),
        ));
    }
    Ok(&entry.buffer)
}

fn expect_end(cursor: &Cursor<&[u8]>, field: &str) -> Result<(), ChunkError> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if remaining == 0 {
        Ok(())
    } else {
        Err(ChunkError::decode(field, format!("{remaining} trailing bytes")))
    }
}

#[cfg(test)]
mod tests {
    use strata_registry::{BlockDescriptor, MemoryRegistry, PropertyValue};

    use super::*;
    use crate::bedrock::MemoryBlobStore;

    const AIR: BlockStateId = BlockStateId(0);

    fn registry() -> MemoryRegistry {
        let mut registry = MemoryRegistry::new();
        registry.register_default(BlockDescriptor::new(AIR, "minecraft:air")).unwrap();
        for id in 1..=40 {
            let descriptor = BlockDescriptor::new(BlockStateId(id), "minecraft:wool").with("color", PropertyValue::Int(id as i32));
            registry.register(descriptor).unwrap();
        }
        registry
    }

    fn generated(version: BedrockVersion) -> BedrockColumn {
        let mut column = BedrockColumn::new(version, BedrockOptions::default());
        let min_y = column.min_y();
        column
            .initialize(&mut |pos| {
                let depth = pos.y - min_y;
                (depth < 40 && (i32::from(pos.z) + depth) % 4 != 0)
                    .then(|| BlockStateId(1 + (u32::from(pos.x) + depth as u32) % 40))
            })
            .unwrap();
        column.set_block_layer(BlockPos::new(2, min_y + 3, 2), 1, BlockStateId(7)).unwrap();
        for x in 0..16 {
            column.set_biome(BlockPos::new(x, min_y + 20, 5), BiomeId(x as u32 * 3)).unwrap();
        }
        let mut sign = NbtCompound::new();
        sign.insert("id", Tag::String("Sign".to_owned()));
        column.set_block_entity(BlockPos::new(1, min_y + 10, 1), sign).unwrap();
        column
    }

    #[test]
    fn test_defaults_and_bounds() {
        let mut column = BedrockColumn::new(BedrockVersion::Bedrock118, BedrockOptions::default());
        let below = BlockPos::new(0, -65, 0);
        assert_eq!(column.get_block_state_id(below), AIR);
        assert_eq!(column.get_sky_light(below), 15);
        assert!(matches!(
            column.set_block_state_id(below, BlockStateId(1)),
            Err(ChunkError::OutOfWorld { y: -65, .. })
        ));
        column.set_block_state_id(BlockPos::new(0, 0, 0), AIR).unwrap();
        assert!(column.sub_chunk(4).is_none());
        column.set_block_state_id(BlockPos::new(0, 0, 0), BlockStateId(3)).unwrap();
        assert_eq!(column.sub_chunk(4).map(SubChunk::y), Some(0));
        assert_eq!(column.sub_chunk_count(), 5);
    }

    #[test]
    fn test_disk_round_trip() {
        let registry = registry();
        for version in BedrockVersion::ALL {
            let column = generated(version);
            let disk = column.dump(&registry).unwrap();
            assert_eq!(disk.sub_chunks.len(), 3);
            let mut loaded = BedrockColumn::new(version, BedrockOptions::default());
            loaded.load(&disk, &registry).unwrap();
            assert_eq!(loaded, column, "{version}");
            assert_eq!(loaded.get_block_layer(BlockPos::new(2, column.min_y() + 3, 2), 1), BlockStateId(7));
        }
    }

    #[test]
    fn test_heightmap() {
        let mut column = BedrockColumn::new(BedrockVersion::Bedrock118, BedrockOptions::default());
        column.set_block_state_id(BlockPos::new(3, -60, 2), BlockStateId(1)).unwrap();
        column.set_block_state_id(BlockPos::new(3, 100, 2), BlockStateId(1)).unwrap();
        let heightmap = column.heightmap();
        assert_eq!(heightmap[(2 << 4) | 3], 165);
        assert_eq!(heightmap[0], 0);
    }

    #[test]
    fn test_network_no_cache_round_trip() {
        for version in BedrockVersion::ALL {
            let column = generated(version);
            let chunk = column.network_encode_no_cache().unwrap();
            assert_eq!(chunk.sub_chunk_count, 3);
            let mut decoded = BedrockColumn::new(version, BedrockOptions::default());
            decoded.network_decode_no_cache(&chunk.payload, chunk.sub_chunk_count).unwrap();
            assert_eq!(decoded, column, "{version}");
        }
    }

    #[test]
    fn test_network_tail_is_strict() {
        let column = generated(BedrockVersion::Bedrock116);
        let mut chunk = column.network_encode_no_cache().unwrap();
        let border = chunk.payload.len() - {
            let mut tail = Vec::new();
            column.write_block_entities(&mut tail, NbtFlavor::NetworkLittleEndian).unwrap();
            tail.len()
        } - 1;
        chunk.payload[border] = 2;
        let mut decoded = BedrockColumn::new(BedrockVersion::Bedrock116, BedrockOptions::default());
        let err = decoded.network_decode_no_cache(&chunk.payload, chunk.sub_chunk_count).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "border_blocks"));
        assert_eq!(decoded, BedrockColumn::new(BedrockVersion::Bedrock116, BedrockOptions::default()));
    }

    #[test]
    fn test_sub_chunk_blob_round_trip() {
        let mut column = generated(BedrockVersion::Bedrock118);
        let mut store = MemoryBlobStore::new();
        let hash = column.encode_sub_chunk_blob(1, &mut store).unwrap();
        assert_eq!(column.encode_sub_chunk_blob(1, &mut store).unwrap(), hash);

        let mut decoded = BedrockColumn::new(BedrockVersion::Bedrock118, BedrockOptions::default());
        assert!(!decoded.decode_sub_chunk_blob(1, hash ^ 1, &store).unwrap());
        assert!(decoded.decode_sub_chunk_blob(1, hash, &store).unwrap());
        assert_eq!(decoded.sub_chunk(1), column.sub_chunk(1));
    }

    #[test]
    fn test_snapshot_json() {
        let mut column = generated(BedrockVersion::Bedrock118);
        column.set_block_light(BlockPos::new(1, 1, 1), 12).unwrap();
        let json = column.to_json().unwrap();
        assert_eq!(BedrockColumn::from_json(&json).unwrap(), column);
        assert!(BedrockColumn::from_json("{}").is_err());
    }

    #[test]
    fn test_snapshot_rejects_tampered_layers() {
        let column = generated(BedrockVersion::Bedrock118);
        let mut json: serde_json::Value = serde_json::from_str(&column.to_json().unwrap()).unwrap();
        let layer = &mut json["sub_chunks"][0]["layers"][0];
        assert!(layer["palette"].as_array().is_some_and(|palette| palette.len() > 2));
        layer["palette"] = serde_json::json!([0]);
        assert!(BedrockColumn::from_json(&json.to_string()).is_err());

        let mut json: serde_json::Value = serde_json::from_str(&column.to_json().unwrap()).unwrap();
        json["sub_chunks"][0]["layers"] = serde_json::json!([]);
        assert!(BedrockColumn::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn test_block_entity_position_tags() {
        let mut column = BedrockColumn::new(BedrockVersion::Bedrock118, BedrockOptions::default());
        let pos = BlockPos::new(3, 70, 4);

        let mut placed = NbtCompound::new();
        placed.insert("x", Tag::Int(35));
        placed.insert("y", Tag::Int(70));
        placed.insert("z", Tag::Int(-28));
        column.set_block_entity(pos, placed.clone()).unwrap();
        assert_eq!(column.get_block_entity(pos), Some(&placed));

        column.set_block_entity(pos, NbtCompound::new()).unwrap();
        let stored = column.get_block_entity(pos).unwrap();
        assert_eq!(
            (stored.get_i64("x"), stored.get_i64("y"), stored.get_i64("z")),
            (Some(3), Some(70), Some(4))
        );
    }
}
