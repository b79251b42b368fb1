use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_registry::{
    BlockRegistry, BlockStateId, PropertyValue,
    block::Properties,
};
use strata_utils::{
    codec::ZigZagVarInt,
    nbt::{self, NbtCompound, NbtFlavor, Tag},
    serial::{LittleEndianRead, LittleEndianWrite, ReadFrom, WriteTo},
};

use super::paletted_storage::{ALLOWED_BITS, PalettedStorage, STORAGE_SIZE, bits_for_palette};
use crate::error::{ChunkError, DecodeContext};

/// The palette kind flagged in the low bit of a storage header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaletteType {
    /// Entries are named block states (disk).
    Persistent,
    /// Entries are numeric ids (network, and disk biomes).
    Runtime,
}

impl PaletteType {
    const fn flag(self) -> u8 {
        match self {
            Self::Persistent => 0,
            Self::Runtime => 1,
        }
    }
}

/// How palette entries are encoded.
#[derive(Clone, Copy)]
pub enum LayerCodec<'a> {
    /// Zig-zag varint ids, with the count omitted for uniform layers.
    Network,
    /// Little-endian `i32` ids, as disk biomes store them.
    DiskIds,
    /// Little-endian NBT block states resolved through a registry.
    Persistent(&'a dyn BlockRegistry),
}

impl LayerCodec<'_> {
    /// The header flag this codec writes and expects.
    #[must_use]
    pub const fn palette_type(self) -> PaletteType {
        match self {
            Self::Persistent(_) => PaletteType::Persistent,
            Self::Network | Self::DiskIds => PaletteType::Runtime,
        }
    }
}

/// A palette plus the per-block indices into it.
///
/// Every stored index is below `palette.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayerRepr", into = "LayerRepr")]
pub struct StorageLayer {
    palette: Vec<u32>,
    storage: PalettedStorage,
}

#[derive(Serialize, Deserialize)]
struct LayerRepr {
    palette: Vec<u32>,
    storage: PalettedStorage,
}

impl TryFrom<LayerRepr> for StorageLayer {
    type Error = ChunkError;

    fn try_from(repr: LayerRepr) -> Result<Self, Self::Error> {
        let LayerRepr { palette, storage } = repr;
        let len = palette.len();
        if len == 0 || len > storage.index_capacity().min(STORAGE_SIZE) {
            return Err(ChunkError::decode(
                "palette",
                format!("{len} entries for a {}-bit storage", storage.bits_per_block()),
            ));
        }
        if storage.max_index() as usize >= len {
            return Err(ChunkError::decode(
                "storage",
                format!("index {} is outside the {len}-entry palette", storage.max_index()),
            ));
        }
        Ok(Self { palette, storage })
    }
}

impl From<StorageLayer> for LayerRepr {
    fn from(layer: StorageLayer) -> Self {
        Self {
            palette: layer.palette,
            storage: layer.storage,
        }
    }
}

impl StorageLayer {
    /// A layer holding `value` everywhere.
    #[must_use]
    pub fn filled(value: u32) -> Self {
        Self {
            palette: vec![value],
            storage: PalettedStorage::uniform(),
        }
    }

    /// The palette entries.
    #[must_use]
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// The index storage.
    #[must_use]
    pub fn storage(&self) -> &PalettedStorage {
        &self.storage
    }

    /// The value at a storage index.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        self.palette[self.storage.get_index(index) as usize]
    }

    /// Whether every position holds the same value.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.palette.len() == 1 || (0..STORAGE_SIZE).all(|index| self.get(index) == self.get(0))
    }

    /// Number of positions whose value satisfies `pred`.
    pub fn count_where(&self, mut pred: impl FnMut(u32) -> bool) -> usize {
        let hits: Vec<bool> = self.palette.iter().map(|&value| pred(value)).collect();
        (0..STORAGE_SIZE)
            .filter(|&index| hits[self.storage.get_index(index) as usize])
            .count()
    }

    /// Stores `value` at `index`, growing the palette and storage as needed.
    ///
    /// A new value arriving while the palette fills the storage width first
    /// counts every index to drop unreferenced entries, which costs a pass
    /// over all 4096 positions. Storage only widens when nothing can be
    /// dropped.
    pub fn set(&mut self, index: usize, value: u32) -> Result<(), ChunkError> {
        if index >= STORAGE_SIZE {
            return Err(ChunkError::Bounds {
                index,
                capacity: STORAGE_SIZE,
            });
        }
        let palette_index = match self.palette.iter().position(|&entry| entry == value) {
            Some(found) => found,
            None => {
                if self.palette.len() >= self.storage.index_capacity() {
                    self.compact(index)?;
                }
                self.palette.push(value);
                let len = self.palette.len();
                if len > self.storage.index_capacity() {
                    let bits = bits_for_palette(len)
                        .ok_or_else(|| ChunkError::Construction(format!("palette of {len} entries")))?;
                    log::debug!("growing bedrock storage to {bits} bits for {len} palette entries");
                    self.storage = self.storage.resize(bits)?;
                }
                len - 1
            }
        };
        self.storage.set_index(index, palette_index as u32)
    }

    // Drops palette entries no longer referenced, treating `overwritten` as free.
    fn compact(&mut self, overwritten: usize) -> Result<(), ChunkError> {
        let mut counts = vec![0_u32; self.palette.len()];
        self.storage.increment_palette(&mut counts)?;
        counts[self.storage.get_index(overwritten) as usize] -= 1;
        if counts.iter().all(|&count| count > 0) {
            return Ok(());
        }

        let mut remap = vec![0_u32; self.palette.len()];
        let mut palette = Vec::with_capacity(self.palette.len());
        for (old, &value) in self.palette.iter().enumerate() {
            if counts[old] > 0 {
                remap[old] = palette.len() as u32;
                palette.push(value);
            }
        }
        let mut storage = PalettedStorage::new(self.storage.bits_per_block())?;
        for index in 0..STORAGE_SIZE {
            if index != overwritten {
                storage.set_index(index, remap[self.storage.get_index(index) as usize])?;
            }
        }
        self.palette = palette;
        self.storage = storage;
        Ok(())
    }

    /// Writes the header, indices and palette.
    pub fn write(&self, writer: &mut impl Write, codec: LayerCodec<'_>) -> Result<(), ChunkError> {
        let bits = self.storage.bits_per_block();
        writer.write_all(&[(bits << 1) | codec.palette_type().flag()])?;
        self.storage.write(writer)?;

        let len = self.palette.len();
        match codec {
            LayerCodec::Network => {
                if bits != 0 {
                    ZigZagVarInt(len as i32).write(writer)?;
                }
                for &value in &self.palette {
                    ZigZagVarInt(value as i32).write(writer)?;
                }
            }
            LayerCodec::DiskIds => {
                writer.write_i32_le(len as i32)?;
                for &value in &self.palette {
                    writer.write_i32_le(value as i32)?;
                }
            }
            LayerCodec::Persistent(registry) => {
                writer.write_i32_le(len as i32)?;
                for &value in &self.palette {
                    let state = persisted_state(registry, BlockStateId(value))?;
                    nbt::write_root(writer, "", &state, NbtFlavor::LittleEndian)?;
                }
            }
        }
        Ok(())
    }

    /// Reads a layer, header byte included.
    pub fn read(reader: &mut impl Read, codec: LayerCodec<'_>) -> Result<Self, ChunkError> {
        let header = reader.read_u8_le().field("header")?;
        Self::read_after_header(reader, header, codec)
    }

    /// Reads a layer whose header byte was already consumed.
    pub fn read_after_header(reader: &mut impl Read, header: u8, codec: LayerCodec<'_>) -> Result<Self, ChunkError> {
        let expected = codec.palette_type();
        if header & 1 != expected.flag() {
            return Err(ChunkError::decode(
                "header",
                format!("expected a {expected:?} palette, got header {header:#04x}"),
            ));
        }
        let bits = header >> 1;
        if !ALLOWED_BITS.contains(&bits) {
            return Err(ChunkError::decode(
                "bits_per_value",
                format!("{bits} is not a valid storage width"),
            ));
        }
        let storage = PalettedStorage::read(reader, bits).field("storage")?;

        let palette_len = match codec {
            LayerCodec::Network if bits == 0 => 1,
            LayerCodec::Network => read_count(ZigZagVarInt::read(reader).field("palette_len")?.0)?,
            LayerCodec::DiskIds | LayerCodec::Persistent(_) => {
                read_count(reader.read_i32_le().field("palette_len")?)?
            }
        };
        let max_len = storage.index_capacity().min(STORAGE_SIZE);
        if palette_len == 0 || palette_len > max_len {
            return Err(ChunkError::decode(
                "palette_len",
                format!("{palette_len} entries for a {bits}-bit storage"),
            ));
        }

        let mut palette = Vec::with_capacity(palette_len);
        for i in 0..palette_len {
            let field = format!("palette[{i}]");
            palette.push(match codec {
                LayerCodec::Network => ZigZagVarInt::read(reader).field(&field)?.0 as u32,
                LayerCodec::DiskIds => reader.read_i32_le().field(&field)? as u32,
                LayerCodec::Persistent(registry) => {
                    let (_, state) = nbt::read_root(reader, NbtFlavor::LittleEndian).field(&field)?;
                    resolve_state(registry, &state).field(&field)?.0
                }
            });
        }

        if storage.max_index() as usize >= palette_len {
            return Err(ChunkError::decode(
                "storage",
                format!("index {} is outside the {palette_len}-entry palette", storage.max_index()),
            ));
        }
        Ok(Self { palette, storage })
    }
}

fn read_count(raw: i32) -> Result<usize, ChunkError> {
    usize::try_from(raw).map_err(|_| ChunkError::decode("palette_len", format!("negative length {raw}")))
}

fn persisted_state(registry: &dyn BlockRegistry, state: BlockStateId) -> Result<NbtCompound, ChunkError> {
    let descriptor = registry.describe(state).ok_or(ChunkError::UnknownState(state.0))?;
    let mut states = NbtCompound::new();
    for (key, value) in &descriptor.properties {
        states.insert(
            key.clone(),
            match value {
                PropertyValue::Bool(flag) => Tag::Byte(i8::from(*flag)),
                PropertyValue::Int(int) => Tag::Int(*int),
                PropertyValue::String(text) => Tag::String(text.clone()),
            },
        );
    }
    let mut compound = NbtCompound::new();
    compound.insert("name", Tag::String(descriptor.name.clone()));
    compound.insert("states", Tag::Compound(states));
    compound.insert("version", Tag::Int(registry.block_version()));
    Ok(compound)
}

fn resolve_state(registry: &dyn BlockRegistry, state: &NbtCompound) -> Result<BlockStateId, ChunkError> {
    let name = state
        .get_str("name")
        .ok_or_else(|| ChunkError::decode("name", "missing block name"))?;
    let mut properties = Properties::new();
    if let Some(states) = state.get_compound("states") {
        for (key, tag) in states.iter() {
            let value = match tag {
                Tag::Byte(flag) => PropertyValue::Bool(*flag != 0),
                Tag::Int(int) => PropertyValue::Int(*int),
                Tag::String(text) => PropertyValue::String(text.clone()),
                other => {
                    return Err(ChunkError::decode(
                        format!("states.{key}"),
                        format!("unexpected tag type {}", other.type_id()),
                    ));
                }
            };
            properties.insert(key.to_owned(), value);
        }
    }

    if let Some(id) = registry.state_id(name, &properties) {
        return Ok(id);
    }
    if let Some(id) = registry.default_state(name) {
        log::warn!("unknown state of {name} {properties:?}, using its default state");
        return Ok(id);
    }
    log::warn!("unknown block {name}, using air");
    Ok(registry.air())
}
