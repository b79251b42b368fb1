use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use strata_registry::BlockStateId;
use strata_utils::serial::LittleEndianRead;

use super::{
    layer::{LayerCodec, StorageLayer},
    paletted_storage::storage_index,
};
use crate::error::{ChunkError, DecodeContext};

/// Most layers a sub-chunk carries: blocks and an overlay such as water.
pub const MAX_LAYERS: usize = 2;

/// On-disk and network sub-chunk layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubChunkFormat {
    /// A single persisted layer without a count.
    V1,
    /// A layer count, then the layers.
    V8,
    /// A layer count and the sub-chunk's y index, then the layers.
    V9,
}

impl SubChunkFormat {
    /// The leading version byte.
    #[must_use]
    pub const fn version_byte(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V8 => 8,
            Self::V9 => 9,
        }
    }
}

/// A 16x16x16 Bedrock volume with one or two block layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubChunkRepr", into = "SubChunkRepr")]
pub struct SubChunk {
    y: i8,
    air: BlockStateId,
    layers: SmallVec<[StorageLayer; MAX_LAYERS]>,
    solid_block_count: u16,
}

// The solid count is derived, so snapshots omit it.
#[derive(Serialize, Deserialize)]
struct SubChunkRepr {
    y: i8,
    air: BlockStateId,
    layers: SmallVec<[StorageLayer; MAX_LAYERS]>,
}

impl TryFrom<SubChunkRepr> for SubChunk {
    type Error = ChunkError;

    fn try_from(repr: SubChunkRepr) -> Result<Self, Self::Error> {
        if repr.layers.is_empty() || repr.layers.len() > MAX_LAYERS {
            return Err(ChunkError::decode(
                "layers",
                format!("expected 1..={MAX_LAYERS} layers, got {}", repr.layers.len()),
            ));
        }
        let mut sub_chunk = Self {
            y: repr.y,
            air: repr.air,
            layers: repr.layers,
            solid_block_count: 0,
        };
        sub_chunk.recount();
        Ok(sub_chunk)
    }
}

impl From<SubChunk> for SubChunkRepr {
    fn from(sub_chunk: SubChunk) -> Self {
        Self {
            y: sub_chunk.y,
            air: sub_chunk.air,
            layers: sub_chunk.layers,
        }
    }
}

impl SubChunk {
    /// An all-air sub-chunk at vertical index `y`.
    #[must_use]
    pub fn new(y: i8, air: BlockStateId) -> Self {
        Self {
            y,
            air,
            layers: smallvec![StorageLayer::filled(air.0)],
            solid_block_count: 0,
        }
    }

    /// Vertical index, `block_y >> 4`.
    #[must_use]
    pub fn y(&self) -> i8 {
        self.y
    }

    /// The layers, block layer first.
    #[must_use]
    pub fn layers(&self) -> &[StorageLayer] {
        &self.layers
    }

    /// Blocks in the first layer that are not air.
    #[must_use]
    pub fn solid_block_count(&self) -> u16 {
        self.solid_block_count
    }

    /// Whether every layer holds only air.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solid_block_count == 0
            && self.layers[1..]
                .iter()
                .all(|layer| layer.count_where(|state| state != self.air.0) == 0)
    }

    /// The state on `layer` at a local position; air on a missing layer.
    #[must_use]
    pub fn get(&self, layer: usize, x: u8, y: u8, z: u8) -> BlockStateId {
        self.layers
            .get(layer)
            .map_or(self.air, |storage| BlockStateId(storage.get(storage_index(x, y, z))))
    }

    /// Stores a state on `layer`, adding the overlay layer on demand.
    pub fn set(&mut self, layer: usize, x: u8, y: u8, z: u8, state: BlockStateId) -> Result<(), ChunkError> {
        if layer >= MAX_LAYERS {
            return Err(ChunkError::Bounds {
                index: layer,
                capacity: MAX_LAYERS,
            });
        }
        if layer >= self.layers.len() {
            if state == self.air {
                return Ok(());
            }
            self.layers.push(StorageLayer::filled(self.air.0));
        }

        let index = storage_index(x, y, z);
        let old = BlockStateId(self.layers[layer].get(index));
        self.layers[layer].set(index, state.0)?;
        if layer == 0 {
            if old == self.air && state != self.air {
                self.solid_block_count += 1;
            } else if old != self.air && state == self.air {
                self.solid_block_count -= 1;
            }
        }
        Ok(())
    }

    fn recount(&mut self) {
        let air = self.air.0;
        self.solid_block_count = self.layers[0].count_where(|state| state != air) as u16;
    }

    /// Writes the sub-chunk in `format`.
    pub fn write(&self, writer: &mut impl Write, format: SubChunkFormat, codec: LayerCodec<'_>) -> Result<(), ChunkError> {
        writer.write_all(&[format.version_byte()])?;
        match format {
            SubChunkFormat::V1 => return self.layers[0].write(writer, codec),
            SubChunkFormat::V8 => writer.write_all(&[self.layers.len() as u8])?,
            SubChunkFormat::V9 => writer.write_all(&[self.layers.len() as u8, self.y as u8])?,
        }
        for layer in &self.layers {
            layer.write(writer, codec)?;
        }
        Ok(())
    }

    /// Reads a sub-chunk expected at vertical index `y`, in any supported format.
    pub fn read(reader: &mut impl Read, y: i8, air: BlockStateId, codec: LayerCodec<'_>) -> Result<Self, ChunkError> {
        let version = reader.read_u8_le().field("version")?;
        let layer_count = match version {
            1 => 1,
            8 | 9 => {
                let count = reader.read_u8_le().field("layer_count")?;
                if count == 0 || usize::from(count) > MAX_LAYERS {
                    return Err(ChunkError::decode(
                        "layer_count",
                        format!("expected 1..={MAX_LAYERS} layers, got {count}"),
                    ));
                }
                if version == 9 {
                    let sent = reader.read_u8_le().field("y")? as i8;
                    if sent != y {
                        return Err(ChunkError::decode("y", format!("expected sub-chunk {y}, got {sent}")));
                    }
                }
                usize::from(count)
            }
            other => {
                return Err(ChunkError::UnsupportedFormat {
                    kind: "bedrock sub-chunk version",
                    version: other.to_string(),
                });
            }
        };

        let mut layers = SmallVec::new();
        for i in 0..layer_count {
            layers.push(StorageLayer::read(reader, codec).field(&format!("layer[{i}]"))?);
        }
        let mut sub_chunk = Self {
            y,
            air,
            layers,
            solid_block_count: 0,
        };
        sub_chunk.recount();
        Ok(sub_chunk)
    }

    /// Highest local y in the column `(x, z)` holding a non-air block on the first layer.
    #[must_use]
    pub fn top_solid(&self, x: u8, z: u8) -> Option<u8> {
        (0..16_u8).rev().find(|&y| self.get(0, x, y, z) != self.air)
    }
}
