//! Bedrock biome storage: a flat 2D map before 1.18, one storage per
//! sub-chunk afterwards.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::serial::{LittleEndianRead, LittleEndianWrite};

use super::{
    layer::{LayerCodec, StorageLayer},
    paletted_storage::storage_index,
};
use crate::error::{ChunkError, DecodeContext};

/// Header byte meaning "same biomes as the sub-chunk below".
pub const COPY_PREVIOUS: u8 = 0xFF;

/// Number of heightmap entries written before disk biomes.
pub const HEIGHTMAP_LEN: usize = 256;

/// Biomes of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum BedrockBiomes {
    /// One biome byte per `(x, z)`, indexed `(z << 4) | x`.
    Column2d(Vec<u8>),
    /// One storage per sub-chunk, block-indexed.
    Sectioned(Vec<StorageLayer>),
}

const fn column_index(x: u8, z: u8) -> usize {
    ((z as usize & 0xF) << 4) | (x as usize & 0xF)
}

impl BedrockBiomes {
    /// Biome 0 everywhere, in the 2D layout.
    #[must_use]
    pub fn column2d() -> Self {
        Self::Column2d(vec![0; 256])
    }

    /// Biome 0 everywhere, one storage for each of `sections` sub-chunks.
    #[must_use]
    pub fn sectioned(sections: usize) -> Self {
        Self::Sectioned(vec![StorageLayer::filled(0); sections])
    }

    /// Whether `other` has the same layout and section count.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Column2d(a), Self::Column2d(b)) => a.len() == b.len(),
            (Self::Sectioned(a), Self::Sectioned(b)) => a.len() == b.len(),
            _ => false,
        }
    }

    /// The biome at a position inside sub-chunk `slot`.
    #[must_use]
    pub fn get(&self, slot: usize, x: u8, y: u8, z: u8) -> u32 {
        match self {
            Self::Column2d(biomes) => u32::from(biomes[column_index(x, z)]),
            Self::Sectioned(layers) => layers[slot].get(storage_index(x, y, z)),
        }
    }

    /// Stores a biome inside sub-chunk `slot`.
    pub fn set(&mut self, slot: usize, x: u8, y: u8, z: u8, biome: u32) -> Result<(), ChunkError> {
        match self {
            Self::Column2d(biomes) => {
                biomes[column_index(x, z)] = u8::try_from(biome).map_err(|_| ChunkError::ValueOverflow {
                    value: u64::from(biome),
                    bits: 8,
                })?;
                Ok(())
            }
            Self::Sectioned(layers) => layers[slot].set(storage_index(x, y, z), biome),
        }
    }

    /// Writes the network form. Every storage is written out in full.
    pub fn write_network(&self, writer: &mut impl Write) -> Result<(), ChunkError> {
        self.write_body(writer, LayerCodec::Network)
    }

    /// Reads the network form into a storage shaped like `self`.
    pub fn read_network(&self, reader: &mut impl Read) -> Result<Self, ChunkError> {
        self.read_body(reader, LayerCodec::Network)
    }

    /// Writes the disk form: a heightmap, then the biomes.
    pub fn write_disk(&self, writer: &mut impl Write, heightmap: &[u16; HEIGHTMAP_LEN]) -> Result<(), ChunkError> {
        for &height in heightmap {
            writer.write_u16_le(height)?;
        }
        self.write_body(writer, LayerCodec::DiskIds)
    }

    /// Reads the disk form; the stored heightmap is discarded.
    pub fn read_disk(&self, reader: &mut impl Read) -> Result<Self, ChunkError> {
        for _ in 0..HEIGHTMAP_LEN {
            reader.read_u16_le().field("heightmap")?;
        }
        self.read_body(reader, LayerCodec::DiskIds)
    }

    fn write_body(&self, writer: &mut impl Write, codec: LayerCodec<'_>) -> Result<(), ChunkError> {
        match self {
            Self::Column2d(biomes) => writer.write_all(biomes)?,
            Self::Sectioned(layers) => {
                for layer in layers {
                    layer.write(writer, codec)?;
                }
            }
        }
        Ok(())
    }

    fn read_body(&self, reader: &mut impl Read, codec: LayerCodec<'_>) -> Result<Self, ChunkError> {
        match self {
            Self::Column2d(_) => {
                let mut biomes = vec![0; 256];
                reader.read_exact(&mut biomes).field("biomes")?;
                Ok(Self::Column2d(biomes))
            }
            Self::Sectioned(shape) => {
                let mut layers: Vec<StorageLayer> = Vec::with_capacity(shape.len());
                for i in 0..shape.len() {
                    let field = format!("biomes[{i}]");
                    let header = reader.read_u8_le().field("header").field(&field)?;
                    let layer = if header == COPY_PREVIOUS {
                        layers
                            .last()
                            .cloned()
                            .ok_or_else(|| ChunkError::decode("header", "nothing to copy").within(&field))?
                    } else {
                        StorageLayer::read_after_header(reader, header, codec).field(&field)?
                    };
                    layers.push(layer);
                }
                Ok(Self::Sectioned(layers))
            }
        }
    }
}
