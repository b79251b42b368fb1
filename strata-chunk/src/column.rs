//! The edition-agnostic column surface.

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use strata_registry::{BiomeId, BlockStateId};
use strata_utils::{codec::BitSet, nbt::NbtCompound};

use crate::{
    bedrock::BedrockColumn,
    error::ChunkError,
    java::JavaColumn,
    pos::{Block, BlockPos},
};

/// The game edition a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edition {
    /// Java edition.
    Java,
    /// Bedrock edition.
    Bedrock,
}

/// Operations every chunk column supports, whatever its edition.
#[enum_dispatch]
pub trait ChunkColumn {
    /// Lowest block height.
    fn min_y(&self) -> i32;

    /// One past the highest block height.
    fn max_y(&self) -> i32;

    /// The state at `pos`; air outside the world.
    fn get_block_state_id(&self, pos: BlockPos) -> BlockStateId;

    /// Stores a block state.
    fn set_block_state_id(&mut self, pos: BlockPos, state: BlockStateId) -> Result<(), ChunkError>;

    /// Everything stored at `pos`.
    fn get_block(&self, pos: BlockPos) -> Block;

    /// Stores every part of `block` at `pos`.
    fn set_block(&mut self, pos: BlockPos, block: &Block) -> Result<(), ChunkError>;

    /// The biome at `pos`; biome 0 outside the world.
    fn get_biome(&self, pos: BlockPos) -> BiomeId;

    /// Stores a biome.
    fn set_biome(&mut self, pos: BlockPos, biome: BiomeId) -> Result<(), ChunkError>;

    /// Block light at `pos`.
    fn get_block_light(&self, pos: BlockPos) -> u8;

    /// Stores block light.
    fn set_block_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError>;

    /// Sky light at `pos`.
    fn get_sky_light(&self, pos: BlockPos) -> u8;

    /// Stores sky light.
    fn set_sky_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError>;

    /// Sections holding anything other than air.
    fn get_mask(&self) -> BitSet;

    /// Fills the column from `generate`, skipping positions where it returns `None`.
    fn initialize(&mut self, generate: &mut dyn FnMut(BlockPos) -> Option<BlockStateId>) -> Result<(), ChunkError>;

    /// Stores a block entity payload.
    fn set_block_entity(&mut self, pos: BlockPos, payload: NbtCompound) -> Result<(), ChunkError>;

    /// The block entity payload at `pos`.
    fn get_block_entity(&self, pos: BlockPos) -> Option<&NbtCompound>;

    /// Removes the block entity payload at `pos`.
    fn remove_block_entity(&mut self, pos: BlockPos) -> Option<NbtCompound>;

    /// A lossless JSON snapshot.
    fn to_json(&self) -> Result<String, ChunkError>;
}

macro_rules! impl_chunk_column {
    ($column:ident) => {
        impl ChunkColumn for $column {
            fn min_y(&self) -> i32 {
                $column::min_y(self)
            }

            fn max_y(&self) -> i32 {
                $column::max_y(self)
            }

            fn get_block_state_id(&self, pos: BlockPos) -> BlockStateId {
                $column::get_block_state_id(self, pos)
            }

            fn set_block_state_id(&mut self, pos: BlockPos, state: BlockStateId) -> Result<(), ChunkError> {
                $column::set_block_state_id(self, pos, state)
            }

            fn get_block(&self, pos: BlockPos) -> Block {
                $column::get_block(self, pos)
            }

            fn set_block(&mut self, pos: BlockPos, block: &Block) -> Result<(), ChunkError> {
                $column::set_block(self, pos, block)
            }

            fn get_biome(&self, pos: BlockPos) -> BiomeId {
                $column::get_biome(self, pos)
            }

            fn set_biome(&mut self, pos: BlockPos, biome: BiomeId) -> Result<(), ChunkError> {
                $column::set_biome(self, pos, biome)
            }

            fn get_block_light(&self, pos: BlockPos) -> u8 {
                $column::get_block_light(self, pos)
            }

            fn set_block_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
                $column::set_block_light(self, pos, level)
            }

            fn get_sky_light(&self, pos: BlockPos) -> u8 {
                $column::get_sky_light(self, pos)
            }

            fn set_sky_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
                $column::set_sky_light(self, pos, level)
            }

            fn get_mask(&self) -> BitSet {
                $column::get_mask(self)
            }

            fn initialize(
                &mut self,
                generate: &mut dyn FnMut(BlockPos) -> Option<BlockStateId>,
            ) -> Result<(), ChunkError> {
                $column::initialize(self, generate)
            }

            fn set_block_entity(&mut self, pos: BlockPos, payload: NbtCompound) -> Result<(), ChunkError> {
                $column::set_block_entity(self, pos, payload)
            }

            fn get_block_entity(&self, pos: BlockPos) -> Option<&NbtCompound> {
                $column::get_block_entity(self, pos)
            }

            fn remove_block_entity(&mut self, pos: BlockPos) -> Option<NbtCompound> {
                $column::remove_block_entity(self, pos)
            }

            fn to_json(&self) -> Result<String, ChunkError> {
                $column::to_json(self)
            }
        }
    };
}

impl_chunk_column!(JavaColumn);
impl_chunk_column!(BedrockColumn);

/// A column of either edition.
#[enum_dispatch(ChunkColumn)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edition", rename_all = "snake_case")]
pub enum AnyColumn {
    /// A Java edition column.
    Java(JavaColumn),
    /// A Bedrock edition column.
    Bedrock(BedrockColumn),
}

impl AnyColumn {
    /// The edition of the wrapped column.
    #[must_use]
    pub fn edition(&self) -> Edition {
        match self {
            Self::Java(_) => Edition::Java,
            Self::Bedrock(_) => Edition::Bedrock,
        }
    }

    /// A lossless JSON snapshot tagged with the edition.
    pub fn to_json(&self) -> Result<String, ChunkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a snapshot written by [`AnyColumn::to_json`].
    pub fn from_json(json: &str) -> Result<Self, ChunkError> {
        let column: Self = serde_json::from_str(json)?;
        match &column {
            Self::Java(java) => java.check_shape()?,
            Self::Bedrock(bedrock) => bedrock.check_shape()?,
        }
        Ok(column)
    }
}
