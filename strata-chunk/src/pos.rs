use serde::{Deserialize, Serialize};
use strata_registry::{BiomeId, BlockStateId};

/// A position inside a chunk column.
///
/// `x` and `z` are local to the column and wrap into `0..16`; `y` is the
/// absolute world height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// Local x, always in `0..16`.
    pub x: u8,
    /// Absolute height.
    pub y: i32,
    /// Local z, always in `0..16`.
    pub z: u8,
}

impl BlockPos {
    /// Creates a position, masking `x` and `z` into the column.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: (x & 0xF) as u8,
            y,
            z: (z & 0xF) as u8,
        }
    }

    /// The height within a 16-block section.
    #[must_use]
    pub const fn local_y(self) -> u8 {
        (self.y & 0xF) as u8
    }

    /// The vertical section coordinate, `y >> 4`.
    #[must_use]
    pub const fn section_y(self) -> i32 {
        self.y >> 4
    }
}

/// Everything stored for a single block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block state.
    pub state: BlockStateId,
    /// The biome at this position.
    pub biome: BiomeId,
    /// Block light, `0..=15`.
    pub block_light: u8,
    /// Sky light, `0..=15`.
    pub sky_light: u8,
}
