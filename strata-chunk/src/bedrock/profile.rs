use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::sub_chunk::SubChunkFormat;
use crate::error::ChunkError;

/// Bedrock chunk layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BedrockVersion {
    /// 1.16 and 1.17: 0..256, v8 sub-chunks, 2D biomes.
    #[serde(rename = "1.16")]
    Bedrock116,
    /// 1.18 onwards: -64..320, v9 sub-chunks, 3D biomes.
    #[serde(rename = "1.18")]
    Bedrock118,
}

/// How biomes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiomeLayout {
    /// 256 bytes per column.
    Column2d,
    /// One storage per sub-chunk.
    Sectioned,
}

/// The layout rules of one [`BedrockVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BedrockProfile {
    /// The version these rules belong to.
    pub version: BedrockVersion,
    /// Lowest block height.
    pub min_y: i32,
    /// Number of block rows.
    pub height: u32,
    /// Sub-chunk layout written to disk and network.
    pub sub_chunk_format: SubChunkFormat,
    /// Biome layout.
    pub biomes: BiomeLayout,
}

impl BedrockProfile {
    /// Number of sub-chunks in a column.
    #[must_use]
    pub const fn sub_chunk_count(&self) -> usize {
        (self.height / 16) as usize
    }

    /// Vertical index of the lowest sub-chunk.
    #[must_use]
    pub const fn min_section(&self) -> i32 {
        self.min_y >> 4
    }
}

impl BedrockVersion {
    /// Every supported layout, oldest first.
    pub const ALL: [Self; 2] = [Self::Bedrock116, Self::Bedrock118];

    /// Picks the layout for a dotted game version such as `1.18.30`.
    pub fn from_version_str(version: &str) -> Result<Self, ChunkError> {
        let unsupported = || ChunkError::UnsupportedFormat {
            kind: "bedrock version",
            version: version.to_owned(),
        };
        let mut parts = version.split('.').map(str::parse::<u32>);
        let (Some(Ok(1)), Some(Ok(minor))) = (parts.next(), parts.next()) else {
            return Err(unsupported());
        };
        if parts.any(|part| part.is_err()) {
            return Err(unsupported());
        }
        match minor {
            16 | 17 => Ok(Self::Bedrock116),
            18.. => Ok(Self::Bedrock118),
            _ => Err(unsupported()),
        }
    }

    /// The layout rules for this version.
    #[must_use]
    pub const fn profile(self) -> BedrockProfile {
        match self {
            Self::Bedrock116 => BedrockProfile {
                version: self,
                min_y: 0,
                height: 256,
                sub_chunk_format: SubChunkFormat::V8,
                biomes: BiomeLayout::Column2d,
            },
            Self::Bedrock118 => BedrockProfile {
                version: self,
                min_y: -64,
                height: 384,
                sub_chunk_format: SubChunkFormat::V9,
                biomes: BiomeLayout::Sectioned,
            },
        }
    }
}

impl fmt::Display for BedrockVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bedrock116 => "bedrock 1.16",
            Self::Bedrock118 => "bedrock 1.18",
        })
    }
}

impl FromStr for BedrockVersion {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_version_str(s)
    }
}
