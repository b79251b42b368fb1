//! Per-version layout rules for the Java edition chunk format.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strata_utils::BitLayout;

use crate::{
    error::ChunkError,
    palette::{ContainerSpec, WireOptions},
};

/// Global biome width assumed when the caller does not configure one.
pub const DEFAULT_BIOME_BITS: u8 = 6;

/// A range of Java protocol revisions that share one chunk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JavaVersion {
    /// 1.8: flat `u16` block arrays.
    #[serde(rename = "1.8")]
    V1_8,
    /// 1.9 to 1.12: the first paletted format.
    #[serde(rename = "1.9")]
    V1_9,
    /// 1.13: the flattening.
    #[serde(rename = "1.13")]
    V1_13,
    /// 1.14: block counts, separate light.
    #[serde(rename = "1.14")]
    V1_14,
    /// 1.15: 3D biomes outside the section data.
    #[serde(rename = "1.15")]
    V1_15,
    /// 1.16: values no longer span words.
    #[serde(rename = "1.16")]
    V1_16,
    /// 1.17: variable world height.
    #[serde(rename = "1.17")]
    V1_17,
    /// 1.18 to 1.21.4: per-section biome containers.
    #[serde(rename = "1.18")]
    V1_18,
    /// 1.21.5 onward: containers without a data length prefix.
    #[serde(rename = "1.21.5")]
    V1_21_5,
}

/// How a section stores its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStorage {
    /// One little-endian `u16` per block, all sections grouped together.
    Flat,
    /// A palette container.
    Paletted,
}

/// Where light travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPlacement {
    /// Inside each section's encoding.
    InSection,
    /// In its own structure, one extra section below and above the column.
    Separate {
        /// Masks are `BitSet`s rather than VarInts.
        bitset_masks: bool,
    },
}

/// How biomes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiomeFormat {
    /// 256 bytes after the sections.
    Column2dBytes,
    /// 256 big-endian ints after the sections.
    Column2dInts,
    /// 4x4x4 cells as a separate int array.
    Separate3d,
    /// A biome container inside each section.
    Sectioned,
}

/// Every layout decision for one [`JavaVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaProfile {
    /// The version these rules describe.
    pub version: JavaVersion,
    /// Block storage kind.
    pub storage: SectionStorage,
    /// Sizing of the block container.
    pub blocks: ContainerSpec,
    /// Container framing.
    pub wire: WireOptions,
    /// Whether sections start with an `i16` non-air count.
    pub block_count: bool,
    /// Where light is encoded.
    pub light: LightPlacement,
    /// Where biomes are encoded.
    pub biomes: BiomeFormat,
    /// Whether `min_y` and the height can be configured.
    pub variable_height: bool,
    /// Whether every section is written regardless of the mask.
    pub write_all_sections: bool,
}

impl JavaVersion {
    /// Every supported layout, oldest first.
    pub const ALL: [Self; 9] = [
        Self::V1_8,
        Self::V1_9,
        Self::V1_13,
        Self::V1_14,
        Self::V1_15,
        Self::V1_16,
        Self::V1_17,
        Self::V1_18,
        Self::V1_21_5,
    ];

    /// Chooses the layout used by a dotted release such as `"1.20.4"`.
    pub fn from_version_str(version: &str) -> Result<Self, ChunkError> {
        let unsupported = || ChunkError::UnsupportedFormat {
            kind: "java version",
            version: version.to_owned(),
        };
        let mut parts = version.trim().split('.').map(str::parse::<u32>);
        let major = parts.next().and_then(Result::ok).ok_or_else(unsupported)?;
        let minor = parts.next().and_then(Result::ok).ok_or_else(unsupported)?;
        let patch = match parts.next() {
            Some(patch) => patch.map_err(|_| unsupported())?,
            None => 0,
        };
        if major != 1 {
            return Err(unsupported());
        }
        Ok(match (minor, patch) {
            (8, _) => Self::V1_8,
            (9..=12, _) => Self::V1_9,
            (13, _) => Self::V1_13,
            (14, _) => Self::V1_14,
            (15, _) => Self::V1_15,
            (16, _) => Self::V1_16,
            (17, _) => Self::V1_17,
            (18..=20, _) | (21, 0..=4) => Self::V1_18,
            (21, _) | (22.., _) => Self::V1_21_5,
            _ => return Err(unsupported()),
        })
    }

    /// The layout rules for this version.
    #[must_use]
    pub const fn profile(self) -> JavaProfile {
        let legacy_wire = WireOptions {
            size_prefix: true,
            direct_palette_len: false,
        };
        match self {
            Self::V1_8 => JavaProfile {
                version: self,
                storage: SectionStorage::Flat,
                blocks: ContainerSpec::blocks(16, BitLayout::Spanning, true),
                wire: legacy_wire,
                block_count: false,
                light: LightPlacement::InSection,
                biomes: BiomeFormat::Column2dBytes,
                variable_height: false,
                write_all_sections: false,
            },
            Self::V1_9 => JavaProfile {
                version: self,
                storage: SectionStorage::Paletted,
                blocks: ContainerSpec::blocks(13, BitLayout::Spanning, false),
                wire: WireOptions {
                    size_prefix: true,
                    direct_palette_len: true,
                },
                block_count: false,
                light: LightPlacement::InSection,
                biomes: BiomeFormat::Column2dBytes,
                variable_height: false,
                write_all_sections: false,
            },
            Self::V1_13 => JavaProfile {
                version: self,
                storage: SectionStorage::Paletted,
                blocks: ContainerSpec::blocks(14, BitLayout::Spanning, false),
                wire: legacy_wire,
                block_count: false,
                light: LightPlacement::InSection,
                biomes: BiomeFormat::Column2dInts,
                variable_height: false,
                write_all_sections: false,
            },
            Self::V1_14 | Self::V1_15 => JavaProfile {
                version: self,
                storage: SectionStorage::Paletted,
                blocks: ContainerSpec::blocks(14, BitLayout::Spanning, false),
                wire: legacy_wire,
                block_count: true,
                light: LightPlacement::Separate { bitset_masks: false },
                biomes: if matches!(self, Self::V1_14) {
                    BiomeFormat::Column2dInts
                } else {
                    BiomeFormat::Separate3d
                },
                variable_height: false,
                write_all_sections: false,
            },
            Self::V1_16 | Self::V1_17 => JavaProfile {
                version: self,
                storage: SectionStorage::Paletted,
                blocks: ContainerSpec::blocks(15, BitLayout::Padded, false),
                wire: legacy_wire,
                block_count: true,
                light: LightPlacement::Separate {
                    bitset_masks: matches!(self, Self::V1_17),
                },
                biomes: BiomeFormat::Separate3d,
                variable_height: matches!(self, Self::V1_17),
                write_all_sections: false,
            },
            Self::V1_18 | Self::V1_21_5 => JavaProfile {
                version: self,
                storage: SectionStorage::Paletted,
                blocks: ContainerSpec::blocks(15, BitLayout::Padded, true),
                wire: WireOptions {
                    size_prefix: matches!(self, Self::V1_18),
                    direct_palette_len: false,
                },
                block_count: true,
                light: LightPlacement::Separate { bitset_masks: true },
                biomes: BiomeFormat::Sectioned,
                variable_height: true,
                write_all_sections: true,
            },
        }
    }
}

impl JavaProfile {
    /// Lowest block height when the caller does not choose one.
    #[must_use]
    pub const fn default_min_y(&self) -> i32 {
        if matches!(self.biomes, BiomeFormat::Sectioned) { -64 } else { 0 }
    }

    /// World height when the caller does not choose one.
    #[must_use]
    pub const fn default_height(&self) -> u32 {
        if matches!(self.biomes, BiomeFormat::Sectioned) { 384 } else { 256 }
    }
}

impl fmt::Display for JavaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1_8 => "1.8",
            Self::V1_9 => "1.9",
            Self::V1_13 => "1.13",
            Self::V1_14 => "1.14",
            Self::V1_15 => "1.15",
            Self::V1_16 => "1.16",
            Self::V1_17 => "1.17",
            Self::V1_18 => "1.18",
            Self::V1_21_5 => "1.21.5",
        })
    }
}

impl FromStr for JavaVersion {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_version_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_strings() {
        assert_eq!(JavaVersion::from_version_str("1.8.9").unwrap(), JavaVersion::V1_8);
        assert_eq!(JavaVersion::from_version_str("1.12.2").unwrap(), JavaVersion::V1_9);
        assert_eq!(JavaVersion::from_version_str("1.16.5").unwrap(), JavaVersion::V1_16);
        assert_eq!(JavaVersion::from_version_str("1.20.4").unwrap(), JavaVersion::V1_18);
        assert_eq!(JavaVersion::from_version_str("1.21.4").unwrap(), JavaVersion::V1_18);
        assert_eq!(JavaVersion::from_version_str("1.21.5").unwrap(), JavaVersion::V1_21_5);
        assert_eq!(JavaVersion::from_version_str("1.21").unwrap(), JavaVersion::V1_18);
        for bad in ["1.7.10", "2.0", "1", "one.two", "1.18.x"] {
            assert!(
                matches!(
                    JavaVersion::from_version_str(bad),
                    Err(ChunkError::UnsupportedFormat { .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_profiles_follow_the_version_table() {
        let legacy = JavaVersion::V1_9.profile();
        assert_eq!(legacy.blocks.global_bits, 13);
        assert_eq!(legacy.blocks.layout, BitLayout::Spanning);
        assert!(legacy.wire.direct_palette_len);

        let padded = JavaVersion::V1_16.profile();
        assert_eq!(padded.blocks.layout, BitLayout::Padded);
        assert_eq!(padded.biomes, BiomeFormat::Separate3d);

        let modern = JavaVersion::V1_21_5.profile();
        assert!(!modern.wire.size_prefix);
        assert!(modern.blocks.single_value);
        assert_eq!(modern.default_min_y(), -64);

        for version in JavaVersion::ALL {
            assert_eq!(version.to_string().parse::<JavaVersion>().unwrap(), version);
        }
    }
}
