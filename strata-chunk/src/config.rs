//! Column layout configuration, read from JSON5.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use strata_registry::BlockStateId;

use crate::{
    bedrock::{BedrockColumn, BedrockOptions, BedrockVersion},
    column::{AnyColumn, Edition},
    error::ChunkError,
    java::{DEFAULT_BIOME_BITS, JavaColumn, JavaOptions, JavaVersion},
};

/// The bundled default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../../package-content/column_config.json5");

/// Tallest supported world.
pub const MAX_WORLD_HEIGHT: u32 = 4064;

/// Which column layout to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnConfig {
    /// The game edition.
    pub edition: Edition,
    /// Dotted game version, e.g. `1.18.2`.
    pub version: String,
    /// Lowest block height, Java 1.17+ only.
    pub min_y: Option<i32>,
    /// Number of block rows, Java 1.17+ only.
    pub world_height: Option<u32>,
    /// Whether the dimension has sky light.
    pub sky_light: bool,
    /// Width of global biome ids in Java biome containers.
    pub biome_bits: u8,
    /// Runtime id of air, Bedrock only.
    pub air: u32,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            edition: Edition::Java,
            version: "1.18.2".to_owned(),
            min_y: None,
            world_height: None,
            sky_light: true,
            biome_bits: DEFAULT_BIOME_BITS,
            air: 0,
        }
    }
}

impl ColumnConfig {
    /// Parses and validates a JSON5 document.
    pub fn from_json5(source: &str) -> Result<Self, ChunkError> {
        let config: Self = serde_json5::from_str(source).map_err(|err| ChunkError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config at `path`, or the defaults when no file exists.
    pub fn load(path: &Path) -> Result<Self, ChunkError> {
        if !path.exists() {
            log::debug!("no column config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let source =
            fs::read_to_string(path).map_err(|err| ChunkError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json5(&source)
    }

    /// Checks that the version is supported and the height fits its layout.
    pub fn validate(&self) -> Result<(), ChunkError> {
        match self.edition {
            Edition::Java => self.validate_java().map(|_| ()),
            Edition::Bedrock => self.validate_bedrock().map(|_| ()),
        }
    }

    fn validate_java(&self) -> Result<JavaVersion, ChunkError> {
        let version = JavaVersion::from_version_str(&self.version).map_err(|err| ChunkError::Config(err.to_string()))?;
        let profile = version.profile();
        if !profile.variable_height && (self.min_y.is_some() || self.world_height.is_some()) {
            return Err(ChunkError::Config(format!("{version} columns have a fixed height")));
        }
        if let Some(height) = self
            .world_height
            .filter(|&height| height == 0 || height > MAX_WORLD_HEIGHT || height % 16 != 0)
        {
            return Err(ChunkError::Config(format!(
                "world height must be a multiple of 16 within 16..={MAX_WORLD_HEIGHT}, got {height}"
            )));
        }
        if let Some(min_y) = self.min_y.filter(|min_y| min_y % 16 != 0) {
            return Err(ChunkError::Config(format!("min y must be a multiple of 16, got {min_y}")));
        }
        if !(1..=31).contains(&self.biome_bits) {
            return Err(ChunkError::Config(format!(
                "biome bits must be in 1..=31, got {}",
                self.biome_bits
            )));
        }
        Ok(version)
    }

    fn validate_bedrock(&self) -> Result<BedrockVersion, ChunkError> {
        let version =
            BedrockVersion::from_version_str(&self.version).map_err(|err| ChunkError::Config(err.to_string()))?;
        let profile = version.profile();
        if self.min_y.is_some_and(|min_y| min_y != profile.min_y)
            || self.world_height.is_some_and(|height| height != profile.height)
        {
            return Err(ChunkError::Config(format!(
                "{version} columns span {}..{}",
                profile.min_y,
                profile.min_y + profile.height as i32
            )));
        }
        Ok(version)
    }

    /// Creates an empty column with this layout.
    pub fn build(&self) -> Result<AnyColumn, ChunkError> {
        match self.edition {
            Edition::Java => {
                let version = self.validate_java()?;
                let options = JavaOptions {
                    min_y: self.min_y,
                    world_height: self.world_height,
                    sky_light: self.sky_light,
                    biome_bits: self.biome_bits,
                };
                Ok(JavaColumn::new(version, options)?.into())
            }
            Edition::Bedrock => {
                let version = self.validate_bedrock()?;
                let options = BedrockOptions {
                    air: BlockStateId(self.air),
                    sky_light: self.sky_light,
                };
                Ok(BedrockColumn::new(version, options).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ChunkColumn;

    #[test]
    fn test_bundled_default_matches() {
        assert_eq!(ColumnConfig::from_json5(DEFAULT_CONFIG).unwrap(), ColumnConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ColumnConfig::load(Path::new("does/not/exist/column_config.json5")).unwrap();
        assert_eq!(config, ColumnConfig::default());
    }

    #[test]
    fn test_build_each_edition() {
        let java = ColumnConfig::from_json5("{ version: '1.18.2', min_y: -128, world_height: 512 }").unwrap();
        let column = java.build().unwrap();
        assert_eq!(column.edition(), Edition::Java);
        assert_eq!((column.min_y(), column.max_y()), (-128, 384));

        let bedrock = ColumnConfig::from_json5("{ edition: 'bedrock', version: '1.16.100', air: 134 }").unwrap();
        let AnyColumn::Bedrock(column) = bedrock.build().unwrap() else {
            panic!("expected a bedrock column");
        };
        assert_eq!(column.air(), BlockStateId(134));
        assert_eq!(column.max_y(), 256);
    }

    #[test]
    fn test_validation() {
        for source in [
            "{ version: '1.12.2', world_height: 512 }",
            "{ version: '1.18', world_height: 100 }",
            "{ version: '1.18', world_height: 4080 }",
            "{ version: '1.18', min_y: -60 }",
            "{ version: '1.18', biome_bits: 0 }",
            "{ version: '0.9' }",
            "{ edition: 'bedrock', version: '1.18.30', min_y: 0 }",
            "{ version: '1.18', colour: 'red' }",
        ] {
            assert!(
                matches!(ColumnConfig::from_json5(source), Err(ChunkError::Config(_))),
                "{source}"
            );
        }
    }
}
