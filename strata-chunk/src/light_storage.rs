//! Light storage for chunk sections.
//!
//! Light values are stored as 4-bit values (0-15), packed as two values per byte.
//! For a 16x16x16 section, this requires 2048 bytes (4096 blocks / 2).

use serde::{Deserialize, Serialize};

use crate::error::ChunkError;

/// The number of bytes needed to store light data for a 16x16x16 section.
pub const LIGHT_ARRAY_SIZE: usize = 2048;

/// Storage for light data in a chunk section.
///
/// Two storages are equal when they hold the same levels, whichever variant
/// they use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LightRepr", into = "LightRepr")]
pub enum LightStorage {
    /// All blocks in the section have the same light level (0-15).
    Homogeneous(u8),
    /// Blocks have different light levels, stored as packed nibbles.
    /// The low nibble of each byte holds the even index.
    Heterogeneous(Box<[u8; LIGHT_ARRAY_SIZE]>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LightRepr {
    Homogeneous(u8),
    Heterogeneous(Vec<u8>),
}

#[inline]
const fn packed(level: u8) -> u8 {
    (level & 0x0F) | ((level & 0x0F) << 4)
}

#[inline]
const fn nibble_index(x: usize, y: usize, z: usize) -> (usize, bool) {
    let block_index = y * 256 + z * 16 + x;
    (block_index >> 1, (block_index & 1) == 1)
}

impl LightStorage {
    /// Creates a new homogeneous light storage with all blocks at the given light level.
    #[must_use]
    pub fn new_filled(light_level: u8) -> Self {
        debug_assert!(light_level <= 15, "Light level must be 0-15");
        Self::Homogeneous(light_level & 0x0F)
    }

    /// Creates a new empty (dark) light storage.
    #[must_use]
    pub fn new_empty() -> Self {
        Self::Homogeneous(0)
    }

    /// Parses a raw nibble array, collapsing uniform data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkError> {
        let data: [u8; LIGHT_ARRAY_SIZE] = bytes.try_into().map_err(|_| {
            ChunkError::decode(
                "",
                format!("light arrays are {LIGHT_ARRAY_SIZE} bytes, got {}", bytes.len()),
            )
        })?;
        let first = data[0];
        if first == packed(first) && data.iter().all(|&byte| byte == first) {
            return Ok(Self::Homogeneous(first & 0x0F));
        }
        Ok(Self::Heterogeneous(Box::new(data)))
    }

    /// Gets the light level at the given position.
    #[must_use]
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        debug_assert!(x < 16 && y < 16 && z < 16, "Coordinates must be 0-15");

        match self {
            Self::Homogeneous(level) => *level,
            Self::Heterogeneous(data) => {
                let (byte_index, is_upper_nibble) = nibble_index(x, y, z);
                if is_upper_nibble {
                    (data[byte_index] >> 4) & 0x0F
                } else {
                    data[byte_index] & 0x0F
                }
            }
        }
    }

    /// Sets the light level at the given position.
    ///
    /// If currently homogeneous and setting a different value, upgrades to heterogeneous.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, light_level: u8) {
        debug_assert!(x < 16 && y < 16 && z < 16, "Coordinates must be 0-15");
        let light_level = light_level & 0x0F;

        if let Self::Homogeneous(current_level) = *self {
            if light_level == current_level {
                return;
            }
            *self = Self::Heterogeneous(Box::new([packed(current_level); LIGHT_ARRAY_SIZE]));
        }

        if let Self::Heterogeneous(data) = self {
            let (byte_index, is_upper_nibble) = nibble_index(x, y, z);
            if is_upper_nibble {
                data[byte_index] = (data[byte_index] & 0x0F) | (light_level << 4);
            } else {
                data[byte_index] = (data[byte_index] & 0xF0) | light_level;
            }
        }
    }

    /// Whether every level is zero.
    #[must_use]
    pub fn is_dark(&self) -> bool {
        match self {
            Self::Homogeneous(level) => *level == 0,
            Self::Heterogeneous(data) => data.iter().all(|&byte| byte == 0),
        }
    }

    /// Returns the raw nibble array.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Homogeneous(level) => vec![packed(*level); LIGHT_ARRAY_SIZE],
            Self::Heterogeneous(data) => data.to_vec(),
        }
    }
}

impl PartialEq for LightStorage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Homogeneous(a), Self::Homogeneous(b)) => a == b,
            _ => self.to_bytes() == other.to_bytes(),
        }
    }
}

impl Eq for LightStorage {}

impl TryFrom<LightRepr> for LightStorage {
    type Error = ChunkError;

    fn try_from(repr: LightRepr) -> Result<Self, Self::Error> {
        match repr {
            LightRepr::Homogeneous(level) if level <= 15 => Ok(Self::Homogeneous(level)),
            LightRepr::Homogeneous(level) => Err(ChunkError::decode("light", format!("level {level} exceeds 15"))),
            LightRepr::Heterogeneous(bytes) => Self::from_bytes(&bytes),
        }
    }
}

impl From<LightStorage> for LightRepr {
    fn from(storage: LightStorage) -> Self {
        match storage {
            LightStorage::Homogeneous(level) => Self::Homogeneous(level),
            LightStorage::Heterogeneous(data) => Self::Heterogeneous(data.to_vec()),
        }
    }
}
