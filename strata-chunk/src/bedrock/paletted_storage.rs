//! Bedrock's 16x16x16 index storage.
//!
//! Indices are packed into little-endian `u32` words with no value crossing
//! a word boundary, and only a fixed set of widths is valid.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{BitArray, BitLayout, Endian, needed_bits, value_mask};

use crate::error::{ChunkError, DecodeContext};

/// Number of values in one storage.
pub const STORAGE_SIZE: usize = 4096;

/// Widths Bedrock accepts for a storage.
pub const ALLOWED_BITS: [u8; 9] = [0, 1, 2, 3, 4, 5, 6, 8, 16];

/// Index of a block inside a Bedrock storage. Coordinates wrap into `0..16`.
#[inline]
#[must_use]
pub const fn storage_index(x: u8, y: u8, z: u8) -> usize {
    ((x as usize & 0xF) << 8) | ((z as usize & 0xF) << 4) | (y as usize & 0xF)
}

/// The narrowest allowed width that can index a palette of `len` entries.
#[must_use]
pub fn bits_for_palette(len: usize) -> Option<u8> {
    if len <= 1 {
        return Some(0);
    }
    let needed = needed_bits((len - 1) as u64);
    ALLOWED_BITS.into_iter().find(|&bits| bits >= needed)
}

/// A fixed-size array of palette indices.
///
/// A width of 0 stores nothing and reads back index 0 everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StorageRepr", into = "StorageRepr")]
pub struct PalettedStorage {
    data: Option<BitArray<u32>>,
}

#[derive(Serialize, Deserialize)]
struct StorageRepr {
    data: Option<BitArray<u32>>,
}

impl TryFrom<StorageRepr> for PalettedStorage {
    type Error = ChunkError;

    fn try_from(repr: StorageRepr) -> Result<Self, Self::Error> {
        if let Some(data) = &repr.data {
            let bits = data.bits_per_value();
            if bits == 0 {
                return Err(ChunkError::decode("storage", "a stored array needs a width"));
            }
            check_bits(bits).field("storage")?;
            if data.capacity() != STORAGE_SIZE || data.layout() != BitLayout::Padded {
                return Err(ChunkError::decode(
                    "storage",
                    format!("expected {STORAGE_SIZE} padded values, got {}", data.capacity()),
                ));
            }
        }
        Ok(Self { data: repr.data })
    }
}

impl From<PalettedStorage> for StorageRepr {
    fn from(storage: PalettedStorage) -> Self {
        Self { data: storage.data }
    }
}

impl PalettedStorage {
    /// Creates a zero-filled storage of `bits` bits per value.
    pub fn new(bits: u8) -> Result<Self, ChunkError> {
        check_bits(bits)?;
        let data = if bits == 0 {
            None
        } else {
            Some(BitArray::new(bits, STORAGE_SIZE, BitLayout::Padded)?)
        };
        Ok(Self { data })
    }

    /// A width-0 storage.
    #[must_use]
    pub const fn uniform() -> Self {
        Self { data: None }
    }

    /// Width of each value.
    #[must_use]
    pub fn bits_per_block(&self) -> u8 {
        self.data.as_ref().map_or(0, BitArray::bits_per_value)
    }

    /// Number of distinct indices this width can hold.
    #[must_use]
    pub fn index_capacity(&self) -> usize {
        1 << self.bits_per_block()
    }

    /// The value at a block position.
    #[must_use]
    pub fn get(&self, x: u8, y: u8, z: u8) -> u32 {
        self.get_index(storage_index(x, y, z))
    }

    /// The value at a raw index; indices past the end read as 0.
    #[must_use]
    pub fn get_index(&self, index: usize) -> u32 {
        self.data
            .as_ref()
            .and_then(|data| data.try_get(index).ok())
            .map_or(0, |value| value as u32)
    }

    /// Stores a value at a block position.
    pub fn set(&mut self, x: u8, y: u8, z: u8, value: u32) -> Result<(), ChunkError> {
        self.set_index(storage_index(x, y, z), value)
    }

    /// Stores a value at a raw index.
    pub fn set_index(&mut self, index: usize, value: u32) -> Result<(), ChunkError> {
        match &mut self.data {
            Some(data) => Ok(data.set(index, u64::from(value))?),
            None if index >= STORAGE_SIZE => Err(ChunkError::Bounds {
                index,
                capacity: STORAGE_SIZE,
            }),
            None if value == 0 => Ok(()),
            None => Err(ChunkError::ValueOverflow {
                value: u64::from(value),
                bits: 0,
            }),
        }
    }

    /// Copies every value into a storage of `bits` bits per value.
    pub fn resize(&self, bits: u8) -> Result<Self, ChunkError> {
        let mut resized = Self::new(bits)?;
        if let Some(data) = &self.data {
            let mask = value_mask(bits);
            for (index, value) in data.iter().enumerate() {
                if value > mask {
                    return Err(ChunkError::ValueOverflow { value, bits });
                }
                resized.set_index(index, value as u32)?;
            }
        }
        Ok(resized)
    }

    /// Adds one to `counts[value]` for every stored value.
    pub fn increment_palette(&self, counts: &mut [u32]) -> Result<(), ChunkError> {
        for index in 0..STORAGE_SIZE {
            let value = self.get_index(index) as usize;
            let capacity = counts.len();
            let count = counts
                .get_mut(value)
                .ok_or(ChunkError::Bounds { index: value, capacity })?;
            *count += 1;
        }
        Ok(())
    }

    /// The largest stored value.
    #[must_use]
    pub fn max_index(&self) -> u32 {
        self.data
            .as_ref()
            .and_then(|data| data.iter().max())
            .map_or(0, |value| value as u32)
    }

    /// Writes the packed words without a header.
    pub fn write(&self, writer: &mut impl Write) -> Result<(), ChunkError> {
        if let Some(data) = &self.data {
            data.write_to(writer, Endian::Little)?;
        }
        Ok(())
    }

    /// Reads the packed words of a `bits`-wide storage.
    pub fn read(reader: &mut impl Read, bits: u8) -> Result<Self, ChunkError> {
        check_bits(bits)?;
        let data = if bits == 0 {
            None
        } else {
            Some(BitArray::read_from(
                reader,
                bits,
                STORAGE_SIZE,
                BitLayout::Padded,
                Endian::Little,
            )?)
        };
        Ok(Self { data })
    }
}

fn check_bits(bits: u8) -> Result<(), ChunkError> {
    if ALLOWED_BITS.contains(&bits) {
        Ok(())
    } else {
        Err(ChunkError::Construction(format!(
            "bedrock storages cannot be {bits} bits wide"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_wrapped_coordinates_and_counts() {
        let mut storage = PalettedStorage::new(4).unwrap();
        storage.set(0, 1, 0, 3).unwrap();
        storage.set(19, 1, 20, 3).unwrap();
        assert_eq!(storage.get(0, 0, 0), 0);
        assert_eq!(storage.get(0, 1, 0), 3);
        assert_eq!(storage.get(3, 1, 4), 3);

        let mut counts = [0_u32; 16];
        storage.increment_palette(&mut counts).unwrap();
        assert_eq!(counts[3], 2);
        assert_eq!(counts[0], 4094);
        assert!(storage.increment_palette(&mut [0; 2]).is_err());
    }

    #[test]
    fn test_widths_and_resize() {
        assert!(PalettedStorage::new(7).is_err());
        assert_eq!(bits_for_palette(1), Some(0));
        assert_eq!(bits_for_palette(2), Some(1));
        assert_eq!(bits_for_palette(65), Some(8));
        assert_eq!(bits_for_palette(300), Some(16));
        assert_eq!(bits_for_palette(70_000), None);

        let mut storage = PalettedStorage::new(2).unwrap();
        storage.set_index(100, 3).unwrap();
        assert!(matches!(storage.set_index(0, 4), Err(ChunkError::ValueOverflow { value: 4, bits: 2 })));
        let wide = storage.resize(16).unwrap();
        assert_eq!(wide.get_index(100), 3);
        assert!(matches!(storage.resize(1), Err(ChunkError::ValueOverflow { value: 3, bits: 1 })));

        let mut uniform = PalettedStorage::new(0).unwrap();
        uniform.set_index(5, 0).unwrap();
        assert!(uniform.set_index(5, 1).is_err());
        assert!(uniform.set_index(STORAGE_SIZE, 0).is_err());
    }

    #[test]
    fn test_padded_word_counts() {
        for (bits, words) in [(1, 128), (3, 410), (5, 683), (6, 820), (16, 2048)] {
            let mut storage = PalettedStorage::new(bits).unwrap();
            storage.set_index(STORAGE_SIZE - 1, 1).unwrap();
            let mut buf = Vec::new();
            storage.write(&mut buf).unwrap();
            assert_eq!(buf.len(), words * 4, "{bits} bits");

            let read = PalettedStorage::read(&mut Cursor::new(buf.as_slice()), bits).unwrap();
            assert_eq!(read, storage);
        }
    }

    #[test]
    fn test_snapshot_rejects_invalid_widths() {
        let storage = PalettedStorage::new(3).unwrap();
        let json = serde_json::to_value(&storage).unwrap();
        assert_eq!(serde_json::from_value::<PalettedStorage>(json.clone()).unwrap(), storage);

        let seven_bits = serde_json::to_value(BitArray::<u32>::new(7, STORAGE_SIZE, BitLayout::Padded).unwrap()).unwrap();
        assert!(serde_json::from_value::<PalettedStorage>(serde_json::json!({ "data": seven_bits })).is_err());

        let short = serde_json::to_value(BitArray::<u32>::new(4, 64, BitLayout::Padded).unwrap()).unwrap();
        assert!(serde_json::from_value::<PalettedStorage>(serde_json::json!({ "data": short })).is_err());
    }

    #[test]
    fn test_little_endian_words() {
        let mut storage = PalettedStorage::new(8).unwrap();
        storage.set_index(0, 0x12).unwrap();
        storage.set_index(1, 0x34).unwrap();
        let mut buf = Vec::new();
        storage.write(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x12, 0x34, 0, 0]);
    }
}
