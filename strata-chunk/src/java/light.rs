//! Light data for formats that send light apart from the sections.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{
    codec::{BitSet, VarInt},
    serial::{ReadFrom, WriteTo},
};

use crate::{
    error::{ChunkError, DecodeContext},
    light_storage::{LIGHT_ARRAY_SIZE, LightStorage},
};

/// Optional light storage per light section.
pub type LightSections = Vec<Option<LightStorage>>;

/// Light arrays for one column, in the layout of the light update packet.
///
/// Bit `i` of a mask refers to light section `i`, where section 0 lies one
/// section below the column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightData {
    /// Sections with sky light arrays.
    pub sky_light_mask: BitSet,
    /// Sections with block light arrays.
    pub block_light_mask: BitSet,
    /// Sections whose sky light is known to be all zero.
    pub empty_sky_light_mask: BitSet,
    /// Sections whose block light is known to be all zero.
    pub empty_block_light_mask: BitSet,
    /// One 2048 byte array per bit of `sky_light_mask`, in order.
    pub sky_light: Vec<Vec<u8>>,
    /// One 2048 byte array per bit of `block_light_mask`, in order.
    pub block_light: Vec<Vec<u8>>,
}

impl LightData {
    /// Collects masks and arrays from per-section storage.
    pub(super) fn collect(sky: &[Option<LightStorage>], block: &[Option<LightStorage>]) -> Self {
        let mut data = Self::default();
        collect_into(sky, &mut data.sky_light_mask, &mut data.empty_sky_light_mask, &mut data.sky_light);
        collect_into(
            block,
            &mut data.block_light_mask,
            &mut data.empty_block_light_mask,
            &mut data.block_light,
        );
        data
    }

    /// Rebuilds per-section storage for `sections` light sections.
    pub(super) fn expand(&self, sections: usize, has_sky: bool) -> Result<(LightSections, LightSections), ChunkError> {
        if !has_sky && (!self.sky_light_mask.is_empty() || !self.empty_sky_light_mask.is_empty()) {
            return Err(ChunkError::decode("sky_light_mask", "column has no sky light"));
        }
        let sky = expand_from(sections, &self.sky_light_mask, &self.empty_sky_light_mask, &self.sky_light)
            .field("sky_light")?;
        let block = expand_from(
            sections,
            &self.block_light_mask,
            &self.empty_block_light_mask,
            &self.block_light,
        )
        .field("block_light")?;
        Ok((sky, block))
    }

    /// Writes the wire form; `bitset_masks` selects the 1.17+ layout.
    pub fn write(&self, writer: &mut impl Write, bitset_masks: bool) -> Result<(), ChunkError> {
        let masks = [
            &self.sky_light_mask,
            &self.block_light_mask,
            &self.empty_sky_light_mask,
            &self.empty_block_light_mask,
        ];
        for mask in masks {
            if bitset_masks {
                mask.write(writer)?;
            } else {
                VarInt(mask.low_u32() as i32).write(writer)?;
            }
        }
        for arrays in [&self.sky_light, &self.block_light] {
            if bitset_masks {
                VarInt::try_from(arrays.len())
                    .map_err(|_| ChunkError::Construction("too many light arrays".to_owned()))?
                    .write(writer)?;
            }
            for array in arrays {
                VarInt(LIGHT_ARRAY_SIZE as i32).write(writer)?;
                writer.write_all(array)?;
            }
        }
        Ok(())
    }

    /// Reads the wire form; `bitset_masks` selects the 1.17+ layout.
    pub fn read(reader: &mut impl Read, bitset_masks: bool) -> Result<Self, ChunkError> {
        let mut masks = Vec::with_capacity(4);
        for name in [
            "sky_light_mask",
            "block_light_mask",
            "empty_sky_light_mask",
            "empty_block_light_mask",
        ] {
            let mask = if bitset_masks {
                BitSet::read(reader).field(name)?
            } else {
                BitSet::from_u32(VarInt::read(reader).field(name)?.0 as u32)
            };
            masks.push(mask);
        }
        let [sky_light_mask, block_light_mask, empty_sky_light_mask, empty_block_light_mask]: [BitSet; 4] =
            masks.try_into().map_err(|_| ChunkError::decode("light_masks", "expected four masks"))?;

        let sky_light = read_arrays(reader, &sky_light_mask, bitset_masks).field("sky_light")?;
        let block_light = read_arrays(reader, &block_light_mask, bitset_masks).field("block_light")?;
        Ok(Self {
            sky_light_mask,
            block_light_mask,
            empty_sky_light_mask,
            empty_block_light_mask,
            sky_light,
            block_light,
        })
    }
}

fn collect_into(storage: &[Option<LightStorage>], mask: &mut BitSet, empty: &mut BitSet, arrays: &mut Vec<Vec<u8>>) {
    for (index, light) in storage.iter().enumerate() {
        match light {
            Some(light) if light.is_dark() => empty.set(index, true),
            Some(light) => {
                mask.set(index, true);
                arrays.push(light.to_bytes());
            }
            None => {}
        }
    }
}

fn expand_from(
    sections: usize,
    mask: &BitSet,
    empty: &BitSet,
    arrays: &[Vec<u8>],
) -> Result<LightSections, ChunkError> {
    if let Some(index) = mask.iter_ones().chain(empty.iter_ones()).find(|&i| i >= sections) {
        return Err(ChunkError::decode(
            "mask",
            format!("section {index} is outside the {sections} light sections"),
        ));
    }
    if mask.count_ones() != arrays.len() {
        return Err(ChunkError::decode(
            "arrays",
            format!("mask names {} sections but {} arrays were sent", mask.count_ones(), arrays.len()),
        ));
    }
    let mut storage = vec![None; sections];
    for index in empty.iter_ones() {
        storage[index] = Some(LightStorage::new_empty());
    }
    for (index, array) in mask.iter_ones().zip(arrays) {
        storage[index] = Some(LightStorage::from_bytes(array).field(&format!("[{index}]"))?);
    }
    Ok(storage)
}

fn read_arrays(reader: &mut impl Read, mask: &BitSet, counted: bool) -> Result<Vec<Vec<u8>>, ChunkError> {
    let count = if counted {
        let count = usize::try_from(VarInt::read(reader).field("count")?)
            .map_err(|_| ChunkError::decode("count", "negative length"))?;
        if count != mask.count_ones() {
            return Err(ChunkError::decode(
                "count",
                format!("mask names {} sections but {count} arrays follow", mask.count_ones()),
            ));
        }
        count
    } else {
        mask.count_ones()
    };
    let mut arrays = Vec::with_capacity(count);
    for i in 0..count {
        let VarInt(len) = VarInt::read(reader).field(&format!("[{i}].len"))?;
        if len as usize != LIGHT_ARRAY_SIZE {
            return Err(ChunkError::decode(
                format!("[{i}].len"),
                format!("light arrays are {LIGHT_ARRAY_SIZE} bytes, got {len}"),
            ));
        }
        let mut array = vec![0; LIGHT_ARRAY_SIZE];
        reader.read_exact(&mut array).field(&format!("[{i}]"))?;
        arrays.push(array);
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample() -> (LightSections, LightSections) {
        let mut sky = vec![None; 18];
        sky[0] = Some(LightStorage::new_filled(15));
        sky[1] = Some(LightStorage::new_empty());
        let mut lit = LightStorage::new_empty();
        lit.set(4, 4, 4, 13);
        let mut block = vec![None; 18];
        block[17] = Some(lit);
        (sky, block)
    }

    #[test]
    fn test_masks_and_empty_masks() {
        let (sky, block) = sample();
        let data = LightData::collect(&sky, &block);
        assert!(data.sky_light_mask.get(0));
        assert!(!data.sky_light_mask.get(1));
        assert!(data.empty_sky_light_mask.get(1));
        assert!(data.block_light_mask.get(17));
        assert_eq!(data.sky_light.len(), 1);

        let (sky_back, block_back) = data.expand(18, true).unwrap();
        assert_eq!(sky_back, sky);
        assert_eq!(block_back, block);
        assert!(data.expand(18, false).is_err());
    }

    #[test]
    fn test_wire_layouts() {
        let (sky, block) = sample();
        let data = LightData::collect(&sky, &block);
        for bitset_masks in [false, true] {
            let mut buf = Vec::new();
            data.write(&mut buf, bitset_masks).unwrap();
            let mut cursor = Cursor::new(buf.as_slice());
            assert_eq!(LightData::read(&mut cursor, bitset_masks).unwrap(), data);
            assert_eq!(cursor.position() as usize, buf.len());
        }
    }

    #[test]
    fn test_rejects_short_arrays() {
        // VarInt masks: sky section 0 only, then an array claiming 16 bytes.
        let buf = [1_u8, 0, 0, 0, 16];
        let err = LightData::read(&mut Cursor::new(&buf[..]), false).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "sky_light.[0].len"));
    }
}
