use std::{
    io::{Read, Write},
    mem,
};

use serde::{Deserialize, Serialize};
use strata_utils::serial::{ReadFrom, WriteTo};

use super::profile::{JavaProfile, LightPlacement};
use crate::{
    error::{ChunkError, DecodeContext},
    light_storage::{LIGHT_ARRAY_SIZE, LightStorage},
    palette::PaletteContainer,
};

/// Index of a block inside a section.
#[inline]
#[must_use]
pub const fn section_index(x: u8, y: u8, z: u8) -> usize {
    ((y as usize & 0xF) << 8) | ((z as usize & 0xF) << 4) | (x as usize & 0xF)
}

/// A 16x16x16 block volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSection {
    blocks: PaletteContainer,
    solid_block_count: i16,
    /// Present only in formats that carry light inside sections.
    block_light: Option<LightStorage>,
    sky_light: Option<LightStorage>,
}

impl ChunkSection {
    /// Creates an all-air section laid out for `profile`.
    pub fn new(profile: &JavaProfile, sky_light: bool) -> Result<Self, ChunkError> {
        let in_section = matches!(profile.light, LightPlacement::InSection);
        Ok(Self {
            blocks: PaletteContainer::filled(profile.blocks, 0)?,
            solid_block_count: 0,
            block_light: in_section.then(LightStorage::new_empty),
            sky_light: (in_section && sky_light).then(|| LightStorage::new_filled(15)),
        })
    }

    /// Wraps a decoded container, recomputing the block count.
    pub(super) fn from_parts(
        blocks: PaletteContainer,
        block_light: Option<LightStorage>,
        sky_light: Option<LightStorage>,
    ) -> Self {
        let mut section = Self {
            blocks,
            solid_block_count: 0,
            block_light,
            sky_light,
        };
        section.recount();
        section
    }

    /// The block container.
    #[must_use]
    pub fn blocks(&self) -> &PaletteContainer {
        &self.blocks
    }

    /// Number of non-air blocks.
    #[must_use]
    pub fn solid_block_count(&self) -> i16 {
        self.solid_block_count
    }

    /// Whether the section holds only air.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solid_block_count == 0
    }

    /// Whether the section must be sent: it holds blocks, or in-section light
    /// that differs from an empty section's.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.is_empty()
            || self.block_light.as_ref().is_some_and(|light| !light.is_dark())
            || self
                .sky_light
                .as_ref()
                .is_some_and(|light| *light != LightStorage::new_filled(15))
    }

    /// Returns the state id at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        self.blocks.get(index)
    }

    /// Stores a state id and keeps the non-air count current.
    pub fn set(&mut self, index: usize, state: u32) -> Result<(), ChunkError> {
        let old = self.blocks.get(index);
        let kind = mem::discriminant(&self.blocks);
        self.blocks.set(index, state)?;

        if mem::discriminant(&self.blocks) != kind {
            self.recount();
        } else if old == 0 && state != 0 {
            self.solid_block_count += 1;
        } else if old != 0 && state == 0 {
            self.solid_block_count -= 1;
        }
        Ok(())
    }

    fn recount(&mut self) {
        self.solid_block_count = self.blocks.count_where(|state| state != 0) as i16;
    }

    /// Block light stored in this section, if the format keeps it here.
    #[must_use]
    pub fn block_light(&self) -> Option<&LightStorage> {
        self.block_light.as_ref()
    }

    /// Sky light stored in this section, if the format keeps it here.
    #[must_use]
    pub fn sky_light(&self) -> Option<&LightStorage> {
        self.sky_light.as_ref()
    }

    pub(super) fn block_light_mut(&mut self) -> Option<&mut LightStorage> {
        self.block_light.as_mut()
    }

    pub(super) fn sky_light_mut(&mut self) -> Option<&mut LightStorage> {
        self.sky_light.as_mut()
    }

    /// Writes the paletted encoding of this section.
    pub fn write(&self, writer: &mut impl Write, profile: &JavaProfile) -> Result<(), ChunkError> {
        if profile.block_count {
            self.solid_block_count.write(writer)?;
        }
        self.blocks.write(writer, profile.wire)?;
        if let Some(light) = &self.block_light {
            writer.write_all(&light.to_bytes())?;
        }
        if let Some(light) = &self.sky_light {
            writer.write_all(&light.to_bytes())?;
        }
        Ok(())
    }

    /// Reads a paletted section.
    pub fn read(reader: &mut impl Read, profile: &JavaProfile, sky_light: bool) -> Result<Self, ChunkError> {
        let sent_count = if profile.block_count {
            Some(i16::read(reader).field("block_count")?)
        } else {
            None
        };
        let blocks = PaletteContainer::read(reader, profile.blocks, profile.wire).field("block_states")?;

        let (block_light, sky_light) = if matches!(profile.light, LightPlacement::InSection) {
            let block_light = read_light(reader).field("block_light")?;
            let sky = if sky_light {
                Some(read_light(reader).field("sky_light")?)
            } else {
                None
            };
            (Some(block_light), sky)
        } else {
            (None, None)
        };

        let section = Self::from_parts(blocks, block_light, sky_light);
        if let Some(sent) = sent_count.filter(|&sent| sent != section.solid_block_count) {
            log::warn!(
                "section block count {sent} does not match its contents, using {}",
                section.solid_block_count
            );
        }
        Ok(section)
    }
}

pub(super) fn read_light(reader: &mut impl Read) -> Result<LightStorage, ChunkError> {
    let mut bytes = vec![0; LIGHT_ARRAY_SIZE];
    reader.read_exact(&mut bytes)?;
    LightStorage::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::java::JavaVersion;

    #[test]
    fn test_solid_count_tracks_writes() {
        let profile = JavaVersion::V1_18.profile();
        let mut section = ChunkSection::new(&profile, true).unwrap();
        let mut expected = [0_u32; 4096];
        let mut seed = 7_u32;
        for _ in 0..20_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let index = (seed >> 8) as usize % 4096;
            // Mostly air and a handful of states, with the occasional new id.
            let state = match seed % 7 {
                0..=2 => 0,
                3 => seed % 400,
                _ => seed % 5,
            };
            section.set(index, state).unwrap();
            expected[index] = state;
        }
        let brute = expected.iter().filter(|&&state| state != 0).count();
        assert_eq!(section.solid_block_count() as usize, brute);
        assert!(expected.iter().enumerate().all(|(i, &state)| section.get(i) == state));
    }

    #[test]
    fn test_in_section_light_round_trip() {
        let profile = JavaVersion::V1_13.profile();
        let mut section = ChunkSection::new(&profile, true).unwrap();
        section.set(section_index(1, 2, 3), 9).unwrap();
        section.block_light_mut().unwrap().set(1, 2, 3, 12);

        let mut buf = Vec::new();
        section.write(&mut buf, &profile).unwrap();
        let decoded = ChunkSection::read(&mut Cursor::new(buf.as_slice()), &profile, true).unwrap();
        assert_eq!(decoded, section);
        assert_eq!(decoded.block_light().unwrap().get(1, 2, 3), 12);
        assert_eq!(decoded.sky_light().unwrap().get(0, 0, 0), 15);
    }

    #[test]
    fn test_light_alone_counts_as_content() {
        let profile = JavaVersion::V1_13.profile();
        let mut section = ChunkSection::new(&profile, true).unwrap();
        assert!(!section.has_content());
        section.sky_light_mut().unwrap().set(0, 0, 0, 15);
        assert!(!section.has_content());
        section.sky_light_mut().unwrap().set(0, 0, 0, 4);
        assert!(section.has_content());
        section.sky_light_mut().unwrap().set(0, 0, 0, 15);
        section.block_light_mut().unwrap().set(5, 5, 5, 1);
        assert!(section.is_empty());
        assert!(section.has_content());

        let modern = JavaVersion::V1_18.profile();
        assert!(!ChunkSection::new(&modern, true).unwrap().has_content());
    }

    #[test]
    fn test_sent_block_count_is_recomputed() {
        let profile = JavaVersion::V1_18.profile();
        let mut section = ChunkSection::new(&profile, true).unwrap();
        section.set(section_index(0, 0, 0), 3).unwrap();
        section.set(section_index(1, 0, 0), 3).unwrap();

        let mut buf = Vec::new();
        section.write(&mut buf, &profile).unwrap();
        buf[..2].copy_from_slice(&900_i16.to_be_bytes());
        let decoded = ChunkSection::read(&mut Cursor::new(buf.as_slice()), &profile, true).unwrap();
        assert_eq!(decoded.solid_block_count(), 2);
        assert_eq!(decoded, section);
    }

    #[test]
    fn test_decode_error_names_the_stage() {
        let profile = JavaVersion::V1_18.profile();
        // Block count, then a bits-per-value byte above the ceiling.
        let err = ChunkSection::read(&mut Cursor::new([0_u8, 1, 20]), &profile, true).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "block_states.bits_per_value"));
    }
}
