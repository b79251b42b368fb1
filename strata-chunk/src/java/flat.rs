//! The pre-palette 1.8 layout: every present section's blocks as
//! little-endian `u16`s, then all block light, then all sky light.

use std::io::Write;

use strata_utils::serial::LittleEndianWrite;

use super::{
    profile::JavaProfile,
    section::{ChunkSection, read_light},
};
use crate::{
    error::{ChunkError, DecodeContext},
    light_storage::{LIGHT_ARRAY_SIZE, LightStorage},
    palette::PaletteContainer,
};

const BLOCK_BYTES: usize = 4096 * 2;

/// Exact byte length of a flat chunk with `sections` sections.
#[must_use]
pub const fn expected_len(sections: usize, sky_light: bool, biomes: bool) -> usize {
    let per_section = BLOCK_BYTES + LIGHT_ARRAY_SIZE + if sky_light { LIGHT_ARRAY_SIZE } else { 0 };
    sections * per_section + if biomes { 256 } else { 0 }
}

pub(super) fn write_sections(writer: &mut impl Write, sections: &[&ChunkSection]) -> Result<(), ChunkError> {
    for section in sections {
        for state in section.blocks().values() {
            writer.write_u16_le(state as u16)?;
        }
    }
    for section in sections {
        let light = section.block_light().map_or_else(|| vec![0; LIGHT_ARRAY_SIZE], LightStorage::to_bytes);
        writer.write_all(&light)?;
    }
    for section in sections {
        if let Some(light) = section.sky_light() {
            writer.write_all(&light.to_bytes())?;
        }
    }
    Ok(())
}

/// Reads `count` sections from `data`, whose length the caller has checked.
pub(super) fn read_sections(
    data: &[u8],
    count: usize,
    profile: &JavaProfile,
    sky_light: bool,
) -> Result<Vec<ChunkSection>, ChunkError> {
    let (blocks, rest) = data.split_at(count * BLOCK_BYTES);
    let (block_light, rest) = rest.split_at(count * LIGHT_ARRAY_SIZE);

    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let bytes = &blocks[i * BLOCK_BYTES..(i + 1) * BLOCK_BYTES];
        let mut container = PaletteContainer::filled(profile.blocks, 0)?;
        for (index, pair) in bytes.chunks_exact(2).enumerate() {
            container.set(index, u32::from(u16::from_le_bytes([pair[0], pair[1]])))?;
        }
        let light = read_light(&mut &block_light[i * LIGHT_ARRAY_SIZE..]).field(&format!("section[{i}].block_light"))?;
        let sky = if sky_light {
            let start = i * LIGHT_ARRAY_SIZE;
            Some(read_light(&mut &rest[start..start + LIGHT_ARRAY_SIZE]).field(&format!("section[{i}].sky_light"))?)
        } else {
            None
        };
        sections.push(ChunkSection::from_parts(container, Some(light), sky));
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::java::JavaVersion;

    #[test]
    fn test_flat_layout_groups_arrays() {
        let profile = JavaVersion::V1_8.profile();
        let mut section = ChunkSection::new(&profile, true).unwrap();
        section.set(1, (1 << 4) | 2).unwrap();

        let mut buf = Vec::new();
        write_sections(&mut buf, &[&section, &section]).unwrap();
        assert_eq!(buf.len(), expected_len(2, true, false));
        assert_eq!(&buf[2..4], &[0x12, 0x00]);
        // Block light of both sections follows both block arrays.
        assert!(buf[2 * BLOCK_BYTES..2 * BLOCK_BYTES + 2 * LIGHT_ARRAY_SIZE].iter().all(|&b| b == 0));
        assert!(buf[2 * BLOCK_BYTES + 2 * LIGHT_ARRAY_SIZE..].iter().all(|&b| b == 0xFF));

        let sections = read_sections(&buf, 2, &profile, true).unwrap();
        assert_eq!(sections[1], section);
    }
}
