use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use strata_registry::{BiomeId, BlockStateId};
use strata_utils::{
    codec::BitSet,
    nbt::NbtCompound,
    serial::{ReadFrom, WriteTo},
};

use super::{
    flat,
    light::{LightData, LightSections},
    profile::{BiomeFormat, DEFAULT_BIOME_BITS, JavaProfile, JavaVersion, LightPlacement, SectionStorage},
    section::{ChunkSection, section_index},
};
use crate::{
    block_entities::BlockEntities,
    error::{ChunkError, DecodeContext},
    light_storage::LightStorage,
    palette::{ContainerSpec, PaletteContainer},
    pos::{Block, BlockPos},
};

/// Construction options for a [`JavaColumn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaOptions {
    /// Lowest block height; only 1.17+ layouts accept a non-default value.
    pub min_y: Option<i32>,
    /// Number of block rows; only 1.17+ layouts accept a non-default value.
    pub world_height: Option<u32>,
    /// Whether the dimension has sky light.
    pub sky_light: bool,
    /// Width of global biome ids in sectioned biome containers.
    pub biome_bits: u8,
}

impl Default for JavaOptions {
    fn default() -> Self {
        Self {
            min_y: None,
            world_height: None,
            sky_light: true,
            biome_bits: DEFAULT_BIOME_BITS,
        }
    }
}

/// Biome storage in the shape each layout uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum BiomeStorage {
    /// One biome per column, indexed `z * 16 + x`.
    Column2d(Vec<u32>),
    /// One biome per 4x4x4 cell, indexed `(cell_y << 4) | (cell_z << 2) | cell_x`.
    Cells3d(Vec<u32>),
    /// One 64-entry container per section.
    Sectioned(Vec<PaletteContainer>),
}

/// A Java edition chunk column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaColumn {
    version: JavaVersion,
    min_y: i32,
    world_height: u32,
    has_sky_light: bool,
    biome_bits: u8,
    sections: Vec<Option<ChunkSection>>,
    biomes: BiomeStorage,
    /// Separate-light layouts only: one entry per section plus one below and above.
    sky_light: LightSections,
    block_light: LightSections,
    block_entities: BlockEntities,
}

const fn biome_cell(x: u8, y: u8, z: u8) -> usize {
    (((y as usize) >> 2) << 4) | (((z as usize) >> 2) << 2) | ((x as usize) >> 2)
}

impl JavaColumn {
    /// Creates an empty column.
    pub fn new(version: JavaVersion, options: JavaOptions) -> Result<Self, ChunkError> {
        let profile = version.profile();
        let min_y = options.min_y.unwrap_or(profile.default_min_y());
        let world_height = options.world_height.unwrap_or(profile.default_height());
        if !profile.variable_height && (min_y != profile.default_min_y() || world_height != profile.default_height()) {
            return Err(ChunkError::Construction(format!(
                "{version} columns span {}..{}",
                profile.default_min_y(),
                profile.default_min_y() + profile.default_height() as i32
            )));
        }
        if world_height == 0 || world_height > 4064 || world_height % 16 != 0 || min_y % 16 != 0 {
            return Err(ChunkError::Construction(format!(
                "world height {world_height} and min y {min_y} must be multiples of 16 within 16..=4064"
            )));
        }
        if options.biome_bits == 0 || options.biome_bits > 31 {
            return Err(ChunkError::Construction(format!(
                "biome bits must be in 1..=31, got {}",
                options.biome_bits
            )));
        }

        let section_count = (world_height / 16) as usize;
        let biomes = match profile.biomes {
            BiomeFormat::Column2dBytes | BiomeFormat::Column2dInts => BiomeStorage::Column2d(vec![0; 256]),
            BiomeFormat::Separate3d => BiomeStorage::Cells3d(vec![0; section_count * 64]),
            BiomeFormat::Sectioned => {
                let empty = PaletteContainer::filled(ContainerSpec::biomes(options.biome_bits), 0)?;
                BiomeStorage::Sectioned(vec![empty; section_count])
            }
        };
        let light_sections = match profile.light {
            LightPlacement::InSection => 0,
            LightPlacement::Separate { .. } => section_count + 2,
        };

        Ok(Self {
            version,
            min_y,
            world_height,
            has_sky_light: options.sky_light,
            biome_bits: options.biome_bits,
            sections: vec![None; section_count],
            biomes,
            sky_light: vec![None; light_sections],
            block_light: vec![None; light_sections],
            block_entities: BlockEntities::default(),
        })
    }

    /// The layout version.
    #[must_use]
    pub fn version(&self) -> JavaVersion {
        self.version
    }

    /// The layout rules.
    #[must_use]
    pub fn profile(&self) -> JavaProfile {
        self.version.profile()
    }

    /// Lowest block height.
    #[must_use]
    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    /// One past the highest block height.
    #[must_use]
    pub fn max_y(&self) -> i32 {
        self.min_y + self.world_height as i32
    }

    /// Number of 16-block sections.
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The section at `index`, counted from the bottom.
    #[must_use]
    pub fn section(&self, index: usize) -> Option<&ChunkSection> {
        self.sections.get(index).and_then(Option::as_ref)
    }

    fn section_slot(&self, y: i32) -> Option<usize> {
        (self.min_y..self.max_y())
            .contains(&y)
            .then(|| ((y - self.min_y) >> 4) as usize)
    }

    fn out_of_world(&self, y: i32) -> ChunkError {
        ChunkError::OutOfWorld {
            y,
            min_y: self.min_y,
            max_y: self.max_y(),
        }
    }

    /// The block state at `pos`; air outside the world or in absent sections.
    #[must_use]
    pub fn get_block_state_id(&self, pos: BlockPos) -> BlockStateId {
        self.section_slot(pos.y)
            .and_then(|slot| self.sections[slot].as_ref())
            .map_or(BlockStateId::AIR, |section| {
                BlockStateId(section.get(section_index(pos.x, pos.local_y(), pos.z)))
            })
    }

    /// Stores a block state. Air written into an absent section is dropped.
    pub fn set_block_state_id(&mut self, pos: BlockPos, state: BlockStateId) -> Result<(), ChunkError> {
        let slot = self.section_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
        let index = section_index(pos.x, pos.local_y(), pos.z);
        let profile = self.version.profile();
        let section = match &mut self.sections[slot] {
            Some(section) => section,
            None if state.is_air() => return Ok(()),
            empty => empty.insert(ChunkSection::new(&profile, self.has_sky_light)?),
        };
        section.set(index, state.0)
    }

    /// The biome at `pos`; biome 0 outside the world.
    #[must_use]
    pub fn get_biome(&self, pos: BlockPos) -> BiomeId {
        let Some(slot) = self.section_slot(pos.y) else {
            return BiomeId(0);
        };
        BiomeId(match &self.biomes {
            BiomeStorage::Column2d(biomes) => biomes[usize::from(pos.z) * 16 + usize::from(pos.x)],
            BiomeStorage::Cells3d(biomes) => biomes[slot * 64 + biome_cell(pos.x, pos.local_y(), pos.z)],
            BiomeStorage::Sectioned(containers) => containers[slot].get(biome_cell(pos.x, pos.local_y(), pos.z)),
        })
    }

    /// Stores a biome.
    pub fn set_biome(&mut self, pos: BlockPos, biome: BiomeId) -> Result<(), ChunkError> {
        let slot = self.section_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
        let byte_biomes = matches!(self.version.profile().biomes, BiomeFormat::Column2dBytes);
        match &mut self.biomes {
            BiomeStorage::Column2d(biomes) => {
                let limit = if byte_biomes { u32::from(u8::MAX) } else { i32::MAX as u32 };
                if biome.0 > limit {
                    return Err(ChunkError::ValueOverflow {
                        value: u64::from(biome.0),
                        bits: if byte_biomes { 8 } else { 31 },
                    });
                }
                biomes[usize::from(pos.z) * 16 + usize::from(pos.x)] = biome.0;
            }
            BiomeStorage::Cells3d(biomes) => {
                if biome.0 > i32::MAX as u32 {
                    return Err(ChunkError::ValueOverflow {
                        value: u64::from(biome.0),
                        bits: 31,
                    });
                }
                biomes[slot * 64 + biome_cell(pos.x, pos.local_y(), pos.z)] = biome.0;
            }
            BiomeStorage::Sectioned(containers) => {
                containers[slot].set(biome_cell(pos.x, pos.local_y(), pos.z), biome.0)?;
            }
        }
        Ok(())
    }

    fn light_slot(&self, y: i32) -> Option<usize> {
        (self.min_y - 16..self.max_y() + 16)
            .contains(&y)
            .then(|| ((y - self.min_y + 16) >> 4) as usize)
    }

    fn default_sky(&self) -> u8 {
        if self.has_sky_light { 15 } else { 0 }
    }

    /// Block light at `pos`; 0 where nothing is stored.
    #[must_use]
    pub fn get_block_light(&self, pos: BlockPos) -> u8 {
        let (x, y, z) = (usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z));
        match self.version.profile().light {
            LightPlacement::InSection => self
                .section_slot(pos.y)
                .and_then(|slot| self.sections[slot].as_ref())
                .and_then(ChunkSection::block_light)
                .map_or(0, |light| light.get(x, y, z)),
            LightPlacement::Separate { .. } => self
                .light_slot(pos.y)
                .and_then(|slot| self.block_light[slot].as_ref())
                .map_or(0, |light| light.get(x, y, z)),
        }
    }

    /// Sky light at `pos`; 15 where nothing is stored in a dimension with sky.
    #[must_use]
    pub fn get_sky_light(&self, pos: BlockPos) -> u8 {
        let (x, y, z) = (usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z));
        let stored = match self.version.profile().light {
            LightPlacement::InSection => self
                .section_slot(pos.y)
                .and_then(|slot| self.sections[slot].as_ref())
                .and_then(ChunkSection::sky_light)
                .map(|light| light.get(x, y, z)),
            LightPlacement::Separate { .. } => self
                .light_slot(pos.y)
                .and_then(|slot| self.sky_light[slot].as_ref())
                .map(|light| light.get(x, y, z)),
        };
        stored.unwrap_or_else(|| self.default_sky())
    }

    /// Stores block light; out-of-world heights are rejected.
    pub fn set_block_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
        self.light_mut(pos, false)?.set(usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z), level);
        Ok(())
    }

    /// Stores sky light. Columns without sky light ignore the write.
    pub fn set_sky_light(&mut self, pos: BlockPos, level: u8) -> Result<(), ChunkError> {
        if !self.has_sky_light {
            self.light_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
            return Ok(());
        }
        self.light_mut(pos, true)?.set(usize::from(pos.x), usize::from(pos.local_y()), usize::from(pos.z), level);
        Ok(())
    }

    fn light_mut(&mut self, pos: BlockPos, sky: bool) -> Result<&mut LightStorage, ChunkError> {
        let profile = self.version.profile();
        if let LightPlacement::Separate { .. } = profile.light {
            let slot = self.light_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
            let storage = if sky { &mut self.sky_light } else { &mut self.block_light };
            let fill = if sky { 15 } else { 0 };
            return Ok(storage[slot].get_or_insert_with(|| LightStorage::new_filled(fill)));
        }

        let slot = self.section_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
        let section = match &mut self.sections[slot] {
            Some(section) => section,
            empty => empty.insert(ChunkSection::new(&profile, self.has_sky_light)?),
        };
        let light = if sky { section.sky_light_mut() } else { section.block_light_mut() };
        light.ok_or_else(|| ChunkError::Construction("section carries no light".to_owned()))
    }

    /// Everything stored at `pos`.
    #[must_use]
    pub fn get_block(&self, pos: BlockPos) -> Block {
        Block {
            state: self.get_block_state_id(pos),
            biome: self.get_biome(pos),
            block_light: self.get_block_light(pos),
            sky_light: self.get_sky_light(pos),
        }
    }

    /// Stores every part of `block` at `pos`.
    pub fn set_block(&mut self, pos: BlockPos, block: &Block) -> Result<(), ChunkError> {
        self.set_block_state_id(pos, block.state)?;
        self.set_biome(pos, block.biome)?;
        self.set_block_light(pos, block.block_light)?;
        self.set_sky_light(pos, block.sky_light)
    }

    /// Sections that are present and hold a non-air block or, where light
    /// lives in sections, light other than the empty default.
    #[must_use]
    pub fn get_mask(&self) -> BitSet {
        let mut mask = BitSet::with_len(self.sections.len());
        for (index, section) in self.sections.iter().enumerate() {
            if section.as_ref().is_some_and(ChunkSection::has_content) {
                mask.set(index, true);
            }
        }
        mask
    }

    /// Fills the column from `generate`, skipping positions where it returns `None`.
    pub fn initialize(&mut self, generate: &mut dyn FnMut(BlockPos) -> Option<BlockStateId>) -> Result<(), ChunkError> {
        for y in self.min_y..self.max_y() {
            for z in 0..16 {
                for x in 0..16 {
                    let pos = BlockPos::new(x, y, z);
                    if let Some(state) = generate(pos) {
                        self.set_block_state_id(pos, state)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stores a block entity payload.
    pub fn set_block_entity(&mut self, pos: BlockPos, payload: NbtCompound) -> Result<(), ChunkError> {
        self.section_slot(pos.y).ok_or_else(|| self.out_of_world(pos.y))?;
        self.block_entities.insert(pos, payload);
        Ok(())
    }

    /// The block entity payload at `pos`.
    #[must_use]
    pub fn get_block_entity(&self, pos: BlockPos) -> Option<&NbtCompound> {
        self.block_entities.get(pos)
    }

    /// Removes the block entity payload at `pos`.
    pub fn remove_block_entity(&mut self, pos: BlockPos) -> Option<NbtCompound> {
        self.block_entities.remove(pos)
    }

    /// All block entities.
    #[must_use]
    pub fn block_entities(&self) -> &BlockEntities {
        &self.block_entities
    }

    /// Encodes the chunk data: the masked sections and any biome trailer.
    ///
    /// 1.18+ layouts write every section and ignore the mask.
    pub fn dump(&self) -> Result<Vec<u8>, ChunkError> {
        let profile = self.version.profile();
        let mut buf = Vec::new();
        match profile.storage {
            SectionStorage::Flat => {
                let present: Vec<&ChunkSection> = self.sections.iter().flatten().filter(|s| s.has_content()).collect();
                flat::write_sections(&mut buf, &present)?;
            }
            SectionStorage::Paletted => self.write_paletted(&mut buf, &profile)?,
        }
        self.write_biome_trailer(&mut buf, &profile)?;
        Ok(buf)
    }

    fn write_paletted(&self, buf: &mut Vec<u8>, profile: &JavaProfile) -> Result<(), ChunkError> {
        let empty = ChunkSection::new(profile, self.has_sky_light)?;
        for (index, section) in self.sections.iter().enumerate() {
            if profile.write_all_sections {
                section.as_ref().unwrap_or(&empty).write(buf, profile)?;
                if let BiomeStorage::Sectioned(containers) = &self.biomes {
                    containers[index].write(buf, profile.wire)?;
                }
            } else if let Some(section) = section.as_ref().filter(|s| s.has_content()) {
                section.write(buf, profile)?;
            }
        }
        Ok(())
    }

    fn write_biome_trailer(&self, writer: &mut impl Write, profile: &JavaProfile) -> Result<(), ChunkError> {
        let BiomeStorage::Column2d(biomes) = &self.biomes else {
            return Ok(());
        };
        for &biome in biomes {
            match profile.biomes {
                BiomeFormat::Column2dBytes => (biome as u8).write(writer)?,
                _ => (biome as i32).write(writer)?,
            }
        }
        Ok(())
    }

    /// Decodes chunk data produced by [`JavaColumn::dump`].
    ///
    /// Sections named by `mask` are replaced; with `full_chunk` the others are
    /// cleared and a biome trailer is expected where the layout has one. The
    /// column is left unchanged when decoding fails.
    pub fn load(&mut self, data: &[u8], mask: &BitSet, full_chunk: bool) -> Result<(), ChunkError> {
        let profile = self.version.profile();
        if let Some(index) = mask.iter_ones().find(|&i| i >= self.sections.len()) {
            return Err(ChunkError::decode(
                "mask",
                format!("section {index} is outside the {} sections", self.sections.len()),
            ));
        }
        let has_trailer = full_chunk && matches!(self.biomes, BiomeStorage::Column2d(_));

        let mut cursor = Cursor::new(data);
        let (sections, section_biomes) = match profile.storage {
            SectionStorage::Flat => {
                let count = mask.count_ones();
                let expected = flat::expected_len(count, self.has_sky_light, has_trailer);
                if data.len() != expected {
                    return Err(ChunkError::decode(
                        "data",
                        format!("expected {expected} bytes for {count} sections, got {}", data.len()),
                    ));
                }
                let mut sections = vec![None; self.sections.len()];
                for (index, section) in mask
                    .iter_ones()
                    .zip(flat::read_sections(data, count, &profile, self.has_sky_light)?)
                {
                    sections[index] = Some(section);
                }
                cursor.set_position((expected - if has_trailer { 256 } else { 0 }) as u64);
                (sections, None)
            }
            SectionStorage::Paletted => self.read_paletted(&mut cursor, mask, &profile)?,
        };
        let trailer = if has_trailer {
            Some(read_biome_trailer(&mut cursor, &profile)?)
        } else {
            None
        };
        let remaining = data.len() - cursor.position() as usize;
        if remaining != 0 {
            return Err(ChunkError::decode("data", format!("{remaining} trailing bytes")));
        }

        for (index, section) in sections.into_iter().enumerate() {
            if profile.write_all_sections || mask.get(index) || full_chunk {
                self.sections[index] = section;
            }
        }
        if let Some(containers) = section_biomes {
            self.biomes = BiomeStorage::Sectioned(containers);
        }
        if let Some(biomes) = trailer {
            self.biomes = BiomeStorage::Column2d(biomes);
        }
        Ok(())
    }

    fn read_paletted(
        &self,
        reader: &mut impl Read,
        mask: &BitSet,
        profile: &JavaProfile,
    ) -> Result<(Vec<Option<ChunkSection>>, Option<Vec<PaletteContainer>>), ChunkError> {
        let mut sections = vec![None; self.sections.len()];
        let mut biomes = Vec::new();
        let biome_spec = ContainerSpec::biomes(self.biome_bits);
        for (index, slot) in sections.iter_mut().enumerate() {
            let field = format!("section[{index}]");
            if profile.write_all_sections {
                let section = ChunkSection::read(reader, profile, self.has_sky_light).field(&field)?;
                if matches!(profile.biomes, BiomeFormat::Sectioned) {
                    biomes.push(
                        PaletteContainer::read(reader, biome_spec, profile.wire)
                            .field("biomes")
                            .field(&field)?,
                    );
                }
                *slot = (!section.is_empty()).then_some(section);
            } else if mask.get(index) {
                *slot = Some(ChunkSection::read(reader, profile, self.has_sky_light).field(&field)?);
            }
        }
        let biomes = matches!(profile.biomes, BiomeFormat::Sectioned).then_some(biomes);
        Ok((sections, biomes))
    }

    /// The light arrays, for layouts that send light separately.
    pub fn dump_light(&self) -> Result<LightData, ChunkError> {
        self.require_separate_light()?;
        Ok(LightData::collect(&self.sky_light, &self.block_light))
    }

    /// Replaces all light from separately sent light data.
    pub fn load_light(&mut self, data: &LightData) -> Result<(), ChunkError> {
        self.require_separate_light()?;
        let (sky, block) = data.expand(self.sections.len() + 2, self.has_sky_light)?;
        self.sky_light = sky;
        self.block_light = block;
        Ok(())
    }

    /// Writes the light arrays in this version's wire form.
    pub fn write_light(&self, writer: &mut impl Write) -> Result<(), ChunkError> {
        let bitset_masks = self.require_separate_light()?;
        self.dump_light()?.write(writer, bitset_masks)
    }

    /// Reads light arrays in this version's wire form.
    pub fn read_light(&mut self, reader: &mut impl Read) -> Result<(), ChunkError> {
        let bitset_masks = self.require_separate_light()?;
        let data = LightData::read(reader, bitset_masks)?;
        self.load_light(&data)
    }

    fn require_separate_light(&self) -> Result<bool, ChunkError> {
        match self.version.profile().light {
            LightPlacement::Separate { bitset_masks } => Ok(bitset_masks),
            LightPlacement::InSection => Err(ChunkError::UnsupportedFormat {
                kind: "separate light for java",
                version: self.version.to_string(),
            }),
        }
    }

    /// The 4x4x4 biome cells, for layouts that send biomes separately.
    pub fn dump_biomes(&self) -> Result<Vec<i32>, ChunkError> {
        match &self.biomes {
            BiomeStorage::Cells3d(biomes) => Ok(biomes.iter().map(|&biome| biome as i32).collect()),
            _ => Err(self.no_separate_biomes()),
        }
    }

    /// Replaces the 4x4x4 biome cells.
    pub fn load_biomes(&mut self, biomes: &[i32]) -> Result<(), ChunkError> {
        let error = self.no_separate_biomes();
        let BiomeStorage::Cells3d(cells) = &mut self.biomes else {
            return Err(error);
        };
        if biomes.len() != cells.len() {
            return Err(ChunkError::decode(
                "biomes",
                format!("expected {} cells, got {}", cells.len(), biomes.len()),
            ));
        }
        for (index, (cell, &raw)) in cells.iter_mut().zip(biomes).enumerate() {
            *cell = u32::try_from(raw)
                .map_err(|_| ChunkError::decode(format!("biomes[{index}]"), format!("negative biome {raw}")))?;
        }
        Ok(())
    }

    fn no_separate_biomes(&self) -> ChunkError {
        ChunkError::UnsupportedFormat {
            kind: "separate biomes for java",
            version: self.version.to_string(),
        }
    }

    /// A lossless JSON snapshot.
    pub fn to_json(&self) -> Result<String, ChunkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a snapshot written by [`JavaColumn::to_json`].
    pub fn from_json(json: &str) -> Result<Self, ChunkError> {
        let column: Self = serde_json::from_str(json)?;
        column.check_shape()?;
        Ok(column)
    }

    pub(crate) fn check_shape(&self) -> Result<(), ChunkError> {
        let expected = Self::new(
            self.version,
            JavaOptions {
                min_y: Some(self.min_y),
                world_height: Some(self.world_height),
                sky_light: self.has_sky_light,
                biome_bits: self.biome_bits,
            },
        )?;
        let profile = self.version.profile();
        let biome_spec = ContainerSpec::biomes(self.biome_bits);
        let biomes_match = match (&self.biomes, &expected.biomes) {
            (BiomeStorage::Column2d(a), BiomeStorage::Column2d(b)) | (BiomeStorage::Cells3d(a), BiomeStorage::Cells3d(b)) => {
                a.len() == b.len()
            }
            (BiomeStorage::Sectioned(a), BiomeStorage::Sectioned(b)) => {
                a.len() == b.len() && a.iter().all(|container| *container.spec() == biome_spec)
            }
            _ => false,
        };
        let in_section = matches!(profile.light, LightPlacement::InSection);
        let sections_match = self.sections.iter().flatten().all(|section| {
            *section.blocks().spec() == profile.blocks
                && section.block_light().is_some() == in_section
                && section.sky_light().is_some() == (in_section && self.has_sky_light)
        });
        if self.sections.len() != expected.sections.len()
            || self.sky_light.len() != expected.sky_light.len()
            || self.block_light.len() != expected.block_light.len()
            || !biomes_match
            || !sections_match
        {
            return Err(ChunkError::decode("snapshot", "storage does not match the column shape"));
        }
        Ok(())
    }
}

fn read_biome_trailer(reader: &mut impl Read, profile: &JavaProfile) -> Result<Vec<u32>, ChunkError> {
    let mut biomes = Vec::with_capacity(256);
    for index in 0..256 {
        biomes.push(match profile.biomes {
            BiomeFormat::Column2dBytes => u32::from(u8::read(reader).field("biomes")?),
            _ => {
                let raw = i32::read(reader).field("biomes")?;
                u32::try_from(raw)
                    .map_err(|_| ChunkError::decode(format!("biomes[{index}]"), format!("negative biome {raw}")))?
            }
        });
    }
    Ok(biomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(version: JavaVersion) -> JavaColumn {
        let mut column = JavaColumn::new(version, JavaOptions::default()).unwrap();
        let min_y = column.min_y();
        column
            .initialize(&mut |pos| {
                let depth = pos.y - min_y;
                (depth < 40 && (i32::from(pos.x) + depth) % 3 != 0)
                    .then(|| BlockStateId(1 + (u32::from(pos.x) * 7 + u32::from(pos.z) + depth as u32) % 300))
            })
            .unwrap();
        column
    }

    #[test]
    fn test_out_of_world_defaults() {
        let mut column = JavaColumn::new(JavaVersion::V1_18, JavaOptions::default()).unwrap();
        let below = BlockPos::new(0, -65, 0);
        assert_eq!(column.get_block_state_id(below), BlockStateId::AIR);
        assert_eq!(column.get_biome(below), BiomeId(0));
        assert_eq!(column.get_sky_light(BlockPos::new(0, 1000, 0)), 15);
        assert_eq!(column.get_block_light(below), 0);
        assert!(matches!(
            column.set_block_state_id(below, BlockStateId(1)),
            Err(ChunkError::OutOfWorld { y: -65, min_y: -64, max_y: 320 })
        ));
        // The extra light section below the world is addressable.
        column.set_block_light(below, 4).unwrap();
        assert_eq!(column.get_block_light(below), 4);
    }

    #[test]
    fn test_air_keeps_sections_sparse() {
        let mut column = JavaColumn::new(JavaVersion::V1_16, JavaOptions::default()).unwrap();
        column.set_block_state_id(BlockPos::new(1, 30, 1), BlockStateId::AIR).unwrap();
        assert!(column.section(1).is_none());
        column.set_block_state_id(BlockPos::new(1, 30, 1), BlockStateId(5)).unwrap();
        assert!(column.section(1).is_some());
        assert!(column.get_mask().get(1));
        assert_eq!(column.get_mask().count_ones(), 1);
    }

    #[test]
    fn test_dump_load_every_version() {
        for version in JavaVersion::ALL {
            let mut column = generated(version);
            let profile = version.profile();
            for x in 0..16 {
                column.set_biome(BlockPos::new(x, column.min_y() + 5, 3), BiomeId(x as u32 + 1)).unwrap();
            }
            if matches!(profile.light, LightPlacement::InSection) {
                column.set_block_light(BlockPos::new(2, column.min_y() + 3, 2), 11).unwrap();
            }

            let data = column.dump().unwrap();
            let mut loaded = JavaColumn::new(version, JavaOptions::default()).unwrap();
            loaded.load(&data, &column.get_mask(), true).unwrap();
            if let Ok(biomes) = column.dump_biomes() {
                loaded.load_biomes(&biomes).unwrap();
            }
            if let Ok(light) = column.dump_light() {
                loaded.load_light(&light).unwrap();
            }
            assert_eq!(loaded.to_json().unwrap(), column.to_json().unwrap(), "{version}");
            assert_eq!(loaded, column, "{version}");
        }
    }

    #[test]
    fn test_light_in_air_section_survives_dump() {
        for version in [JavaVersion::V1_8, JavaVersion::V1_9, JavaVersion::V1_13] {
            let mut column = generated(version);
            let lit = BlockPos::new(1, 100, 1);
            column.set_block_light(lit, 9).unwrap();
            column.set_sky_light(BlockPos::new(2, 200, 2), 3).unwrap();
            let mask = column.get_mask();
            assert!(mask.get(6) && mask.get(12), "{version}");
            assert!(!mask.get(9), "{version}");

            let data = column.dump().unwrap();
            let mut loaded = JavaColumn::new(version, JavaOptions::default()).unwrap();
            loaded.load(&data, &mask, true).unwrap();
            assert_eq!(loaded.get_block_light(lit), 9, "{version}");
            assert_eq!(loaded.get_sky_light(BlockPos::new(2, 200, 2)), 3, "{version}");
            assert_eq!(loaded.get_mask(), mask, "{version}");
        }
    }

    #[test]
    fn test_load_rejects_bad_lengths() {
        let column = generated(JavaVersion::V1_8);
        let mut data = column.dump().unwrap();
        data.push(0);
        let mut loaded = JavaColumn::new(JavaVersion::V1_8, JavaOptions::default()).unwrap();
        assert!(matches!(
            loaded.load(&data, &column.get_mask(), true),
            Err(ChunkError::Decode { ref field, .. }) if field == "data"
        ));

        let column = generated(JavaVersion::V1_16);
        let mut data = column.dump().unwrap();
        data.extend_from_slice(&[1, 2]);
        let mut loaded = JavaColumn::new(JavaVersion::V1_16, JavaOptions::default()).unwrap();
        assert!(loaded.load(&data, &column.get_mask(), true).is_err());
    }

    #[test]
    fn test_direct_promotion_in_column() {
        let mut column = JavaColumn::new(JavaVersion::V1_18, JavaOptions::default()).unwrap();
        let mut id = 0;
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    column.set_block_state_id(BlockPos::new(x, y, z), BlockStateId(id)).unwrap();
                    id += 1;
                }
            }
        }
        let section = column.section(4).unwrap();
        assert!(matches!(section.blocks(), PaletteContainer::Direct(_)));
        assert_eq!(section.solid_block_count(), 4095);

        let mut id = 0;
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    assert_eq!(column.get_block_state_id(BlockPos::new(x, y, z)), BlockStateId(id));
                    id += 1;
                }
            }
        }
    }

    #[test]
    fn test_variable_height_only_for_new_layouts() {
        let tall = JavaOptions {
            min_y: Some(-128),
            world_height: Some(512),
            ..JavaOptions::default()
        };
        let column = JavaColumn::new(JavaVersion::V1_17, tall).unwrap();
        assert_eq!(column.section_count(), 32);
        assert_eq!(column.max_y(), 384);
        assert!(JavaColumn::new(JavaVersion::V1_16, tall).is_err());
        assert!(matches!(
            JavaColumn::new(
                JavaVersion::V1_18,
                JavaOptions {
                    world_height: Some(100),
                    ..JavaOptions::default()
                }
            ),
            Err(ChunkError::Construction(_))
        ));
    }

    #[test]
    fn test_light_wire_round_trip() {
        let mut column = generated(JavaVersion::V1_17);
        column.set_sky_light(BlockPos::new(3, 10, 3), 2).unwrap();
        column.set_block_light(BlockPos::new(3, 250, 3), 9).unwrap();
        let mut buf = Vec::new();
        column.write_light(&mut buf).unwrap();

        let mut loaded = generated(JavaVersion::V1_17);
        loaded.read_light(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(loaded.get_sky_light(BlockPos::new(3, 10, 3)), 2);
        assert_eq!(loaded.get_sky_light(BlockPos::new(4, 10, 3)), 15);
        assert_eq!(loaded.get_block_light(BlockPos::new(3, 250, 3)), 9);
        assert_eq!(loaded, column);
    }

    #[test]
    fn test_snapshot_json() {
        let mut column = generated(JavaVersion::V1_21_5);
        let mut payload = NbtCompound::new();
        payload.insert("id", strata_utils::nbt::Tag::String("minecraft:sign".to_owned()));
        column.set_block_entity(BlockPos::new(1, 2, 3), payload).unwrap();
        let json = column.to_json().unwrap();
        assert_eq!(JavaColumn::from_json(&json).unwrap(), column);
        assert!(JavaColumn::from_json("{}").is_err());
    }

    #[test]
    fn test_snapshot_rejects_truncated_palette() {
        let mut column = JavaColumn::new(JavaVersion::V1_18, JavaOptions::default()).unwrap();
        for x in 0..5 {
            column.set_block_state_id(BlockPos::new(x, 0, 0), BlockStateId(u32::try_from(x).unwrap() + 1)).unwrap();
        }
        let mut json: serde_json::Value = serde_json::from_str(&column.to_json().unwrap()).unwrap();
        let section = &mut json["sections"][4];
        assert_eq!(section["blocks"]["palette"].as_array().map(Vec::len), Some(6));
        section["blocks"]["palette"] = serde_json::json!([0]);
        assert!(JavaColumn::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn test_snapshot_rejects_foreign_container_rules() {
        let mut column = JavaColumn::new(JavaVersion::V1_18, JavaOptions::default()).unwrap();
        column.set_block_state_id(BlockPos::new(0, 0, 0), BlockStateId(1)).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&column.to_json().unwrap()).unwrap();
        json["sections"][4]["blocks"]["spec"]["global_bits"] = serde_json::json!(20);
        assert!(JavaColumn::from_json(&json.to_string()).is_err());
    }
}
