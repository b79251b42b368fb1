use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{
    BitArray, Endian, bits_for_palette_len,
    codec::VarInt,
    serial::{ReadFrom, WriteTo},
};

use super::{ContainerSpec, DirectPaletteContainer, WireOptions, read_data_len, read_entry, write_data_len};
use crate::error::{ChunkError, DecodeContext};

/// A local palette of unique values and packed indices into it.
///
/// Every packed index is below `palette.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndirectRepr", into = "IndirectRepr")]
pub struct IndirectPaletteContainer {
    spec: ContainerSpec,
    palette: Vec<u32>,
    data: BitArray<u64>,
}

#[derive(Serialize, Deserialize)]
struct IndirectRepr {
    spec: ContainerSpec,
    palette: Vec<u32>,
    data: BitArray<u64>,
}

impl TryFrom<IndirectRepr> for IndirectPaletteContainer {
    type Error = ChunkError;

    fn try_from(repr: IndirectRepr) -> Result<Self, Self::Error> {
        let IndirectRepr { spec, palette, data } = repr;
        spec.check_data(&data, spec.max_indirect_bits)?;
        let len = palette.len();
        if len == 0 || len > 1_usize << data.bits_per_value() {
            return Err(ChunkError::decode(
                "palette",
                format!("{len} entries for {} bits", data.bits_per_value()),
            ));
        }
        for &entry in &palette {
            spec.check_value(entry).field("palette")?;
        }
        if let Some((index, value)) = data.iter().enumerate().find(|&(_, value)| value as usize >= len) {
            return Err(ChunkError::decode(
                "data",
                format!("index {index} refers to palette entry {value} of {len}"),
            ));
        }
        Ok(Self { spec, palette, data })
    }
}

impl From<IndirectPaletteContainer> for IndirectRepr {
    fn from(container: IndirectPaletteContainer) -> Self {
        Self {
            spec: container.spec,
            palette: container.palette,
            data: container.data,
        }
    }
}

impl IndirectPaletteContainer {
    /// A container with a one-entry palette, for formats without single values.
    pub(super) fn filled(spec: ContainerSpec, value: u32) -> Result<Self, ChunkError> {
        Self::with_palette(spec, vec![value], spec.min_bits)
    }

    pub(super) fn with_palette(spec: ContainerSpec, palette: Vec<u32>, bits: u8) -> Result<Self, ChunkError> {
        Ok(Self {
            spec,
            palette,
            data: BitArray::new(bits, spec.capacity, spec.layout)?,
        })
    }

    /// The sizing rules.
    #[must_use]
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// The palette in insertion order.
    #[must_use]
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Width of the packed indices.
    #[must_use]
    pub fn bits_per_value(&self) -> u8 {
        self.data.bits_per_value()
    }

    pub(super) fn get(&self, index: usize) -> u32 {
        self.palette[self.data.get(index) as usize]
    }

    pub(super) fn set_index(&mut self, index: usize, palette_index: usize) -> Result<(), ChunkError> {
        self.data.set(index, palette_index as u64)?;
        Ok(())
    }

    /// Stores `value`, returning the direct container that replaces this one
    /// when the palette outgrows the indirect width.
    pub(super) fn set(&mut self, index: usize, value: u32) -> Result<Option<DirectPaletteContainer>, ChunkError> {
        if let Some(palette_index) = self.palette.iter().position(|&entry| entry == value) {
            self.set_index(index, palette_index)?;
            return Ok(None);
        }

        let needed = bits_for_palette_len(self.palette.len() + 1);
        if needed > self.spec.max_indirect_bits {
            let mut direct = self.to_direct()?;
            direct.set(index, value)?;
            return Ok(Some(direct));
        }
        if needed > self.data.bits_per_value() {
            self.data = self.data.resize_to(needed.max(self.spec.min_bits))?;
        }
        self.palette.push(value);
        self.set_index(index, self.palette.len() - 1)?;
        Ok(None)
    }

    fn to_direct(&self) -> Result<DirectPaletteContainer, ChunkError> {
        let mut data = BitArray::new(self.spec.global_bits, self.spec.capacity, self.spec.layout)?;
        for (index, palette_index) in self.data.iter().enumerate() {
            data.set(index, u64::from(self.palette[palette_index as usize]))?;
        }
        Ok(DirectPaletteContainer::from_data(self.spec, data))
    }

    pub(super) fn count_where(&self, pred: impl Fn(u32) -> bool) -> usize {
        let matches: Vec<bool> = self.palette.iter().map(|&entry| pred(entry)).collect();
        self.data.iter().filter(|&index| matches[index as usize]).count()
    }

    pub(super) fn write(&self, writer: &mut impl Write, options: WireOptions) -> Result<(), ChunkError> {
        self.data.bits_per_value().write(writer)?;
        VarInt::try_from(self.palette.len())
            .map_err(|_| ChunkError::Construction("palette too long".to_owned()))?
            .write(writer)?;
        for &entry in &self.palette {
            VarInt(entry as i32).write(writer)?;
        }
        write_data_len(writer, self.data.words().len(), options)?;
        self.data.write_to(writer, Endian::Big)?;
        Ok(())
    }

    pub(super) fn read(
        reader: &mut impl Read,
        spec: ContainerSpec,
        bits: u8,
        options: WireOptions,
    ) -> Result<Self, ChunkError> {
        let len = usize::try_from(VarInt::read(reader).field("palette_len")?)
            .map_err(|_| ChunkError::decode("palette_len", "negative length"))?;
        let limit = (1_usize << bits).min(spec.capacity);
        if len == 0 || len > limit {
            return Err(ChunkError::decode(
                "palette_len",
                format!("{len} entries is outside 1..={limit} for {bits} bits"),
            ));
        }
        let mut palette = Vec::with_capacity(len);
        for i in 0..len {
            palette.push(read_entry(reader, &spec).field(&format!("palette[{i}]"))?);
        }

        let expected = BitArray::<u64>::word_count_for(bits, spec.capacity, spec.layout);
        read_data_len(reader, expected, options)?;
        let data = BitArray::<u64>::read_from(reader, bits, spec.capacity, spec.layout, Endian::Big).field("data")?;
        if let Some((index, value)) = data.iter().enumerate().find(|&(_, value)| value as usize >= len) {
            return Err(ChunkError::decode(
                "data",
                format!("index {index} refers to palette entry {value} of {len}"),
            ));
        }
        Ok(Self { spec, palette, data })
    }
}
