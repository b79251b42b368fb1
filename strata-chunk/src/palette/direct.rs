use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{
    BitArray, Endian,
    codec::VarInt,
    serial::{ReadFrom, WriteTo},
};

use super::{ContainerSpec, WireOptions, read_data_len, write_data_len};
use crate::error::{ChunkError, DecodeContext};

/// Packed global ids with no local palette.
///
/// A direct container keeps the width it was decoded with and widens to the
/// global width only when a value does not fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DirectRepr", into = "DirectRepr")]
pub struct DirectPaletteContainer {
    spec: ContainerSpec,
    data: BitArray<u64>,
}

#[derive(Serialize, Deserialize)]
struct DirectRepr {
    spec: ContainerSpec,
    data: BitArray<u64>,
}

impl TryFrom<DirectRepr> for DirectPaletteContainer {
    type Error = ChunkError;

    fn try_from(repr: DirectRepr) -> Result<Self, Self::Error> {
        repr.spec.check_data(&repr.data, repr.spec.global_bits)?;
        Ok(Self::from_data(repr.spec, repr.data))
    }
}

impl From<DirectPaletteContainer> for DirectRepr {
    fn from(container: DirectPaletteContainer) -> Self {
        Self {
            spec: container.spec,
            data: container.data,
        }
    }
}

impl DirectPaletteContainer {
    pub(super) fn from_data(spec: ContainerSpec, data: BitArray<u64>) -> Self {
        Self { spec, data }
    }

    /// The sizing rules.
    #[must_use]
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Width of the packed ids.
    #[must_use]
    pub fn bits_per_value(&self) -> u8 {
        self.data.bits_per_value()
    }

    pub(super) fn get(&self, index: usize) -> u32 {
        self.data.get(index) as u32
    }

    pub(super) fn set(&mut self, index: usize, value: u32) -> Result<(), ChunkError> {
        let value = u64::from(value);
        if value > self.data.max_value() {
            self.data = self.data.resize_to(self.spec.global_bits)?;
        }
        self.data.set(index, value)?;
        Ok(())
    }

    pub(super) fn count_where(&self, pred: impl Fn(u32) -> bool) -> usize {
        self.data.iter().filter(|&value| pred(value as u32)).count()
    }

    pub(super) fn write(&self, writer: &mut impl Write, options: WireOptions) -> Result<(), ChunkError> {
        self.data.bits_per_value().write(writer)?;
        if options.direct_palette_len {
            VarInt(0).write(writer)?;
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
        if options.direct_palette_len {
            let VarInt(len) = VarInt::read(reader).field("palette_len")?;
            if len != 0 {
                return Err(ChunkError::decode(
                    "palette_len",
                    format!("direct containers carry no palette, got {len} entries"),
                ));
            }
        }
        let expected = BitArray::<u64>::word_count_for(bits, spec.capacity, spec.layout);
        read_data_len(reader, expected, options)?;
        let data = BitArray::read_from(reader, bits, spec.capacity, spec.layout, Endian::Big).field("data")?;
        Ok(Self { spec, data })
    }
}
