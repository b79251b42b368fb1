use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{bits_for_palette_len, codec::VarInt, serial::WriteTo};

use super::{ContainerSpec, IndirectPaletteContainer, WireOptions, read_data_len, read_entry, write_data_len};
use crate::error::{ChunkError, DecodeContext};

/// A container where every position holds one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SingleRepr", into = "SingleRepr")]
pub struct SingleValueContainer {
    spec: ContainerSpec,
    value: u32,
}

#[derive(Serialize, Deserialize)]
struct SingleRepr {
    spec: ContainerSpec,
    value: u32,
}

impl TryFrom<SingleRepr> for SingleValueContainer {
    type Error = ChunkError;

    fn try_from(repr: SingleRepr) -> Result<Self, Self::Error> {
        repr.spec.check_rules()?;
        repr.spec.check_value(repr.value)?;
        Ok(Self::new(repr.spec, repr.value))
    }
}

impl From<SingleValueContainer> for SingleRepr {
    fn from(container: SingleValueContainer) -> Self {
        Self {
            spec: container.spec,
            value: container.value,
        }
    }
}

impl SingleValueContainer {
    pub(super) fn new(spec: ContainerSpec, value: u32) -> Self {
        Self { spec, value }
    }

    /// The sizing rules.
    #[must_use]
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// The value held at every position.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Returns the indirect container that replaces this one, if `value` differs.
    pub(super) fn set(&mut self, index: usize, value: u32) -> Result<Option<IndirectPaletteContainer>, ChunkError> {
        if value == self.value {
            return Ok(None);
        }
        let bits = bits_for_palette_len(2).max(self.spec.min_bits);
        let mut indirect = IndirectPaletteContainer::with_palette(self.spec, vec![self.value, value], bits)?;
        indirect.set_index(index, 1)?;
        Ok(Some(indirect))
    }

    pub(super) fn write(&self, writer: &mut impl Write, options: WireOptions) -> Result<(), ChunkError> {
        0_u8.write(writer)?;
        VarInt(self.value as i32).write(writer)?;
        write_data_len(writer, 0, options)
    }

    pub(super) fn read(reader: &mut impl Read, spec: ContainerSpec, options: WireOptions) -> Result<Self, ChunkError> {
        let value = read_entry(reader, &spec).field("value")?;
        read_data_len(reader, 0, options)?;
        Ok(Self { spec, value })
    }
}
