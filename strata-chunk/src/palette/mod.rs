//! Palette containers: the storage strategy behind every section.
//!
//! A container starts as a single value, becomes an indirect (local palette)
//! container on the first differing write, and is converted to a direct
//! (global id) container once the palette no longer fits the indirect width.
//! Containers never shrink back.

mod direct;
mod indirect;
mod single;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use strata_utils::{
    BitArray, BitLayout, value_mask,
    codec::VarInt,
    serial::{ReadFrom, WriteTo},
};

use crate::error::{ChunkError, DecodeContext};

pub use direct::DirectPaletteContainer;
pub use indirect::IndirectPaletteContainer;
pub use single::SingleValueContainer;

/// Sizing rules for one kind of container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Number of values held.
    pub capacity: usize,
    /// Smallest width an indirect container is created with.
    pub min_bits: u8,
    /// Widest indirect container before converting to direct storage.
    pub max_indirect_bits: u8,
    /// Width of a direct container, and the widest value accepted.
    pub global_bits: u8,
    /// How values are packed into words.
    pub layout: BitLayout,
    /// Whether a zero-width single-value container exists in this format.
    pub single_value: bool,
}

impl ContainerSpec {
    /// A 16x16x16 block-state container.
    #[must_use]
    pub const fn blocks(global_bits: u8, layout: BitLayout, single_value: bool) -> Self {
        Self {
            capacity: 4096,
            min_bits: 4,
            max_indirect_bits: 8,
            global_bits,
            layout,
            single_value,
        }
    }

    /// A 4x4x4 biome container.
    #[must_use]
    pub const fn biomes(global_bits: u8) -> Self {
        Self {
            capacity: 64,
            min_bits: 1,
            max_indirect_bits: 3,
            global_bits,
            layout: BitLayout::Padded,
            single_value: true,
        }
    }

    /// Largest value this container accepts.
    #[must_use]
    pub const fn max_value(&self) -> u64 {
        value_mask(self.global_bits)
    }

    fn check_value(&self, value: u32) -> Result<(), ChunkError> {
        if u64::from(value) > self.max_value() {
            return Err(ChunkError::ValueOverflow {
                value: u64::from(value),
                bits: self.global_bits,
            });
        }
        Ok(())
    }

    /// Rejects deserialized sizing rules no container could follow.
    fn check_rules(&self) -> Result<(), ChunkError> {
        if self.capacity == 0
            || self.min_bits == 0
            || self.min_bits > self.max_indirect_bits
            || self.max_indirect_bits > self.global_bits
            || self.global_bits > 32
        {
            return Err(ChunkError::decode("spec", format!("inconsistent container rules {self:?}")));
        }
        Ok(())
    }

    /// Checks a deserialized data array against these rules.
    fn check_data(&self, data: &BitArray<u64>, widest: u8) -> Result<(), ChunkError> {
        self.check_rules()?;
        if data.capacity() != self.capacity || data.layout() != self.layout {
            return Err(ChunkError::decode(
                "data",
                format!(
                    "{} {:?} values do not fit {} {:?} values",
                    data.capacity(),
                    data.layout(),
                    self.capacity,
                    self.layout
                ),
            ));
        }
        let bits = data.bits_per_value();
        if bits == 0 || bits > widest {
            return Err(ChunkError::decode(
                "data",
                format!("{bits} bits is outside 1..={widest}"),
            ));
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), ChunkError> {
        if index >= self.capacity {
            return Err(ChunkError::Bounds {
                index,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Framing differences between protocol revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireOptions {
    /// Whether a VarInt word count precedes the packed data.
    pub size_prefix: bool,
    /// Whether direct containers carry an (empty) palette length.
    pub direct_palette_len: bool,
}

/// One of the three container strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaletteContainer {
    /// Every position holds the same value.
    Single(SingleValueContainer),
    /// A local palette indexed by packed values.
    Indirect(IndirectPaletteContainer),
    /// Packed global ids.
    Direct(DirectPaletteContainer),
}

impl PaletteContainer {
    /// Creates a container filled with `value`.
    ///
    /// Formats without single-value containers start with a one-entry palette.
    pub fn filled(spec: ContainerSpec, value: u32) -> Result<Self, ChunkError> {
        spec.check_value(value)?;
        if spec.single_value {
            Ok(Self::Single(SingleValueContainer::new(spec, value)))
        } else {
            Ok(Self::Indirect(IndirectPaletteContainer::filled(spec, value)?))
        }
    }

    /// The sizing rules this container follows.
    #[must_use]
    pub fn spec(&self) -> &ContainerSpec {
        match self {
            Self::Single(c) => c.spec(),
            Self::Indirect(c) => c.spec(),
            Self::Direct(c) => c.spec(),
        }
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    /// If `index` is outside the container's capacity.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        match self {
            Self::Single(c) => c.value(),
            Self::Indirect(c) => c.get(index),
            Self::Direct(c) => c.get(index),
        }
    }

    /// Stores `value` at `index`, changing strategy when needed.
    pub fn set(&mut self, index: usize, value: u32) -> Result<(), ChunkError> {
        let spec = *self.spec();
        spec.check_index(index)?;
        spec.check_value(value)?;
        let next = match self {
            Self::Single(c) => c.set(index, value)?.map(Self::Indirect),
            Self::Indirect(c) => c.set(index, value)?.map(Self::Direct),
            Self::Direct(c) => {
                c.set(index, value)?;
                None
            }
        };
        if let Some(next) = next {
            log::debug!(
                "palette container promoted to {} at {} bits",
                next.kind_name(),
                next.bits_per_value()
            );
            *self = next;
        }
        Ok(())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Indirect(_) => "indirect",
            Self::Direct(_) => "direct",
        }
    }

    /// Width of the packed data, 0 for a single value.
    #[must_use]
    pub fn bits_per_value(&self) -> u8 {
        match self {
            Self::Single(_) => 0,
            Self::Indirect(c) => c.bits_per_value(),
            Self::Direct(c) => c.bits_per_value(),
        }
    }

    /// The local palette, if the container has one.
    #[must_use]
    pub fn palette(&self) -> Option<&[u32]> {
        match self {
            Self::Indirect(c) => Some(c.palette()),
            Self::Single(_) | Self::Direct(_) => None,
        }
    }

    /// Whether every position holds the same value.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        match self {
            Self::Single(_) => true,
            Self::Indirect(c) => c.palette().len() == 1,
            Self::Direct(_) => false,
        }
    }

    /// Counts the positions whose value satisfies `pred`.
    #[must_use]
    pub fn count_where(&self, pred: impl Fn(u32) -> bool) -> usize {
        match self {
            Self::Single(c) => {
                if pred(c.value()) {
                    c.spec().capacity
                } else {
                    0
                }
            }
            Self::Indirect(c) => c.count_where(pred),
            Self::Direct(c) => c.count_where(pred),
        }
    }

    /// All values in index order.
    #[must_use]
    pub fn values(&self) -> Vec<u32> {
        (0..self.spec().capacity).map(|index| self.get(index)).collect()
    }

    /// Writes the network/disk encoding of this container.
    pub fn write(&self, writer: &mut impl Write, options: WireOptions) -> Result<(), ChunkError> {
        match self {
            Self::Single(c) => c.write(writer, options),
            Self::Indirect(c) => c.write(writer, options),
            Self::Direct(c) => c.write(writer, options),
        }
    }

    /// Reads a container, validating every field against `spec`.
    pub fn read(reader: &mut impl Read, spec: ContainerSpec, options: WireOptions) -> Result<Self, ChunkError> {
        let bits = u8::read(reader).field("bits_per_value")?;
        if bits == 0 {
            if !spec.single_value {
                return Err(ChunkError::decode(
                    "bits_per_value",
                    "zero width is not valid in this format",
                ));
            }
            return SingleValueContainer::read(reader, spec, options).map(Self::Single);
        }
        if bits > spec.global_bits {
            return Err(ChunkError::decode(
                "bits_per_value",
                format!("{bits} exceeds the maximum of {}", spec.global_bits),
            ));
        }
        if bits <= spec.max_indirect_bits {
            IndirectPaletteContainer::read(reader, spec, bits, options).map(Self::Indirect)
        } else {
            DirectPaletteContainer::read(reader, spec, bits, options).map(Self::Direct)
        }
    }
}

/// Reads a palette entry, rejecting values outside the global id space.
fn read_entry(reader: &mut impl Read, spec: &ContainerSpec) -> Result<u32, ChunkError> {
    let VarInt(raw) = VarInt::read(reader)?;
    let value = u32::try_from(raw).map_err(|_| ChunkError::decode("", format!("negative id {raw}")))?;
    if u64::from(value) > spec.max_value() {
        return Err(ChunkError::decode(
            "",
            format!("id {value} exceeds {} bits", spec.global_bits),
        ));
    }
    Ok(value)
}

/// Reads the optional VarInt word count and checks it against `expected`.
fn read_data_len(reader: &mut impl Read, expected: usize, options: WireOptions) -> Result<(), ChunkError> {
    if !options.size_prefix {
        return Ok(());
    }
    let len = usize::try_from(VarInt::read(reader).field("data_len")?)
        .map_err(|_| ChunkError::decode("data_len", "negative length"))?;
    if len != expected {
        return Err(ChunkError::decode(
            "data_len",
            format!("expected {expected} words, got {len}"),
        ));
    }
    Ok(())
}

fn write_data_len(writer: &mut impl Write, words: usize, options: WireOptions) -> Result<(), ChunkError> {
    if options.size_prefix {
        VarInt::try_from(words)
            .map_err(|_| ChunkError::Construction(format!("{words} words do not fit a VarInt")))?
            .write(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const MODERN: WireOptions = WireOptions {
        size_prefix: true,
        direct_palette_len: false,
    };

    fn blocks() -> ContainerSpec {
        ContainerSpec::blocks(15, BitLayout::Padded, true)
    }

    fn round_trip(container: &PaletteContainer, options: WireOptions) -> PaletteContainer {
        let mut buf = Vec::new();
        container.write(&mut buf, options).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = PaletteContainer::read(&mut cursor, *container.spec(), options).unwrap();
        assert_eq!(cursor.position() as usize, buf.len());
        decoded
    }

    #[test]
    fn test_single_promotes_to_indirect() {
        let mut container = PaletteContainer::filled(blocks(), 1).unwrap();
        container.set(10, 1).unwrap();
        assert!(matches!(container, PaletteContainer::Single(_)));

        container.set(10, 9).unwrap();
        assert!(matches!(container, PaletteContainer::Indirect(_)));
        assert_eq!(container.palette(), Some(&[1, 9][..]));
        assert_eq!(container.bits_per_value(), 4);
        assert_eq!(container.get(10), 9);
        assert_eq!(container.get(11), 1);
    }

    #[test]
    fn test_distinct_ids_force_direct() {
        let mut container = PaletteContainer::filled(blocks(), 0).unwrap();
        let mut last_len = 0;
        for id in 0..4096_u32 {
            container.set(id as usize, id).unwrap();
            if let Some(palette) = container.palette() {
                assert!(palette.len() >= last_len);
                last_len = palette.len();
            }
        }
        assert!(matches!(container, PaletteContainer::Direct(_)));
        assert_eq!(container.bits_per_value(), 15);
        let values = container.values();
        assert!(values.iter().copied().eq(0..4096));
        assert_eq!(round_trip(&container, MODERN), container);
    }

    #[test]
    fn test_rejects_values_wider_than_global() {
        let mut container = PaletteContainer::filled(blocks(), 0).unwrap();
        assert!(matches!(
            container.set(0, 1 << 15),
            Err(ChunkError::ValueOverflow { bits: 15, .. })
        ));
        assert!(matches!(container.set(4096, 1), Err(ChunkError::Bounds { .. })));
        assert!(matches!(container, PaletteContainer::Single(_)));
    }

    #[test]
    fn test_wire_round_trips() {
        let single = PaletteContainer::filled(blocks(), 7).unwrap();
        let mut buf = Vec::new();
        single.write(&mut buf, MODERN).unwrap();
        assert_eq!(buf, [0, 7, 0]);
        assert_eq!(round_trip(&single, MODERN), single);

        let mut indirect = single.clone();
        for i in 0..40 {
            indirect.set(i * 7, i as u32).unwrap();
        }
        assert_eq!(indirect.bits_per_value(), 6);
        assert_eq!(round_trip(&indirect, MODERN), indirect);

        let no_prefix = WireOptions {
            size_prefix: false,
            direct_palette_len: false,
        };
        assert_eq!(round_trip(&indirect, no_prefix), indirect);
    }

    #[test]
    fn test_read_validates_fields() {
        let spec = blocks();
        let read = |bytes: &[u8]| PaletteContainer::read(&mut Cursor::new(bytes), spec, MODERN).unwrap_err();

        let err = read(&[16]);
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "bits_per_value"));

        // 4 bits allows at most 16 palette entries.
        let err = read(&[4, 17]);
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "palette_len"));

        let err = read(&[4, 0]);
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "palette_len"));

        // 4 bits, palette [1], data length 3 instead of 256.
        let err = read(&[4, 1, 1, 3]);
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "data_len"));

        let legacy = ContainerSpec::blocks(14, BitLayout::Spanning, false);
        let err = PaletteContainer::read(&mut Cursor::new([0_u8, 0, 0]), legacy, MODERN).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "bits_per_value"));
    }

    #[test]
    fn test_read_rejects_out_of_palette_index() {
        let spec = blocks();
        let mut buf = vec![4, 2, 5, 6, 0x80, 0x02];
        let mut first = [0_u8; 8];
        // Index 3 in the first slot with only two palette entries.
        first[7] = 3;
        buf.extend_from_slice(&first);
        buf.extend(std::iter::repeat_n(0, 255 * 8));
        let err = PaletteContainer::read(&mut Cursor::new(buf.as_slice()), spec, MODERN).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { ref field, .. } if field == "data"));
    }

    #[test]
    fn test_snapshot_rejects_tampered_containers() {
        let mut container = PaletteContainer::filled(blocks(), 0).unwrap();
        for i in 0..5 {
            container.set(i * 3, i as u32 + 1).unwrap();
        }
        let json = serde_json::to_value(&container).unwrap();
        assert_eq!(serde_json::from_value::<PaletteContainer>(json.clone()).unwrap(), container);

        let mut truncated = json.clone();
        truncated["palette"] = serde_json::json!([0]);
        assert!(serde_json::from_value::<PaletteContainer>(truncated).is_err());

        let mut empty = json.clone();
        empty["palette"] = serde_json::json!([]);
        assert!(serde_json::from_value::<PaletteContainer>(empty).is_err());

        let mut resized = json.clone();
        resized["spec"]["capacity"] = serde_json::json!(64);
        assert!(serde_json::from_value::<PaletteContainer>(resized).is_err());

        let mut wide = serde_json::to_value(PaletteContainer::filled(blocks(), 0).unwrap()).unwrap();
        wide["value"] = serde_json::json!(1 << 15);
        assert!(serde_json::from_value::<PaletteContainer>(wide).is_err());
    }

    #[test]
    fn test_count_where() {
        let mut container = PaletteContainer::filled(blocks(), 0).unwrap();
        assert_eq!(container.count_where(|v| v != 0), 0);
        container.set(1, 3).unwrap();
        container.set(2, 3).unwrap();
        container.set(2, 0).unwrap();
        assert_eq!(container.count_where(|v| v != 0), 1);
        assert!(!container.is_uniform());
    }
}
