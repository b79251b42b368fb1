//! Fixed-capacity arrays of N-bit unsigned values packed into machine words.
//!
//! Two physical layouts exist because protocol revisions pack bits differently:
//!
//! * [`BitLayout::Spanning`] treats the words as one continuous bit stream, so a
//!   value may straddle two adjacent words (Java 1.9 to 1.15).
//! * [`BitLayout::Padded`] stores `W::BITS / bits` whole values per word and
//!   leaves the remaining high bits zero (Java 1.16+, Bedrock).
//!
//! Within a word, value `n` occupies the bits starting at `n * bits` counted
//! from the least significant bit.

use std::{
    fmt::Debug,
    io::{self, Read, Write},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors raised by [`BitArray`] construction and mutation.
#[derive(Debug, Error)]
pub enum BitArrayError {
    /// The requested width is zero or wider than the backing word.
    #[error("bits per value must be in 1..={max}, got {bits}")]
    InvalidBitsPerValue {
        /// The rejected width.
        bits: u8,
        /// The widest value the word type can hold.
        max: u8,
    },
    /// A zero-capacity array was requested.
    #[error("bit array capacity must be non-zero")]
    InvalidCapacity,
    /// An index at or past the capacity was accessed.
    #[error("index {index} is outside capacity {capacity}")]
    IndexOutOfBounds {
        /// The rejected index.
        index: usize,
        /// The array capacity.
        capacity: usize,
    },
    /// A value needs more bits than the array provides.
    #[error("value {value} does not fit in {bits} bits")]
    ValueDoesNotFit {
        /// The rejected value.
        value: u64,
        /// The available width.
        bits: u8,
    },
    /// A word buffer of the wrong length was supplied.
    #[error("expected {expected} words, got {actual}")]
    WordCountMismatch {
        /// Words required by width, capacity and layout.
        expected: usize,
        /// Words supplied.
        actual: usize,
    },
    /// The underlying reader or writer failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// How values are laid out across words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitLayout {
    /// Values may cross word boundaries.
    Spanning,
    /// Each word holds only whole values; leftover bits are zero padding.
    Padded,
}

/// Byte order of each word on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Most significant byte first (Java).
    Big,
    /// Least significant byte first (Bedrock).
    Little,
}

/// A backing word for [`BitArray`].
pub trait Word: Copy + Default + Eq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Width of the word in bits.
    const BITS: u8;

    /// Truncates a `u64` into this word.
    fn from_u64(value: u64) -> Self;

    /// Widens this word into a `u64`.
    fn to_u64(self) -> u64;

    /// Reads one word in the given byte order.
    fn read_word(reader: &mut impl Read, endian: Endian) -> io::Result<Self>;

    /// Writes this word in the given byte order.
    fn write_word(self, writer: &mut impl Write, endian: Endian) -> io::Result<()>;
}

macro_rules! impl_word {
    ($ty:ty) => {
        impl Word for $ty {
            const BITS: u8 = <$ty>::BITS as u8;

            #[inline]
            fn from_u64(value: u64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_u64(self) -> u64 {
                u64::from(self)
            }

            fn read_word(reader: &mut impl Read, endian: Endian) -> io::Result<Self> {
                let mut buf = [0; size_of::<$ty>()];
                reader.read_exact(&mut buf)?;
                Ok(match endian {
                    Endian::Big => <$ty>::from_be_bytes(buf),
                    Endian::Little => <$ty>::from_le_bytes(buf),
                })
            }

            fn write_word(self, writer: &mut impl Write, endian: Endian) -> io::Result<()> {
                match endian {
                    Endian::Big => writer.write_all(&self.to_be_bytes()),
                    Endian::Little => writer.write_all(&self.to_le_bytes()),
                }
            }
        }
    };
}

impl_word!(u32);
impl_word!(u64);

/// Number of bits needed to represent `value` (0 for 0).
#[must_use]
pub const fn needed_bits(value: u64) -> u8 {
    (u64::BITS - value.leading_zeros()) as u8
}

/// Number of bits needed to index a palette of `len` entries, at least 1.
#[must_use]
pub const fn bits_for_palette_len(len: usize) -> u8 {
    if len <= 2 {
        1
    } else {
        needed_bits(len as u64 - 1)
    }
}

/// Largest value representable in `bits` bits.
#[must_use]
#[inline]
pub const fn value_mask(bits: u8) -> u64 {
    if bits >= 64 { u64::MAX } else { (1 << bits) - 1 }
}

/// A fixed-capacity array of `bits_per_value`-wide unsigned values.
///
/// The array never changes width in place: [`BitArray::resize_to`] builds a
/// new array and the owner swaps it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BitArrayRepr<W>", into = "BitArrayRepr<W>", bound = "")]
pub struct BitArray<W: Word> {
    bits_per_value: u8,
    capacity: usize,
    layout: BitLayout,
    words: Vec<W>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "W: Word")]
struct BitArrayRepr<W> {
    bits_per_value: u8,
    capacity: usize,
    layout: BitLayout,
    words: Vec<W>,
}

impl<W: Word> TryFrom<BitArrayRepr<W>> for BitArray<W> {
    type Error = BitArrayError;

    fn try_from(repr: BitArrayRepr<W>) -> Result<Self, Self::Error> {
        Self::from_words(repr.bits_per_value, repr.capacity, repr.layout, repr.words)
    }
}

impl<W: Word> From<BitArray<W>> for BitArrayRepr<W> {
    fn from(array: BitArray<W>) -> Self {
        Self {
            bits_per_value: array.bits_per_value,
            capacity: array.capacity,
            layout: array.layout,
            words: array.words,
        }
    }
}

impl<W: Word> BitArray<W> {
    /// Creates a zero-filled array.
    pub fn new(bits_per_value: u8, capacity: usize, layout: BitLayout) -> Result<Self, BitArrayError> {
        Self::validate_shape(bits_per_value, capacity)?;
        Ok(Self {
            bits_per_value,
            capacity,
            layout,
            words: vec![W::default(); Self::word_count_for(bits_per_value, capacity, layout)],
        })
    }

    /// Wraps existing words, checking that their count matches the shape.
    pub fn from_words(
        bits_per_value: u8,
        capacity: usize,
        layout: BitLayout,
        words: Vec<W>,
    ) -> Result<Self, BitArrayError> {
        Self::validate_shape(bits_per_value, capacity)?;
        let expected = Self::word_count_for(bits_per_value, capacity, layout);
        if words.len() != expected {
            return Err(BitArrayError::WordCountMismatch {
                expected,
                actual: words.len(),
            });
        }
        Ok(Self {
            bits_per_value,
            capacity,
            layout,
            words,
        })
    }

    fn validate_shape(bits_per_value: u8, capacity: usize) -> Result<(), BitArrayError> {
        if bits_per_value == 0 || bits_per_value > W::BITS {
            return Err(BitArrayError::InvalidBitsPerValue {
                bits: bits_per_value,
                max: W::BITS,
            });
        }
        if capacity == 0 {
            return Err(BitArrayError::InvalidCapacity);
        }
        Ok(())
    }

    /// Number of words needed for `capacity` values of `bits_per_value` bits.
    ///
    /// `bits_per_value` must be in `1..=W::BITS`.
    #[must_use]
    pub fn word_count_for(bits_per_value: u8, capacity: usize, layout: BitLayout) -> usize {
        let word_bits = usize::from(W::BITS);
        let bits = usize::from(bits_per_value);
        match layout {
            BitLayout::Spanning => (capacity * bits).div_ceil(word_bits),
            BitLayout::Padded => capacity.div_ceil(word_bits / bits),
        }
    }

    /// Reads `word_count_for(..)` words from `reader`.
    pub fn read_from(
        reader: &mut impl Read,
        bits_per_value: u8,
        capacity: usize,
        layout: BitLayout,
        endian: Endian,
    ) -> Result<Self, BitArrayError> {
        Self::validate_shape(bits_per_value, capacity)?;
        let count = Self::word_count_for(bits_per_value, capacity, layout);
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(W::read_word(reader, endian)?);
        }
        Ok(Self {
            bits_per_value,
            capacity,
            layout,
            words,
        })
    }

    /// Writes every word in the given byte order, without any length prefix.
    pub fn write_to(&self, writer: &mut impl Write, endian: Endian) -> io::Result<()> {
        for &word in &self.words {
            word.write_word(writer, endian)?;
        }
        Ok(())
    }

    /// Width of each value.
    #[must_use]
    pub fn bits_per_value(&self) -> u8 {
        self.bits_per_value
    }

    /// Number of values the array holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The packing layout.
    #[must_use]
    pub fn layout(&self) -> BitLayout {
        self.layout
    }

    /// The raw backing words.
    #[must_use]
    pub fn words(&self) -> &[W] {
        &self.words
    }

    /// Largest value that fits in one slot.
    #[must_use]
    pub fn max_value(&self) -> u64 {
        value_mask(self.bits_per_value)
    }

    /// Returns the word index and bit offset where `index` starts.
    #[inline]
    fn locate(&self, index: usize) -> (usize, u32) {
        let word_bits = usize::from(W::BITS);
        let bits = usize::from(self.bits_per_value);
        match self.layout {
            BitLayout::Spanning => {
                let bit = index * bits;
                (bit / word_bits, (bit % word_bits) as u32)
            }
            BitLayout::Padded => {
                let per_word = word_bits / bits;
                (index / per_word, ((index % per_word) * bits) as u32)
            }
        }
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    /// If `index >= capacity`. Out-of-range indices inside a storage
    /// primitive are a caller bug, like slice indexing.
    #[must_use]
    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        assert!(
            index < self.capacity,
            "bit array index {index} out of capacity {}",
            self.capacity
        );
        self.get_unchecked_index(index)
    }

    /// Returns the value at `index`, or an error if it is out of range.
    pub fn try_get(&self, index: usize) -> Result<u64, BitArrayError> {
        if index >= self.capacity {
            return Err(BitArrayError::IndexOutOfBounds {
                index,
                capacity: self.capacity,
            });
        }
        Ok(self.get_unchecked_index(index))
    }

    #[inline]
    fn get_unchecked_index(&self, index: usize) -> u64 {
        let mask = value_mask(self.bits_per_value);
        let (word_index, offset) = self.locate(index);
        let low = self.words[word_index].to_u64() >> offset;
        let end = offset + u32::from(self.bits_per_value);
        if end <= u32::from(W::BITS) {
            low & mask
        } else {
            let high = self.words[word_index + 1].to_u64() << (u32::from(W::BITS) - offset);
            (low | high) & mask
        }
    }

    /// Stores `value` at `index`.
    pub fn set(&mut self, index: usize, value: u64) -> Result<(), BitArrayError> {
        if index >= self.capacity {
            return Err(BitArrayError::IndexOutOfBounds {
                index,
                capacity: self.capacity,
            });
        }
        if value > value_mask(self.bits_per_value) {
            return Err(BitArrayError::ValueDoesNotFit {
                value,
                bits: self.bits_per_value,
            });
        }
        self.set_unchecked_index(index, value);
        Ok(())
    }

    #[inline]
    fn set_unchecked_index(&mut self, index: usize, value: u64) {
        let mask = value_mask(self.bits_per_value);
        let word_bits = u32::from(W::BITS);
        let (word_index, offset) = self.locate(index);

        let word = self.words[word_index].to_u64();
        let word = (word & !(mask << offset)) | (value << offset);
        self.words[word_index] = W::from_u64(word);

        let end = offset + u32::from(self.bits_per_value);
        if end > word_bits {
            let spill = (end - word_bits) as u8;
            let next = self.words[word_index + 1].to_u64();
            let next = (next & !value_mask(spill)) | (value >> (word_bits - offset));
            self.words[word_index + 1] = W::from_u64(next);
        }
    }

    /// Re-encodes every value into a new array of `bits_per_value` bits.
    ///
    /// Fails with [`BitArrayError::ValueDoesNotFit`] if any stored value needs
    /// more bits than the target width.
    pub fn resize_to(&self, bits_per_value: u8) -> Result<Self, BitArrayError> {
        let mut resized = Self::new(bits_per_value, self.capacity, self.layout)?;
        let mask = value_mask(bits_per_value);
        for index in 0..self.capacity {
            let value = self.get_unchecked_index(index);
            if value > mask {
                return Err(BitArrayError::ValueDoesNotFit {
                    value,
                    bits: bits_per_value,
                });
            }
            resized.set_unchecked_index(index, value);
        }
        Ok(resized)
    }

    /// Iterates over all values in index order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.capacity).map(|index| self.get_unchecked_index(index))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(
            BitArray::<u64>::new(0, 4096, BitLayout::Spanning),
            Err(BitArrayError::InvalidBitsPerValue { bits: 0, max: 64 })
        ));
        assert!(matches!(
            BitArray::<u32>::new(33, 4096, BitLayout::Padded),
            Err(BitArrayError::InvalidBitsPerValue { bits: 33, max: 32 })
        ));
        assert!(matches!(
            BitArray::<u64>::new(4, 0, BitLayout::Spanning),
            Err(BitArrayError::InvalidCapacity)
        ));
        assert!(BitArray::<u64>::new(64, 16, BitLayout::Spanning).is_ok());
    }

    #[test]
    fn test_word_counts() {
        assert_eq!(BitArray::<u64>::word_count_for(4, 4096, BitLayout::Spanning), 256);
        assert_eq!(BitArray::<u64>::word_count_for(5, 4096, BitLayout::Spanning), 320);
        // 12 five-bit values per long, 4 bits of padding each.
        assert_eq!(BitArray::<u64>::word_count_for(5, 4096, BitLayout::Padded), 342);
        assert_eq!(BitArray::<u64>::word_count_for(15, 4096, BitLayout::Padded), 1024);
        assert_eq!(BitArray::<u32>::word_count_for(3, 4096, BitLayout::Padded), 410);
        assert_eq!(BitArray::<u32>::word_count_for(16, 4096, BitLayout::Padded), 2048);
    }

    #[test]
    fn test_five_bit_fill() {
        let mut array = BitArray::<u64>::new(5, 4096, BitLayout::Spanning).unwrap();
        for i in 0..4096 {
            array.set(i, 8).unwrap();
        }
        for i in 0..4096 {
            assert_eq!(array.get(i), 8, "index {i}");
        }
    }

    #[test]
    fn test_nibbles_do_not_touch_sign_bit() {
        let mut array = BitArray::<u64>::new(4, 4096, BitLayout::Spanning).unwrap();
        for i in 0..8 {
            array.set(i, 15).unwrap();
        }
        assert_eq!(array.words()[0], 0xFFFF_FFFF);
        assert!((array.words()[0] as i64) >= 0);
        assert_eq!(array.words()[1], 0);
    }

    #[test]
    fn test_spanning_value_crosses_words() {
        let mut array = BitArray::<u64>::new(5, 32, BitLayout::Spanning).unwrap();
        // Index 12 occupies bits 60..65: four bits in word 0, one in word 1.
        array.set(12, 0b10110).unwrap();
        array.set(11, 0b11111).unwrap();
        array.set(13, 0b00001).unwrap();
        assert_eq!(array.get(12), 0b10110);
        assert_eq!(array.get(11), 0b11111);
        assert_eq!(array.get(13), 0b00001);
        assert_eq!(array.words()[0] >> 60, 0b0110);
        assert_eq!(array.words()[1] & 1, 1);

        array.set(12, 0).unwrap();
        assert_eq!(array.get(12), 0);
        assert_eq!(array.get(11), 0b11111);
        assert_eq!(array.get(13), 0b00001);
    }

    #[test]
    fn test_padded_leaves_high_bits_clear() {
        let mut array = BitArray::<u64>::new(5, 24, BitLayout::Padded).unwrap();
        for i in 0..24 {
            array.set(i, 31).unwrap();
        }
        assert_eq!(array.words().len(), 2);
        assert_eq!(array.words()[0], (1 << 60) - 1);
        assert_eq!(array.get(12), 31);
    }

    #[test]
    fn test_thirty_two_bit_words() {
        let mut array = BitArray::<u32>::new(3, 4096, BitLayout::Padded).unwrap();
        array.set(9, 5).unwrap();
        array.set(10, 6).unwrap();
        assert_eq!(array.words()[0], 5 << 27);
        assert_eq!(array.words()[1], 6);

        let mut spanning = BitArray::<u32>::new(7, 100, BitLayout::Spanning).unwrap();
        for i in 0..100 {
            spanning.set(i, (i as u64 * 37) % 128).unwrap();
        }
        for i in 0..100 {
            assert_eq!(spanning.get(i), (i as u64 * 37) % 128);
        }
    }

    #[test]
    fn test_full_width_values() {
        let mut array = BitArray::<u64>::new(64, 4, BitLayout::Spanning).unwrap();
        array.set(2, u64::MAX).unwrap();
        assert_eq!(array.get(2), u64::MAX);
        assert_eq!(array.get(1), 0);
    }

    #[test]
    fn test_set_validates() {
        let mut array = BitArray::<u64>::new(4, 16, BitLayout::Spanning).unwrap();
        assert!(matches!(
            array.set(16, 1),
            Err(BitArrayError::IndexOutOfBounds { index: 16, capacity: 16 })
        ));
        assert!(matches!(
            array.set(0, 16),
            Err(BitArrayError::ValueDoesNotFit { value: 16, bits: 4 })
        ));
        assert!(array.try_get(16).is_err());
    }

    #[test]
    fn test_resize_preserves_or_rejects() {
        let mut array = BitArray::<u64>::new(6, 4096, BitLayout::Padded).unwrap();
        for i in 0..4096 {
            array.set(i, (i % 40) as u64).unwrap();
        }

        let wider = array.resize_to(9).unwrap();
        assert_eq!(wider.bits_per_value(), 9);
        assert!(wider.iter().eq(array.iter()));

        assert!(matches!(
            array.resize_to(5),
            Err(BitArrayError::ValueDoesNotFit { bits: 5, .. })
        ));

        let narrow = array.resize_to(6).unwrap();
        assert_eq!(narrow, array);
    }

    #[test]
    fn test_byte_order() {
        let mut array = BitArray::<u64>::new(4, 16, BitLayout::Spanning).unwrap();
        array.set(0, 1).unwrap();
        array.set(15, 0xA).unwrap();
        let mut buf = Vec::new();
        array.write_to(&mut buf, Endian::Big).unwrap();
        assert_eq!(buf, [0xA0, 0, 0, 0, 0, 0, 0, 0x01]);

        let read =
            BitArray::<u64>::read_from(&mut Cursor::new(&buf), 4, 16, BitLayout::Spanning, Endian::Big)
                .unwrap();
        assert_eq!(read, array);

        let mut le = BitArray::<u32>::new(8, 4, BitLayout::Padded).unwrap();
        le.set(0, 0x11).unwrap();
        le.set(3, 0x44).unwrap();
        let mut buf = Vec::new();
        le.write_to(&mut buf, Endian::Little).unwrap();
        assert_eq!(buf, [0x11, 0, 0, 0x44]);
    }

    #[test]
    fn test_read_short_buffer_fails() {
        let result =
            BitArray::<u64>::read_from(&mut Cursor::new([0_u8; 12]), 4, 32, BitLayout::Spanning, Endian::Big);
        assert!(matches!(result, Err(BitArrayError::Io(_))));
    }

    #[test]
    fn test_json_snapshot_is_validated() {
        let mut array = BitArray::<u64>::new(5, 64, BitLayout::Padded).unwrap();
        array.set(63, 17).unwrap();
        let json = serde_json::to_string(&array).unwrap();
        let back: BitArray<u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, array);

        let broken = r#"{"bits_per_value":5,"capacity":64,"layout":"Padded","words":[0]}"#;
        assert!(serde_json::from_str::<BitArray<u64>>(broken).is_err());
    }

    #[test]
    fn test_needed_bits() {
        assert_eq!(needed_bits(0), 0);
        assert_eq!(needed_bits(1), 1);
        assert_eq!(needed_bits(255), 8);
        assert_eq!(needed_bits(256), 9);
        assert_eq!(bits_for_palette_len(1), 1);
        assert_eq!(bits_for_palette_len(2), 1);
        assert_eq!(bits_for_palette_len(3), 2);
        assert_eq!(bits_for_palette_len(16), 4);
        assert_eq!(bits_for_palette_len(17), 5);
    }
}
