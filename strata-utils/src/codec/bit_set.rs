use std::io::{Read, Result, Write};

use serde::{Deserialize, Serialize};

use crate::serial::{PrefixedRead, PrefixedWrite, ReadFrom, WriteTo};

use super::VarInt;

/// A growable bit set backed by `u64` words, in the layout of Java's
/// `BitSet.toLongArray()`.
///
/// Trailing zero words carry no bits, so sets that differ only in them are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitSet(pub Box<[u64]>);

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed() == other.trimmed()
    }
}

impl Eq for BitSet {}

impl BitSet {
    fn trimmed(&self) -> &[u64] {
        let len = self.0.iter().rposition(|&word| word != 0).map_or(0, |last| last + 1);
        &self.0[..len]
    }

    /// Creates an all-zero set able to hold `bits` bits without growing.
    #[must_use]
    pub fn with_len(bits: usize) -> Self {
        Self(vec![0; bits.div_ceil(64)].into_boxed_slice())
    }

    /// Creates a set from the low bits of a 32-bit mask, as used by the
    /// pre-1.17 protocol.
    #[must_use]
    pub fn from_u32(mask: u32) -> Self {
        Self(vec![u64::from(mask)].into_boxed_slice())
    }

    /// Sets the bit at the given index, growing the backing storage if needed.
    pub fn set(&mut self, index: usize, value: bool) {
        let u64_index = index / 64;
        let bit_index = index % 64;

        if u64_index >= self.0.len() {
            if !value {
                return;
            }
            let mut words = self.0.to_vec();
            words.resize(u64_index + 1, 0);
            self.0 = words.into_boxed_slice();
        }

        if value {
            self.0[u64_index] |= 1_u64 << bit_index;
        } else {
            self.0[u64_index] &= !(1_u64 << bit_index);
        }
    }

    /// Returns the bit at the given index; bits past the end are unset.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.0
            .get(index / 64)
            .is_some_and(|&word| word & (1_u64 << (index % 64)) != 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&word| word == 0)
    }

    /// Iterates over the indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(word_index, &word)| {
            (0..64_usize)
                .filter(move |&bit| word & (1_u64 << bit) != 0)
                .map(move |bit| word_index * 64 + bit)
        })
    }

    /// The low 32 bits, for protocols that send the mask as a single VarInt.
    #[must_use]
    pub fn low_u32(&self) -> u32 {
        self.0.first().map_or(0, |&word| word as u32)
    }
}

#[allow(missing_docs)]
impl ReadFrom for BitSet {
    fn read(data: &mut impl Read) -> Result<Self> {
        Ok(Self(Vec::read_prefixed::<VarInt>(data)?.into_boxed_slice()))
    }
}

#[allow(missing_docs)]
impl WriteTo for BitSet {
    fn write(&self, writer: &mut impl Write) -> Result<()> {
        // Trailing zero words are dropped, as Java's BitSet.toLongArray() does.
        self.trimmed().write_prefixed::<VarInt>(writer)
    }
}
