//! Low-level primitives shared by the strata crates: packed bit arrays,
//! protocol integer codecs, serial traits and a little-endian NBT codec.

pub mod bit_array;
pub mod codec;
pub mod nbt;
pub mod serial;

pub use bit_array::{
    BitArray, BitArrayError, BitLayout, Endian, Word, bits_for_palette_len, needed_bits, value_mask,
};
