//! Variable-length integer codecs and the network bit set.

mod bit_set;
mod var_int;
mod var_uint;
mod zigzag;

pub use bit_set::BitSet;
pub use var_int::VarInt;
pub use var_uint::VarUInt;
pub use zigzag::ZigZagVarInt;
