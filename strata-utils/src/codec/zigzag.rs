use std::io::{Read, Result, Write};

use super::VarUInt;
use crate::serial::{ReadFrom, WriteTo};

/// A signed 32-bit integer zig-zag encoded into a [`VarUInt`].
///
/// Bedrock uses this for runtime ids, palette sizes and network NBT ints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ZigZagVarInt(pub i32);

impl ZigZagVarInt {
    /// Maps a signed value onto the unsigned zig-zag space.
    #[must_use]
    pub const fn encode(value: i32) -> u32 {
        ((value << 1) ^ (value >> 31)) as u32
    }

    /// Inverse of [`ZigZagVarInt::encode`].
    #[must_use]
    pub const fn decode(value: u32) -> i32 {
        ((value >> 1) as i32) ^ -((value & 1) as i32)
    }
}

impl ReadFrom for ZigZagVarInt {
    fn read(data: &mut impl Read) -> Result<Self> {
        Ok(Self(Self::decode(VarUInt::read(data)?.0)))
    }
}

impl WriteTo for ZigZagVarInt {
    fn write(&self, writer: &mut impl Write) -> Result<()> {
        VarUInt(Self::encode(self.0)).write(writer)
    }
}
