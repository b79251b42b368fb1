use std::io::{Error, Read, Result, Write};

use crate::serial::{ReadFrom, WriteTo};

/// A Java protocol VarInt: a 32-bit two's complement integer in LEB128 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarInt(pub i32);

impl VarInt {
    /// The maximum number of bytes a VarInt may occupy.
    pub const MAX_SIZE: usize = 5;

    /// Returns the exact number of bytes [`WriteTo::write`] emits for `val`.
    #[must_use]
    pub fn written_size(val: i32) -> usize {
        match val {
            0 => 1,
            n => (31 - (n as u32).leading_zeros() as usize) / 7 + 1,
        }
    }
}

impl ReadFrom for VarInt {
    fn read(data: &mut impl Read) -> Result<Self> {
        let mut val = 0;
        for i in 0..Self::MAX_SIZE {
            let byte = u8::read(data)?;
            val |= (i32::from(byte) & 0x7F) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(Self(val));
            }
        }
        Err(Error::other("VarInt is longer than 5 bytes"))
    }
}

impl WriteTo for VarInt {
    fn write(&self, writer: &mut impl Write) -> Result<()> {
        let mut val = self.0 as u32;
        loop {
            let b = (val & 0x7F) as u8;
            val >>= 7;
            if val == 0 {
                b.write(writer)?;
                return Ok(());
            }
            (b | 0x80).write(writer)?;
        }
    }
}

impl From<i32> for VarInt {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = std::num::TryFromIntError;

    fn try_from(value: usize) -> std::result::Result<Self, Self::Error> {
        Ok(Self(i32::try_from(value)?))
    }
}

impl TryFrom<VarInt> for usize {
    type Error = std::num::TryFromIntError;

    fn try_from(value: VarInt) -> std::result::Result<Self, Self::Error> {
        Self::try_from(value.0)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        VarInt(value).write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(127), [0x7F]);
        assert_eq!(encode(128), [0x80, 0x01]);
        assert_eq!(encode(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encode(-1), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_written_size_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, i32::MAX, -1, i32::MIN] {
            assert_eq!(VarInt::written_size(value), encode(value).len(), "{value}");
        }
    }

    #[test]
    fn test_rejects_overlong() {
        let mut cursor = Cursor::new(vec![0xFF; 6]);
        assert!(VarInt::read(&mut cursor).is_err());
    }

    #[test]
    fn test_negative_length_is_not_a_usize() {
        assert!(usize::try_from(VarInt(-3)).is_err());
    }
}
