use std::io::{Error, Read, Result, Write};

use crate::serial::{ReadFrom, WriteTo};

/// An unsigned 32-bit LEB128 integer, used by Bedrock for string and list lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarUInt(pub u32);

impl VarUInt {
    const MAX_SIZE: usize = 5;

    /// Returns the exact number of bytes [`WriteTo::write`] emits.
    #[must_use]
    pub fn written_size(self) -> usize {
        (32 - self.0.leading_zeros() as usize).max(1).div_ceil(7)
    }
}

impl ReadFrom for VarUInt {
    fn read(data: &mut impl Read) -> Result<Self> {
        let mut val = 0;
        for i in 0..Self::MAX_SIZE {
            let byte = u8::read(data)?;
            val |= (u32::from(byte) & 0x7F) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(Self(val));
            }
        }
        Err(Error::other("VarUInt is longer than 5 bytes"))
    }
}

impl WriteTo for VarUInt {
    fn write(&self, writer: &mut impl Write) -> Result<()> {
        let mut val = self.0;
        loop {
            let mut byte = (val & 0x7F) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80;
            }
            byte.write(writer)?;
            if val == 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_size() {
        assert_eq!(VarUInt(0).written_size(), 1);
        assert_eq!(VarUInt(127).written_size(), 1);
        assert_eq!(VarUInt(128).written_size(), 2);
        assert_eq!(VarUInt(u32::MAX).written_size(), 5);

        let mut buf = Vec::new();
        VarUInt(300).write(&mut buf).unwrap();
        assert_eq!(buf, [0xAC, 0x02]);
    }
}
