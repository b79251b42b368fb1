//! Read/write traits for wire primitives.
//!
//! `ReadFrom`/`WriteTo` use the Java network byte order (big-endian). Bedrock
//! data is little-endian and goes through [`LittleEndianRead`] and
//! [`LittleEndianWrite`] instead.

use std::io::{Error, Read, Result, Write};

/// A value that can be read from a byte stream.
pub trait ReadFrom: Sized {
    /// Reads one value.
    fn read(data: &mut impl Read) -> Result<Self>;
}

/// A value that can be written to a byte stream.
pub trait WriteTo {
    /// Writes this value.
    fn write(&self, writer: &mut impl Write) -> Result<()>;
}

/// A collection read with a length prefix of type `P`.
pub trait PrefixedRead: Sized {
    /// Reads the prefix, then that many elements.
    fn read_prefixed<P: ReadFrom + TryInto<usize>>(data: &mut impl Read) -> Result<Self>;
}

/// A collection written with a length prefix of type `P`.
pub trait PrefixedWrite {
    /// Writes the length as `P`, then every element.
    fn write_prefixed<P: WriteTo + TryFrom<usize>>(&self, writer: &mut impl Write) -> Result<()>;
}

macro_rules! impl_be_primitive {
    ($($ty:ty),*) => {
        $(
            impl ReadFrom for $ty {
                fn read(data: &mut impl Read) -> Result<Self> {
                    let mut buf = [0; size_of::<Self>()];
                    data.read_exact(&mut buf)?;
                    Ok(Self::from_be_bytes(buf))
                }
            }

            impl WriteTo for $ty {
                fn write(&self, writer: &mut impl Write) -> Result<()> {
                    writer.write_all(&self.to_be_bytes())
                }
            }
        )*
    };
}

impl_be_primitive!(u8, i8, u16, i16, u32, i32, u64, i64);

impl ReadFrom for bool {
    fn read(data: &mut impl Read) -> Result<Self> {
        Ok(u8::read(data)? != 0)
    }
}

impl WriteTo for bool {
    fn write(&self, writer: &mut impl Write) -> Result<()> {
        u8::from(*self).write(writer)
    }
}

impl<T: ReadFrom> PrefixedRead for Vec<T> {
    fn read_prefixed<P: ReadFrom + TryInto<usize>>(data: &mut impl Read) -> Result<Self> {
        let len: usize = P::read(data)?
            .try_into()
            .map_err(|_| Error::other("length prefix is not a valid usize"))?;
        // The prefix is untrusted input, so the upfront reservation is capped.
        let mut items = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            items.push(T::read(data)?);
        }
        Ok(items)
    }
}

impl<T: WriteTo> PrefixedWrite for [T] {
    fn write_prefixed<P: WriteTo + TryFrom<usize>>(&self, writer: &mut impl Write) -> Result<()> {
        P::try_from(self.len())
            .map_err(|_| Error::other("length does not fit the prefix type"))?
            .write(writer)?;
        for item in self {
            item.write(writer)?;
        }
        Ok(())
    }
}

/// Little-endian reads used by the Bedrock formats.
pub trait LittleEndianRead: Read {
    /// Reads a single byte.
    fn read_u8_le(&mut self) -> Result<u8> {
        let mut buf = [0; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian `i16`.
    fn read_i16_le(&mut self) -> Result<i16> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Reads a little-endian `u16`.
    fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian `i32`.
    fn read_i32_le(&mut self) -> Result<i32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a little-endian `u32`.
    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian `i64`.
    fn read_i64_le(&mut self) -> Result<i64> {
        let mut buf = [0; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads a little-endian `f32`.
    fn read_f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    /// Reads a little-endian `f64`.
    fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_i64_le()? as u64))
    }
}

impl<R: Read + ?Sized> LittleEndianRead for R {}

/// Little-endian writes used by the Bedrock formats.
pub trait LittleEndianWrite: Write {
    /// Writes a little-endian `i16`.
    fn write_i16_le(&mut self, value: i16) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u16`.
    fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `i32`.
    fn write_i32_le(&mut self, value: i32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u32`.
    fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `i64`.
    fn write_i64_le(&mut self, value: i64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `f32`.
    fn write_f32_le(&mut self, value: f32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `f64`.
    fn write_f64_le(&mut self, value: f64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }
}

impl<W: Write + ?Sized> LittleEndianWrite for W {}
