//! Little-endian NBT, in the two flavors Bedrock uses.
//!
//! * [`NbtFlavor::LittleEndian`] is the fixed-width form found in world saves.
//! * [`NbtFlavor::NetworkLittleEndian`] replaces ints and longs with zig-zag
//!   varints and string lengths with unsigned varints.
//!
//! Compounds keep insertion order so that decoding and re-encoding a tag
//! reproduces the original bytes.

mod compound;

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec::{VarUInt, ZigZagVarInt},
    serial::{LittleEndianRead, LittleEndianWrite, ReadFrom, WriteTo},
};

pub use compound::NbtCompound;

const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// Errors raised while decoding NBT.
#[derive(Debug, Error)]
pub enum NbtError {
    /// A tag type byte outside 0..=12.
    #[error("unknown tag type {0}")]
    UnknownTag(u8),
    /// The root tag was not a compound.
    #[error("expected a compound root, found tag type {0}")]
    RootNotCompound(u8),
    /// A length prefix was negative.
    #[error("negative length {0}")]
    NegativeLength(i32),
    /// A string was not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// A string does not fit its length prefix.
    #[error("string of {0} bytes does not fit the length prefix")]
    StringTooLong(usize),
    /// Compounds or lists nested past the depth limit.
    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
    /// The underlying reader or writer failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which little-endian NBT encoding to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbtFlavor {
    /// Fixed-width little-endian, as stored on disk.
    LittleEndian,
    /// Little-endian with varint ints, longs and lengths, as sent on the network.
    NetworkLittleEndian,
}

/// A single NBT value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    /// `TAG_Byte`.
    Byte(i8),
    /// `TAG_Short`.
    Short(i16),
    /// `TAG_Int`.
    Int(i32),
    /// `TAG_Long`.
    Long(i64),
    /// `TAG_Float`.
    Float(f32),
    /// `TAG_Double`.
    Double(f64),
    /// `TAG_Byte_Array`.
    ByteArray(Vec<i8>),
    /// `TAG_String`.
    String(String),
    /// `TAG_List`; all elements share one type.
    List(Vec<Tag>),
    /// `TAG_Compound`.
    Compound(NbtCompound),
    /// `TAG_Int_Array`.
    IntArray(Vec<i32>),
    /// `TAG_Long_Array`.
    LongArray(Vec<i64>),
}

impl Tag {
    /// The on-wire type id of this tag.
    #[must_use]
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Byte(_) => TAG_BYTE,
            Self::Short(_) => TAG_SHORT,
            Self::Int(_) => TAG_INT,
            Self::Long(_) => TAG_LONG,
            Self::Float(_) => TAG_FLOAT,
            Self::Double(_) => TAG_DOUBLE,
            Self::ByteArray(_) => TAG_BYTE_ARRAY,
            Self::String(_) => TAG_STRING,
            Self::List(_) => TAG_LIST,
            Self::Compound(_) => TAG_COMPOUND,
            Self::IntArray(_) => TAG_INT_ARRAY,
            Self::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Returns the integer value of any integral tag.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a string tag.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the compound payload, if this is a compound tag.
    #[must_use]
    pub fn as_compound(&self) -> Option<&NbtCompound> {
        match self {
            Self::Compound(c) => Some(c),
            _ => None,
        }
    }
}

/// Reads a root compound and its name.
///
/// The number of bytes consumed is whatever the reader advanced; wrap the
/// input in a `Cursor` to learn it.
pub fn read_root(reader: &mut impl Read, flavor: NbtFlavor) -> Result<(String, NbtCompound), NbtError> {
    let type_id = reader.read_u8_le()?;
    if type_id != TAG_COMPOUND {
        return Err(NbtError::RootNotCompound(type_id));
    }
    let name = read_string(reader, flavor)?;
    let compound = read_compound(reader, flavor, 0)?;
    Ok((name, compound))
}

/// Writes `compound` as a named root tag.
pub fn write_root(
    writer: &mut impl Write,
    name: &str,
    compound: &NbtCompound,
    flavor: NbtFlavor,
) -> Result<(), NbtError> {
    writer.write_all(&[TAG_COMPOUND])?;
    write_string(writer, name, flavor)?;
    write_compound(writer, compound, flavor)
}

fn read_len(reader: &mut impl Read, flavor: NbtFlavor) -> Result<usize, NbtError> {
    let len = match flavor {
        NbtFlavor::LittleEndian => reader.read_i32_le()?,
        NbtFlavor::NetworkLittleEndian => ZigZagVarInt::read(reader)?.0,
    };
    usize::try_from(len).map_err(|_| NbtError::NegativeLength(len))
}

fn write_len(writer: &mut impl Write, len: usize, flavor: NbtFlavor) -> Result<(), NbtError> {
    let len = i32::try_from(len).map_err(|_| NbtError::StringTooLong(len))?;
    match flavor {
        NbtFlavor::LittleEndian => writer.write_i32_le(len)?,
        NbtFlavor::NetworkLittleEndian => ZigZagVarInt(len).write(writer)?,
    }
    Ok(())
}

fn read_string(reader: &mut impl Read, flavor: NbtFlavor) -> Result<String, NbtError> {
    let len = match flavor {
        NbtFlavor::LittleEndian => usize::from(reader.read_u16_le()?),
        NbtFlavor::NetworkLittleEndian => VarUInt::read(reader)?.0 as usize,
    };
    let mut bytes = Vec::with_capacity(len.min(u16::MAX as usize));
    reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    String::from_utf8(bytes).map_err(|_| NbtError::InvalidUtf8)
}

fn write_string(writer: &mut impl Write, value: &str, flavor: NbtFlavor) -> Result<(), NbtError> {
    match flavor {
        NbtFlavor::LittleEndian => {
            let len = u16::try_from(value.len()).map_err(|_| NbtError::StringTooLong(value.len()))?;
            writer.write_u16_le(len)?;
        }
        NbtFlavor::NetworkLittleEndian => {
            let len = u32::try_from(value.len()).map_err(|_| NbtError::StringTooLong(value.len()))?;
            VarUInt(len).write(writer)?;
        }
    }
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_int(reader: &mut impl Read, flavor: NbtFlavor) -> Result<i32, NbtError> {
    Ok(match flavor {
        NbtFlavor::LittleEndian => reader.read_i32_le()?,
        NbtFlavor::NetworkLittleEndian => ZigZagVarInt::read(reader)?.0,
    })
}

fn write_int(writer: &mut impl Write, value: i32, flavor: NbtFlavor) -> Result<(), NbtError> {
    match flavor {
        NbtFlavor::LittleEndian => writer.write_i32_le(value)?,
        NbtFlavor::NetworkLittleEndian => ZigZagVarInt(value).write(writer)?,
    }
    Ok(())
}

fn read_long(reader: &mut impl Read, flavor: NbtFlavor) -> Result<i64, NbtError> {
    match flavor {
        NbtFlavor::LittleEndian => Ok(reader.read_i64_le()?),
        NbtFlavor::NetworkLittleEndian => {
            let mut raw = 0_u64;
            for i in 0..10 {
                let byte = reader.read_u8_le()?;
                raw |= u64::from(byte & 0x7F) << (i * 7);
                if byte & 0x80 == 0 {
                    return Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64));
                }
            }
            Err(io::Error::other("VarLong is longer than 10 bytes").into())
        }
    }
}

fn write_long(writer: &mut impl Write, value: i64, flavor: NbtFlavor) -> Result<(), NbtError> {
    match flavor {
        NbtFlavor::LittleEndian => writer.write_i64_le(value)?,
        NbtFlavor::NetworkLittleEndian => {
            let mut raw = ((value << 1) ^ (value >> 63)) as u64;
            loop {
                let byte = (raw & 0x7F) as u8;
                raw >>= 7;
                if raw == 0 {
                    writer.write_all(&[byte])?;
                    break;
                }
                writer.write_all(&[byte | 0x80])?;
            }
        }
    }
    Ok(())
}

fn read_compound(reader: &mut impl Read, flavor: NbtFlavor, depth: usize) -> Result<NbtCompound, NbtError> {
    if depth >= MAX_DEPTH {
        return Err(NbtError::TooDeep);
    }
    let mut compound = NbtCompound::new();
    loop {
        let type_id = reader.read_u8_le()?;
        if type_id == TAG_END {
            return Ok(compound);
        }
        let name = read_string(reader, flavor)?;
        let tag = read_payload(reader, type_id, flavor, depth + 1)?;
        compound.push(name, tag);
    }
}

fn write_compound(writer: &mut impl Write, compound: &NbtCompound, flavor: NbtFlavor) -> Result<(), NbtError> {
    for (name, tag) in compound.iter() {
        writer.write_all(&[tag.type_id()])?;
        write_string(writer, name, flavor)?;
        write_payload(writer, tag, flavor)?;
    }
    writer.write_all(&[TAG_END])?;
    Ok(())
}

fn read_payload(reader: &mut impl Read, type_id: u8, flavor: NbtFlavor, depth: usize) -> Result<Tag, NbtError> {
    Ok(match type_id {
        TAG_BYTE => Tag::Byte(reader.read_u8_le()? as i8),
        TAG_SHORT => Tag::Short(reader.read_i16_le()?),
        TAG_INT => Tag::Int(read_int(reader, flavor)?),
        TAG_LONG => Tag::Long(read_long(reader, flavor)?),
        TAG_FLOAT => Tag::Float(reader.read_f32_le()?),
        TAG_DOUBLE => Tag::Double(reader.read_f64_le()?),
        TAG_BYTE_ARRAY => {
            let len = read_len(reader, flavor)?;
            let mut bytes = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                bytes.push(reader.read_u8_le()? as i8);
            }
            Tag::ByteArray(bytes)
        }
        TAG_STRING => Tag::String(read_string(reader, flavor)?),
        TAG_LIST => {
            if depth >= MAX_DEPTH {
                return Err(NbtError::TooDeep);
            }
            let element_type = reader.read_u8_le()?;
            let len = read_len(reader, flavor)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(read_payload(reader, element_type, flavor, depth + 1)?);
            }
            Tag::List(items)
        }
        TAG_COMPOUND => Tag::Compound(read_compound(reader, flavor, depth)?),
        TAG_INT_ARRAY => {
            let len = read_len(reader, flavor)?;
            let mut ints = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                ints.push(read_int(reader, flavor)?);
            }
            Tag::IntArray(ints)
        }
        TAG_LONG_ARRAY => {
            let len = read_len(reader, flavor)?;
            let mut longs = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                longs.push(read_long(reader, flavor)?);
            }
            Tag::LongArray(longs)
        }
        other => return Err(NbtError::UnknownTag(other)),
    })
}

fn write_payload(writer: &mut impl Write, tag: &Tag, flavor: NbtFlavor) -> Result<(), NbtError> {
    match tag {
        Tag::Byte(v) => writer.write_all(&v.to_le_bytes())?,
        Tag::Short(v) => writer.write_i16_le(*v)?,
        Tag::Int(v) => write_int(writer, *v, flavor)?,
        Tag::Long(v) => write_long(writer, *v, flavor)?,
        Tag::Float(v) => writer.write_f32_le(*v)?,
        Tag::Double(v) => writer.write_f64_le(*v)?,
        Tag::ByteArray(bytes) => {
            write_len(writer, bytes.len(), flavor)?;
            for byte in bytes {
                writer.write_all(&byte.to_le_bytes())?;
            }
        }
        Tag::String(s) => write_string(writer, s, flavor)?,
        Tag::List(items) => {
            // Empty lists are written with an end-tag element type.
            let element_type = items.first().map_or(TAG_END, Tag::type_id);
            writer.write_all(&[element_type])?;
            write_len(writer, items.len(), flavor)?;
            for item in items {
                write_payload(writer, item, flavor)?;
            }
        }
        Tag::Compound(compound) => write_compound(writer, compound, flavor)?,
        Tag::IntArray(ints) => {
            write_len(writer, ints.len(), flavor)?;
            for &int in ints {
                write_int(writer, int, flavor)?;
            }
        }
        Tag::LongArray(longs) => {
            write_len(writer, longs.len(), flavor)?;
            for &long in longs {
                write_long(writer, long, flavor)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample() -> NbtCompound {
        let mut states = NbtCompound::new();
        states.insert("stone_type", Tag::String("granite".to_owned()));
        states.insert("age", Tag::Int(-3));

        let mut root = NbtCompound::new();
        root.insert("name", Tag::String("minecraft:stone".to_owned()));
        root.insert("states", Tag::Compound(states));
        root.insert("version", Tag::Int(17_959_425));
        root.insert("ticks", Tag::Long(-9_000_000_000));
        root.insert("list", Tag::List(vec![Tag::Short(1), Tag::Short(2)]));
        root.insert("empty", Tag::List(Vec::new()));
        root.insert("ints", Tag::IntArray(vec![1, -1, 300]));
        root.insert("scale", Tag::Float(0.5));
        root
    }

    #[test]
    fn test_both_flavors_reproduce_bytes() {
        for flavor in [NbtFlavor::LittleEndian, NbtFlavor::NetworkLittleEndian] {
            let mut buf = Vec::new();
            write_root(&mut buf, "", &sample(), flavor).unwrap();
            // Trailing bytes stay unread; the cursor reports the consumed length.
            buf.extend_from_slice(&[0xAA, 0xBB]);

            let mut cursor = Cursor::new(buf.as_slice());
            let (name, compound) = read_root(&mut cursor, flavor).unwrap();
            assert_eq!(name, "");
            assert_eq!(compound, sample());
            assert_eq!(cursor.position() as usize, buf.len() - 2);

            let mut again = Vec::new();
            write_root(&mut again, "", &compound, flavor).unwrap();
            assert_eq!(again, buf[..buf.len() - 2]);
        }
    }

    #[test]
    fn test_fixed_width_layout() {
        let mut root = NbtCompound::new();
        root.insert("v", Tag::Int(1));
        let mut buf = Vec::new();
        write_root(&mut buf, "", &root, NbtFlavor::LittleEndian).unwrap();
        assert_eq!(buf, [10, 0, 0, 3, 1, 0, b'v', 1, 0, 0, 0, 0]);

        let mut net = Vec::new();
        write_root(&mut net, "", &root, NbtFlavor::NetworkLittleEndian).unwrap();
        assert_eq!(net, [10, 0, 3, 1, b'v', 2, 0]);
    }

    #[test]
    fn test_rejects_malformed() {
        let err = read_root(&mut Cursor::new([8_u8, 0, 0]), NbtFlavor::LittleEndian).unwrap_err();
        assert!(matches!(err, NbtError::RootNotCompound(8)));

        let err = read_root(&mut Cursor::new([10_u8, 0, 0, 42, 0, 0]), NbtFlavor::LittleEndian).unwrap_err();
        assert!(matches!(err, NbtError::UnknownTag(42)));

        let err = read_root(&mut Cursor::new([10_u8, 0, 0, 3, 1, 0]), NbtFlavor::LittleEndian).unwrap_err();
        assert!(matches!(err, NbtError::Io(_)));
    }
}
