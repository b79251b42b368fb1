//! The error type shared by every chunk codec.

use std::{fmt::Display, io};

use strata_registry::RegistryError;
use strata_utils::{BitArrayError, nbt::NbtError};
use thiserror::Error;

/// Errors raised by chunk storage and the chunk codecs.
///
/// Reads outside the world height are not errors; they return defaults.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A container or array was created with an invalid shape.
    #[error("invalid construction: {0}")]
    Construction(String),
    /// A value does not fit the declared bit width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOverflow {
        /// The rejected value.
        value: u64,
        /// The available width.
        bits: u8,
    },
    /// An index outside a storage primitive's capacity.
    #[error("index {index} is outside capacity {capacity}")]
    Bounds {
        /// The rejected index.
        index: usize,
        /// The capacity of the storage.
        capacity: usize,
    },
    /// A write to a height outside the column.
    #[error("y={y} is outside the world height {min_y}..{max_y}")]
    OutOfWorld {
        /// The rejected height.
        y: i32,
        /// Lowest valid height.
        min_y: i32,
        /// One past the highest valid height.
        max_y: i32,
    },
    /// Malformed input data.
    #[error("failed to decode {field}: {reason}")]
    Decode {
        /// Dotted path of the field being decoded, e.g. `section[3].palette_len`.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A format version this crate does not implement.
    #[error("unsupported {kind} {version}")]
    UnsupportedFormat {
        /// What kind of format was rejected.
        kind: &'static str,
        /// The rejected version.
        version: String,
    },
    /// A block state the registry cannot describe.
    #[error("block state {0} is not registered")]
    UnknownState(u32),
    /// A registry lookup or load failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A JSON snapshot could not be read or written.
    #[error("json snapshot: {0}")]
    Json(#[from] serde_json::Error),
    /// The column configuration is invalid.
    #[error("invalid column config: {0}")]
    Config(String),
}

impl ChunkError {
    /// Builds a decode error for `field`.
    pub fn decode(field: impl Into<String>, reason: impl Display) -> Self {
        Self::Decode {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Prefixes the field path of a decode error with `parent`.
    #[must_use]
    pub fn within(self, parent: &str) -> Self {
        match self {
            Self::Decode { field, reason } => Self::Decode {
                field: if field.is_empty() {
                    parent.to_owned()
                } else {
                    format!("{parent}.{field}")
                },
                reason,
            },
            other => other,
        }
    }
}

impl From<BitArrayError> for ChunkError {
    fn from(err: BitArrayError) -> Self {
        match err {
            BitArrayError::InvalidBitsPerValue { .. } | BitArrayError::InvalidCapacity => {
                Self::Construction(err.to_string())
            }
            BitArrayError::IndexOutOfBounds { index, capacity } => Self::Bounds { index, capacity },
            BitArrayError::ValueDoesNotFit { value, bits } => Self::ValueOverflow { value, bits },
            BitArrayError::WordCountMismatch { .. } => Self::decode("", err),
            BitArrayError::Io(io) => Self::decode("", io),
        }
    }
}

impl From<io::Error> for ChunkError {
    fn from(err: io::Error) -> Self {
        Self::decode("", err)
    }
}

impl From<NbtError> for ChunkError {
    fn from(err: NbtError) -> Self {
        Self::decode("nbt", err)
    }
}

/// Attaches a field name to errors raised while decoding.
pub trait DecodeContext<T> {
    /// Names the field that failed, nesting any path the error already has.
    fn field(self, name: &str) -> Result<T, ChunkError>;
}

impl<T, E: Into<ChunkError>> DecodeContext<T> for Result<T, E> {
    fn field(self, name: &str) -> Result<T, ChunkError> {
        self.map_err(|err| err.into().within(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_paths_nest() {
        let inner: Result<(), io::Error> = Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        let err = inner.field("palette_len").field("layer[1]").field("section[3]").unwrap_err();
        match err {
            ChunkError::Decode { field, .. } => assert_eq!(field, "section[3].layer[1].palette_len"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_non_decode_errors_pass_through() {
        let err = ChunkError::ValueOverflow { value: 9, bits: 2 }.within("section[0]");
        assert!(matches!(err, ChunkError::ValueOverflow { value: 9, bits: 2 }));
    }
}
