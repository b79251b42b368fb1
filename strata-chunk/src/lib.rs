//! Chunk column storage and codecs for Java and Bedrock edition.
//!
//! A column stores block states, biomes, light and block entities for one
//! 16-wide vertical slice of the world. Columns are edited through
//! [`ChunkColumn`], and each edition module converts them to and from the
//! byte layouts of the game versions it supports.

pub mod bedrock;
pub mod block_entities;
pub mod column;
pub mod config;
pub mod error;
pub mod java;
pub mod light_storage;
pub mod palette;
pub mod pos;

pub use bedrock::{BedrockColumn, BedrockOptions, BedrockVersion};
pub use block_entities::BlockEntities;
pub use column::{AnyColumn, ChunkColumn, Edition};
pub use config::ColumnConfig;
pub use error::{ChunkError, DecodeContext};
pub use java::{JavaColumn, JavaOptions, JavaVersion};
pub use light_storage::LightStorage;
pub use pos::{Block, BlockPos};
