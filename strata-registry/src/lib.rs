//! The block and biome registry boundary used by the chunk codecs.
//!
//! Chunk storage only ever deals in numeric state ids. When a format needs
//! names and properties (Bedrock's persisted palettes) it resolves them
//! through a [`BlockRegistry`].

pub mod block;
pub mod memory;

use thiserror::Error;

pub use block::{BiomeId, BlockDescriptor, BlockStateId, PropertyValue};
pub use memory::MemoryRegistry;

/// Errors raised while building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry was frozen before the entry was added.
    #[error("cannot register {0} after the registry is frozen")]
    Frozen(String),
    /// Two descriptors share one state id.
    #[error("state id {0} is already registered")]
    DuplicateState(u32),
    /// The registry file could not be parsed.
    #[error("invalid registry file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mutation control shared by the registries.
pub trait RegistryExt {
    /// Stops accepting new entries.
    fn freeze(&mut self);
}

/// Lookup between block state ids and their structured descriptions.
pub trait BlockRegistry {
    /// Describes a state id, if it is known.
    fn describe(&self, id: BlockStateId) -> Option<&BlockDescriptor>;

    /// Finds the state id for a block name and exact property set.
    fn state_id(&self, name: &str, properties: &block::Properties) -> Option<BlockStateId>;

    /// The default state of a block name.
    fn default_state(&self, name: &str) -> Option<BlockStateId>;

    /// The state id of air, falling back to 0.
    fn air(&self) -> BlockStateId {
        self.default_state(block::AIR_NAME).unwrap_or(BlockStateId::AIR)
    }

    /// The block data version written into persisted palette entries.
    fn block_version(&self) -> i32;
}
