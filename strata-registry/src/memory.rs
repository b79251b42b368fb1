use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{
    BlockRegistry, RegistryError, RegistryExt,
    block::{BlockDescriptor, BlockStateId, Properties, state_key},
};

/// Block data version written by recent Bedrock releases (1.18.10).
pub const DEFAULT_BLOCK_VERSION: i32 = 17_959_425;

/// An in-memory block registry.
///
/// The first state registered for a block name becomes its default unless a
/// later entry is registered with [`MemoryRegistry::register_default`].
pub struct MemoryRegistry {
    by_id: FxHashMap<BlockStateId, BlockDescriptor>,
    by_state: FxHashMap<String, BlockStateId>,
    defaults: FxHashMap<String, BlockStateId>,
    block_version: i32,
    allows_registering: bool,
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default = "default_block_version")]
    block_version: i32,
    states: Vec<StateEntry>,
}

#[derive(Deserialize)]
struct StateEntry {
    #[serde(flatten)]
    descriptor: BlockDescriptor,
    #[serde(default)]
    default: bool,
}

const fn default_block_version() -> i32 {
    DEFAULT_BLOCK_VERSION
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: FxHashMap::default(),
            by_state: FxHashMap::default(),
            defaults: FxHashMap::default(),
            block_version: DEFAULT_BLOCK_VERSION,
            allows_registering: true,
        }
    }

    /// Overrides the block data version.
    pub fn set_block_version(&mut self, version: i32) {
        self.block_version = version;
    }

    /// Registers a block state.
    pub fn register(&mut self, descriptor: BlockDescriptor) -> Result<(), RegistryError> {
        self.insert(descriptor, false)
    }

    /// Registers a block state and makes it the default for its name.
    pub fn register_default(&mut self, descriptor: BlockDescriptor) -> Result<(), RegistryError> {
        self.insert(descriptor, true)
    }

    fn insert(&mut self, descriptor: BlockDescriptor, is_default: bool) -> Result<(), RegistryError> {
        if !self.allows_registering {
            return Err(RegistryError::Frozen(descriptor.state_key()));
        }
        if self.by_id.contains_key(&descriptor.state_id) {
            return Err(RegistryError::DuplicateState(descriptor.state_id.0));
        }
        if is_default {
            self.defaults.insert(descriptor.name.clone(), descriptor.state_id);
        } else {
            self.defaults
                .entry(descriptor.name.clone())
                .or_insert(descriptor.state_id);
        }
        self.by_state.insert(descriptor.state_key(), descriptor.state_id);
        self.by_id.insert(descriptor.state_id, descriptor);
        Ok(())
    }

    /// Builds a frozen registry from a JSON document of the form
    /// `{"block_version": 17959425, "states": [{"state_id": 0, "name": "minecraft:air"}]}`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        registry.block_version = file.block_version;
        for entry in file.states {
            registry.insert(entry.descriptor, entry.default)?;
        }
        registry.freeze();
        log::debug!("loaded {} block states", registry.len());
        Ok(registry)
    }

    /// Number of registered states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl RegistryExt for MemoryRegistry {
    fn freeze(&mut self) {
        self.allows_registering = false;
    }
}

impl BlockRegistry for MemoryRegistry {
    fn describe(&self, id: BlockStateId) -> Option<&BlockDescriptor> {
        self.by_id.get(&id)
    }

    fn state_id(&self, name: &str, properties: &Properties) -> Option<BlockStateId> {
        self.by_state.get(&state_key(name, properties)).copied()
    }

    fn default_state(&self, name: &str) -> Option<BlockStateId> {
        self.defaults.get(name).copied()
    }

    fn block_version(&self) -> i32 {
        self.block_version
    }
}
