use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_utils::nbt::NbtCompound;

use crate::pos::BlockPos;

/// Block entity payloads keyed by position.
///
/// The column stores the payloads but never interprets them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockEntities(FxHashMap<BlockPos, NbtCompound>);

impl BlockEntities {
    /// Stores `payload` at `pos`, returning the previous payload.
    pub fn insert(&mut self, pos: BlockPos, payload: NbtCompound) -> Option<NbtCompound> {
        self.0.insert(pos, payload)
    }

    /// The payload at `pos`.
    #[must_use]
    pub fn get(&self, pos: BlockPos) -> Option<&NbtCompound> {
        self.0.get(&pos)
    }

    /// Removes the payload at `pos`.
    pub fn remove(&mut self, pos: BlockPos) -> Option<NbtCompound> {
        self.0.remove(&pos)
    }

    /// Drops every payload.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no payload is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries ordered by position.
    #[must_use]
    pub fn sorted(&self) -> Vec<(BlockPos, &NbtCompound)> {
        let mut entries: Vec<_> = self.0.iter().map(|(&pos, payload)| (pos, payload)).collect();
        entries.sort_unstable_by_key(|&(pos, _)| pos);
        entries
    }
}

// JSON object keys must be strings, so the map travels as a sorted list.
impl Serialize for BlockEntities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sorted().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockEntities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<(BlockPos, NbtCompound)>::deserialize(deserializer)?;
        Ok(Self(entries.into_iter().collect()))
    }
}
