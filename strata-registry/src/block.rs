use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Name of the air block.
pub const AIR_NAME: &str = "minecraft:air";

/// Block properties, ordered by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A numeric block state id, unique across the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockStateId(pub u32);

impl BlockStateId {
    /// The conventional air state.
    pub const AIR: Self = Self(0);

    /// Returns true for state id 0.
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// A numeric biome id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiomeId(pub u32);

/// A single block property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A boolean property such as `waterlogged`.
    Bool(bool),
    /// An integer property such as `age`.
    Int(i32),
    /// A named property such as `facing`.
    String(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// The structured form of a block state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Registry id of this state.
    pub state_id: BlockStateId,
    /// Namespaced block name.
    pub name: String,
    /// Property values for this state.
    #[serde(default)]
    pub properties: Properties,
}

impl BlockDescriptor {
    /// Creates a descriptor without properties.
    pub fn new(state_id: BlockStateId, name: impl Into<String>) -> Self {
        Self {
            state_id,
            name: name.into(),
            properties: Properties::new(),
        }
    }

    /// Adds a property value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The `name[key=value,...]` form used as a lookup key.
    #[must_use]
    pub fn state_key(&self) -> String {
        state_key(&self.name, &self.properties)
    }
}

pub(crate) fn state_key(name: &str, properties: &Properties) -> String {
    if properties.is_empty() {
        return name.to_owned();
    }
    let props: Vec<String> = properties.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}[{}]", props.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_is_ordered() {
        let descriptor = BlockDescriptor::new(BlockStateId(7), "minecraft:wheat")
            .with("waterlogged", PropertyValue::Bool(false))
            .with("age", PropertyValue::Int(3));
        assert_eq!(descriptor.state_key(), "minecraft:wheat[age=3,waterlogged=false]");
        assert_eq!(
            BlockDescriptor::new(BlockStateId(1), "minecraft:stone").state_key(),
            "minecraft:stone"
        );
    }

    #[test]
    fn test_property_value_json() {
        let values: Vec<PropertyValue> = serde_json::from_str(r#"[true, 2, "north"]"#).unwrap();
        assert_eq!(
            values,
            [
                PropertyValue::Bool(true),
                PropertyValue::Int(2),
                PropertyValue::String("north".to_owned())
            ]
        );
    }
}
