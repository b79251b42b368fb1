//! Java edition chunk columns, from 1.8 through 1.21.

mod column;
mod flat;
mod light;
mod profile;
mod section;

pub use column::{BiomeStorage, JavaColumn, JavaOptions};
pub use flat::expected_len as flat_chunk_len;
pub use light::{LightData, LightSections};
pub use profile::{BiomeFormat, DEFAULT_BIOME_BITS, JavaProfile, JavaVersion, LightPlacement, SectionStorage};
pub use section::{ChunkSection, section_index};
