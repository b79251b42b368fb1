use strata_chunk::{
    AnyColumn, BedrockColumn, BedrockOptions, BedrockVersion, BlockPos, ChunkColumn, ChunkError, ColumnConfig,
    bedrock::{BlobEntry, BlobStore, MemoryBlobStore},
};
use strata_registry::{BiomeId, BlockDescriptor, BlockStateId, MemoryRegistry, PropertyValue};
use strata_utils::nbt::{NbtCompound, Tag};

#[derive(Default)]
struct CountingStore {
    inner: MemoryBlobStore,
    sets: usize,
}

impl BlobStore for CountingStore {
    fn get(&self, hash: u64) -> Option<&BlobEntry> {
        self.inner.get(hash)
    }

    fn set(&mut self, hash: u64, entry: BlobEntry) {
        self.sets += 1;
        self.inner.set(hash, entry);
    }
}

fn registry() -> MemoryRegistry {
    let mut registry = MemoryRegistry::new();
    registry
        .register_default(BlockDescriptor::new(BlockStateId(0), "minecraft:air"))
        .unwrap();
    registry
        .register_default(BlockDescriptor::new(BlockStateId(1), "minecraft:stone"))
        .unwrap();
    for (id, level) in (2..=9).zip(0..) {
        registry
            .register(BlockDescriptor::new(BlockStateId(id), "minecraft:water").with("liquid_depth", PropertyValue::Int(level)))
            .unwrap();
    }
    registry
}

fn terrain(version: BedrockVersion) -> BedrockColumn {
    let mut column = BedrockColumn::new(version, BedrockOptions::default());
    let min_y = column.min_y();
    column
        .initialize(&mut |pos| {
            let depth = pos.y - min_y;
            match depth {
                0..30 => Some(BlockStateId(1)),
                30..34 => Some(BlockStateId(2 + (u32::from(pos.x) + u32::from(pos.z)) % 8)),
                _ => None,
            }
        })
        .unwrap();
    column.set_block_layer(BlockPos::new(4, min_y + 29, 4), 1, BlockStateId(3)).unwrap();
    column.set_biome(BlockPos::new(0, min_y + 31, 0), BiomeId(7)).unwrap();

    let mut chest = NbtCompound::new();
    chest.insert("id", Tag::String("Chest".to_owned()));
    column.set_block_entity(BlockPos::new(8, min_y + 30, 8), chest).unwrap();
    column
}

#[test]
fn test_cache_encodes_unchanged_units_once() {
    let mut column = terrain(BedrockVersion::Bedrock118);
    let mut store = CountingStore::default();

    let first = column.network_encode(&mut store).unwrap();
    assert_eq!(first.sub_chunk_count(), 3);
    assert_eq!(store.sets, first.blobs.len());

    store.sets = 0;
    let second = column.network_encode(&mut store).unwrap();
    assert_eq!(store.sets, 0);
    assert_eq!(second, first);

    column.set_block_state_id(BlockPos::new(1, -50, 1), BlockStateId(5)).unwrap();
    let third = column.network_encode(&mut store).unwrap();
    assert_eq!(store.sets, 1);
    assert_ne!(third.blobs[0], first.blobs[0]);
    assert_eq!(third.blobs[1..], first.blobs[1..]);
}

#[test]
fn test_cached_decode_reports_misses_then_completes() {
    for version in BedrockVersion::ALL {
        let mut sender = terrain(version);
        let mut sender_store = MemoryBlobStore::new();
        let cached = sender.network_encode(&mut sender_store).unwrap();

        let empty = BedrockColumn::new(version, BedrockOptions::default());
        let mut receiver = empty.clone();
        let mut receiver_store = MemoryBlobStore::new();
        let misses = receiver.network_decode(&cached.blobs, &receiver_store, &cached.payload).unwrap();
        assert!(!misses.is_empty());
        assert_eq!(receiver, empty);

        for hash in misses {
            let entry = sender_store.get(hash).cloned().unwrap();
            receiver_store.set(hash, entry);
        }
        let misses = receiver.network_decode(&cached.blobs, &receiver_store, &cached.payload).unwrap();
        assert!(misses.is_empty());

        let uncached = sender.network_encode_no_cache().unwrap();
        let mut expected = BedrockColumn::new(version, BedrockOptions::default());
        expected.network_decode_no_cache(&uncached.payload, uncached.sub_chunk_count).unwrap();
        assert_eq!(receiver, expected, "{version}");
        assert_eq!(receiver, sender);
    }
}

#[test]
fn test_bedrock_disk_round_trip_through_registry() {
    let registry = registry();
    let column = terrain(BedrockVersion::Bedrock116);
    let disk = column.dump(&registry).unwrap();
    assert_eq!(disk.sub_chunks.iter().map(|(y, _)| *y).collect::<Vec<_>>(), [0, 1, 2]);

    let mut loaded = BedrockColumn::new(BedrockVersion::Bedrock116, BedrockOptions::default());
    loaded.load(&disk, &registry).unwrap();
    assert_eq!(loaded, column);
    assert_eq!(loaded.heightmap()[(8 << 4) | 8], 34);

    let mut truncated = disk.clone();
    truncated.sub_chunks[1].1.truncate(10);
    let mut partial = BedrockColumn::new(BedrockVersion::Bedrock116, BedrockOptions::default());
    let err = partial.load(&truncated, &registry).unwrap_err();
    assert!(matches!(err, ChunkError::Decode { ref field, .. } if field.starts_with("sub_chunks[1]")));
    assert_eq!(partial, BedrockColumn::new(BedrockVersion::Bedrock116, BedrockOptions::default()));
}

#[test]
fn test_configured_java_column_round_trips() {
    let config = ColumnConfig::from_json5("{ edition: 'java', version: '1.20.4' }").unwrap();
    let AnyColumn::Java(mut column) = config.build().unwrap() else {
        panic!("expected a java column");
    };
    column
        .initialize(&mut |pos| (pos.y < -40).then_some(BlockStateId(1 + u32::from(pos.x))))
        .unwrap();
    column.set_biome(BlockPos::new(3, -50, 3), BiomeId(12)).unwrap();

    let data = column.dump().unwrap();
    let mut loaded = config.build().unwrap();
    let AnyColumn::Java(java) = &mut loaded else {
        panic!("expected a java column");
    };
    java.load(&data, &column.get_mask(), true).unwrap();
    assert_eq!(loaded.get_block_state_id(BlockPos::new(5, -60, 0)), BlockStateId(6));
    assert_eq!(loaded.get_biome(BlockPos::new(3, -50, 3)), BiomeId(12));
    assert_eq!(loaded, AnyColumn::Java(column));
}

#[test]
fn test_any_column_snapshot() {
    let column: AnyColumn = terrain(BedrockVersion::Bedrock118).into();
    let json = column.to_json().unwrap();
    assert!(json.contains("\"edition\":\"bedrock\""));
    assert_eq!(AnyColumn::from_json(&json).unwrap(), column);
}
