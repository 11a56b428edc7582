use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Key type with only a handful of distinct hashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FewHashes(u16);

impl Hash for FewHashes {
    fn hash<S: Hasher>(&self, state: &mut S) {
        (self.0 % 3).hash(state);
    }
}

fn build<K, V>(pairs: &[(K, V)], initial_buckets: u32, load_factor: f32) -> BlobMap<K, V>
where
    K: Clone + Eq + Hash + Ord,
    V: Clone,
{
    let mut builder = BlobMapBuilder::new(initial_buckets, load_factor);
    builder.add_all(pairs.iter().cloned());
    builder.build()
}

fn expected<K: Clone + Ord, V: Clone>(pairs: &[(K, V)]) -> BTreeMap<K, Vec<V>> {
    let mut expected: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for (key, value) in pairs {
        expected.entry(key.clone()).or_default().push(value.clone());
    }
    expected
}

proptest! {
    #[test]
    fn prop_values_round_trip(
        pairs in prop::collection::vec((0u32..200, any::<u32>()), 0..400),
        shift in 0u32..6,
        load_factor in 0.25f32..4.0,
    ) {
        let map = build(&pairs, 1 << shift, load_factor);
        let expected = expected(&pairs);

        prop_assert_eq!(map.value_count(), pairs.len() as u64);
        prop_assert_eq!(map.key_count(), expected.len());
        prop_assert!(map.bucket_count().is_power_of_two());
        for (key, values) in &expected {
            prop_assert!(map.contains_key(key));
            prop_assert_eq!(map.get_values_for_key(key), values.as_slice());
        }
        for key in 200u32..220 {
            prop_assert!(!map.contains_key(&key));
            prop_assert!(map.get_values_for_key(&key).is_empty());
        }
        map.arena().validate().unwrap();
    }

    #[test]
    fn prop_collisions_round_trip(
        pairs in prop::collection::vec((0u16..300, any::<i64>()), 1..300),
    ) {
        let pairs: Vec<_> = pairs.into_iter().map(|(k, v)| (FewHashes(k), v)).collect();
        let map = build(&pairs, 16, 0.75);
        let expected = expected(&pairs);

        prop_assert_eq!(map.key_count(), expected.len());
        for (key, values) in &expected {
            prop_assert_eq!(map.get_values_for_key(key), values.as_slice());
        }
        prop_assert!(!map.contains_key(&FewHashes(300)));
        map.arena().validate().unwrap();
    }

    #[test]
    fn prop_byte_image_preserves_lookups(
        pairs in prop::collection::vec(("[a-z]{0,6}", any::<u8>()), 0..100),
    ) {
        let map = build(&pairs, 16, 0.75);
        let restored = BlobMap::<String, u8>::from_bytes(&map.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(restored.arena(), map.arena());
        for (key, values) in &expected(&pairs) {
            prop_assert_eq!(restored.get_values_for_key(key.as_str()), values.as_slice());
        }
    }
}
