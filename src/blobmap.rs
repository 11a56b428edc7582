use std::borrow::Borrow;
use std::hash::Hash;
use std::io::Result;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::hasher::bucket_index;
use crate::{
    BlobMapArena, BlobMapBucket, BlobMapBuilder, BlobMapDefaultHashLoader, BlobMapHashLoader,
    BlobMapInfo,
};

/// Immutable multi-value hash map stored in a single arena.
///
/// A `BlobMap` is produced by [`BlobMapBuilder::build`] (or restored from an
/// arena) and never changes afterwards. Lookups hash the key once, pick the
/// bucket by masking, and binary search the bucket's hash-sorted keys; they
/// never allocate and hand out slices pointing straight into the arena, so
/// any number of threads may query a shared map without locking.
///
/// # Type Parameters
/// - `K`: key type; lookups need `Eq + Hash`.
/// - `V`: value type; every key maps to one or more values.
/// - `H`: [`BlobMapHashLoader`] rebuilding the hasher from the stored config.
pub struct BlobMap<K, V, H: BlobMapHashLoader = BlobMapDefaultHashLoader> {
    arena: BlobMapArena<K, V>,
    hash_state: H::BuildHasher,
    phantom_data: PhantomData<H>,
}

impl<K, V, H> std::fmt::Debug for BlobMap<K, V, H>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
    H: BlobMapHashLoader,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobMap")
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

impl<K, V, H: BlobMapHashLoader> BlobMap<K, V, H> {
    pub(crate) fn from_parts(arena: BlobMapArena<K, V>, hash_state: H::BuildHasher) -> Self {
        debug_assert!(arena.validate().is_ok());
        BlobMap {
            arena,
            hash_state,
            phantom_data: PhantomData,
        }
    }

    /// Wraps an arena, validating its layout and loading its hasher.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidData` when the arena breaks a layout
    /// invariant or its hash configuration cannot be loaded by `H`.
    pub fn from_arena(arena: BlobMapArena<K, V>) -> Result<Self> {
        arena.validate()?;
        let hash_state = H::load(&arena.hash_config)?;
        Ok(Self::from_parts(arena, hash_state))
    }

    /// Restores a map from a byte image produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as
    /// [`BlobMapArena::from_bytes`] and [`from_arena`](Self::from_arena).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        K: for<'de> Deserialize<'de>,
        V: for<'de> Deserialize<'de>,
    {
        let arena = BlobMapArena::from_bytes(bytes)?;
        let hash_state = H::load(&arena.hash_config)?;
        Ok(Self::from_parts(arena, hash_state))
    }

    /// Copies the backing arena out as a relocatable byte image.
    pub fn to_bytes(&self) -> Result<Vec<u8>>
    where
        K: Serialize,
        V: Serialize,
    {
        self.arena.to_bytes()
    }

    pub fn arena(&self) -> &BlobMapArena<K, V> {
        &self.arena
    }

    pub fn into_arena(self) -> BlobMapArena<K, V> {
        self.arena
    }

    /// Returns the total number of values, duplicates included.
    pub fn value_count(&self) -> u64 {
        self.arena.header.value_count
    }

    /// Returns the number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.arena.keys.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.arena.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.values.is_empty()
    }

    /// Returns a view over bucket `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.bucket_count()`.
    pub fn bucket(&self, index: usize) -> BlobMapBucket<'_, K, V> {
        self.arena.bucket(index)
    }

    /// Returns whether at least one value is stored for `k`.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let (index, hash) = bucket_index(&self.hash_state, k, self.arena.header.bucket_count);
        self.arena.bucket(index).contains_key(k, hash)
    }

    /// Returns every value stored for `k` in insertion order.
    ///
    /// Absent keys yield an empty slice rather than an error.
    pub fn get_values_for_key<Q>(&self, k: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let (index, hash) = bucket_index(&self.hash_state, k, self.arena.header.bucket_count);
        self.arena.bucket(index).get_values_for_key(k, hash)
    }

    /// Iterates `(key, values)` pairs bucket by bucket.
    pub fn iter(&self) -> BlobMapIter<'_, K, V> {
        BlobMapIter {
            arena: &self.arena,
            bucket_index: 0,
            key_index: 0,
        }
    }

    /// Distinct keys in storage order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> {
        self.arena.keys.iter()
    }

    /// Summarizes the layout of the map.
    pub fn info(&self) -> BlobMapInfo {
        let occupied_buckets = self.arena.buckets.iter().filter(|b| b.key_count > 0).count() as u64;
        BlobMapInfo {
            bucket_count: self.arena.header.bucket_count,
            occupied_buckets,
            empty_buckets: self.arena.header.bucket_count - occupied_buckets,
            key_count: self.arena.keys.len() as u64,
            value_count: self.arena.header.value_count,
            max_bucket_keys: self
                .arena
                .buckets
                .iter()
                .map(|b| b.key_count)
                .max()
                .unwrap_or(0),
            hash_config: self.arena.hash_config.clone(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for BlobMap<K, V>
where
    K: Clone + Eq + Hash + Ord,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut builder = BlobMapBuilder::default();
        builder.add_all(iter);
        builder.build()
    }
}

impl<'a, K, V, H: BlobMapHashLoader> IntoIterator for &'a BlobMap<K, V, H> {
    type Item = (&'a K, &'a [V]);
    type IntoIter = BlobMapIter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over all `(key, values)` pairs of a [`BlobMap`].
///
/// Buckets are visited in index order and keys within a bucket in hash order.
pub struct BlobMapIter<'a, K, V> {
    arena: &'a BlobMapArena<K, V>,
    bucket_index: usize,
    key_index: usize,
}

impl<'a, K, V> Iterator for BlobMapIter<'a, K, V> {
    type Item = (&'a K, &'a [V]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let meta = self.arena.buckets.get(self.bucket_index)?;
            if self.key_index < meta.key_count as usize {
                let i = meta.key_offset as usize + self.key_index;
                self.key_index += 1;
                let values = &self.arena.values[meta.value_range()];
                return Some((
                    &self.arena.keys[i],
                    &values[self.arena.key_indexes[i].range()],
                ));
            }
            self.bucket_index += 1;
            self.key_index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use rand::Rng;

    use crate::*;

    #[test]
    fn test_basic() {
        let mut builder = BlobMapBuilder::default();
        builder
            .add(1, 10)
            .add(3, 30)
            .add(2, 20)
            .add(4, 40)
            .add(2, 21);
        assert_eq!(builder.unique_key_count(), 4);
        let map = builder.build();

        assert_eq!(map.bucket_count(), 16);
        assert_eq!(map.key_count(), 4);
        assert_eq!(map.value_count(), 5);
        assert_eq!(map.get_values_for_key(&1), &[10]);
        assert_eq!(map.get_values_for_key(&2), &[20, 21]);
        assert_eq!(map.get_values_for_key(&3), &[30]);
        assert_eq!(map.get_values_for_key(&4), &[40]);
        assert!(map.get_values_for_key(&5).is_empty());
        assert!(!map.contains_key(&5));
    }

    #[test]
    fn test_simple_example() {
        let mut builder = BlobMapBuilder::default();
        builder.add(1, 2).add(1, 3).add(3, 4).add(5, 6);
        let map = builder.build();

        assert_eq!(map.get_values_for_key(&1), &[2, 3]);
        assert_eq!(map.value_count(), 4);
        assert!(map.contains_key(&5));
        assert!(map.contains_key(&3));
        assert!(!map.contains_key(&-4));
        assert!(map.get_values_for_key(&-4).is_empty());
    }

    #[test]
    fn test_empty_map() {
        let map: BlobMap<u64, u64> = BlobMapBuilder::default().build();
        assert!(map.is_empty());
        assert_eq!(map.value_count(), 0);
        assert_eq!(map.bucket_count(), 16);
        assert!(!map.contains_key(&0));
        assert!(map.get_values_for_key(&0).is_empty());
        assert_eq!(map.iter().count(), 0);
        assert_eq!(map.info().empty_buckets, 16);
    }

    #[test]
    fn test_borrowed_lookup() {
        let map: BlobMap<String, u32> = [("apple", 1), ("banana", 2), ("apple", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(map.get_values_for_key("apple"), &[1, 3]);
        assert_eq!(map.get_values_for_key("banana"), &[2]);
        assert!(map.contains_key("banana"));
        assert!(!map.contains_key("cherry"));
    }

    #[test]
    fn test_random_against_hashmap() {
        let mut rng = rand::rng();
        let mut expected: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut builder = BlobMapBuilder::default();
        const N: usize = 100_000;
        for _ in 0..N {
            let key = rng.random_range(0..5_000u32);
            let value = rng.random::<u32>();
            expected.entry(key).or_default().push(value);
            builder.add(key, value);
        }
        let map = builder.build();

        assert_eq!(map.value_count(), N as u64);
        assert_eq!(map.key_count(), expected.len());
        assert!(map.bucket_count().is_power_of_two());
        for (key, values) in &expected {
            assert_eq!(map.get_values_for_key(key), values.as_slice());
        }
        for _ in 0..1000 {
            let key = rng.random_range(5_000..u32::MAX);
            assert!(!map.contains_key(&key));
        }
    }

    #[test]
    fn test_iter_visits_every_pair() {
        let map: BlobMap<u64, u64> = (0..1000u64).map(|i| (i % 100, i)).collect();
        let mut total = 0u64;
        let mut keys = 0;
        for (key, values) in &map {
            assert_eq!(values.len(), 10);
            assert!(values.iter().all(|v| v % 100 == *key));
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            total += values.iter().sum::<u64>();
            keys += 1;
        }
        assert_eq!(keys, 100);
        assert_eq!(total, (0..1000).sum::<u64>());

        let mut all_keys: Vec<_> = map.keys().copied().collect();
        all_keys.sort_unstable();
        assert_eq!(all_keys, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_info() {
        let map: BlobMap<u64, u64> = (0..10u64).map(|i| (i, i)).collect();
        let info = map.info();
        assert_eq!(info.key_count, 10);
        assert_eq!(info.value_count, 10);
        assert_eq!(info.bucket_count, map.bucket_count() as u64);
        assert_eq!(info.occupied_buckets + info.empty_buckets, info.bucket_count);
        assert!(info.max_bucket_keys >= 1);
        assert_eq!(info.hash_config, BlobMapHashConfig::default());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["value_count"], 10);
        assert_eq!(json["hash_config"]["name"], "foldhash");
    }

    #[test]
    fn test_relocation_through_bytes() {
        let map: BlobMap<String, u64> = (0..500u64).map(|i| (format!("key-{}", i % 50), i)).collect();
        let bytes = map.to_bytes().unwrap();
        drop(map);

        let copy = bytes.clone();
        let map = BlobMap::<String, u64>::from_bytes(&copy).unwrap();
        assert_eq!(map.value_count(), 500);
        for i in 0..50u64 {
            let values = map.get_values_for_key(format!("key-{}", i).as_str());
            assert_eq!(values, (0..10).map(|j| i + j * 50).collect::<Vec<_>>());
        }
        assert!(!map.contains_key("key-50"));
    }

    #[test]
    fn test_from_arena_rejects_unknown_hash() {
        let map: BlobMap<u64, u64> = (0..10u64).map(|i| (i, i)).collect();
        let mut arena = map.into_arena();
        arena.hash_config.name = "unknown".to_string();
        BlobMap::<u64, u64>::from_arena(arena.clone()).unwrap_err();

        arena.hash_config = BlobMapHashConfig::default();
        let map = BlobMap::<u64, u64>::from_arena(arena).unwrap();
        assert_eq!(map.get_values_for_key(&3), &[3]);
    }

    #[test]
    fn test_concurrent_readers() {
        const N: u64 = 100_000;
        const P: u64 = 8;
        let map: BlobMap<u64, u64> = (0..N).map(|i| (i % 1000, i)).collect();
        let map = Arc::new(map);

        let mut threads = Vec::with_capacity(P as usize);
        for t in 0..P {
            let map = map.clone();
            threads.push(std::thread::spawn(move || {
                let mut sum = 0u64;
                for key in (t..1000).step_by(P as usize) {
                    let values = map.get_values_for_key(&key);
                    assert_eq!(values.len(), (N / 1000) as usize);
                    sum += values.iter().sum::<u64>();
                }
                sum
            }));
        }

        let total: u64 = threads.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(total, (0..N).sum::<u64>());
    }
}
