use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::io::Result;
use std::marker::PhantomData;

use log::{debug, trace};

use crate::hasher::bucket_index;
use crate::{
    BlobMap, BlobMapArena, BlobMapBucketMeta, BlobMapDefaultHashLoader, BlobMapHashConfig,
    BlobMapHashLoader, BlobMapHeader, BlobMapKeyIndex,
};

/// Default number of staging buckets.
pub const DEFAULT_BUCKET_COUNT: u32 = 16;
/// Default ratio of distinct keys to buckets above which the builder grows.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Values accumulated for one key while staging.
#[derive(Debug)]
struct StagedKey<V> {
    hash: u64,
    values: Vec<V>,
}

/// Two-phase builder producing a [`BlobMap`].
///
/// Pairs are staged per bucket in an ordered map keyed by the key itself, so
/// distinct keys sharing a hash never merge. Every pair is also kept in an
/// insertion log: when the number of distinct keys exceeds
/// `bucket_count * load_factor`, the bucket count doubles and the log is
/// replayed into fresh staging. [`build`](Self::build) consumes the builder
/// and lays every bucket out contiguously in one arena.
///
/// The builder is single-threaded; the map it produces is immutable and may
/// be shared freely.
pub struct BlobMapBuilder<K, V, H: BlobMapHashLoader = BlobMapDefaultHashLoader> {
    hash_config: BlobMapHashConfig,
    hash_state: H::BuildHasher,
    bucket_count: u64,
    load_factor: f32,
    staging: HashMap<usize, BTreeMap<K, StagedKey<V>>>,
    insertion_log: Vec<(K, V)>,
    unique_keys: HashSet<K>,
    phantom: PhantomData<H>,
}

impl<K, V, H: BlobMapHashLoader> std::fmt::Debug for BlobMapBuilder<K, V, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobMapBuilder")
            .field("hash_config", &self.hash_config)
            .field("bucket_count", &self.bucket_count)
            .field("load_factor", &self.load_factor)
            .field("unique_keys", &self.unique_keys.len())
            .field("values", &self.insertion_log.len())
            .finish()
    }
}

impl<K, V> Default for BlobMapBuilder<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_COUNT, DEFAULT_LOAD_FACTOR)
    }
}

impl<K, V> BlobMapBuilder<K, V> {
    /// Creates a builder hashing with seeded foldhash.
    ///
    /// # Panics
    ///
    /// Panics if `initial_buckets` is not a power of two or `load_factor` is
    /// not a finite positive number.
    pub fn new(initial_buckets: u32, load_factor: f32) -> Self {
        let (hash_config, hash_state) = BlobMapDefaultHashLoader::with_seed(0);
        Self::with_parts(initial_buckets, load_factor, hash_config, hash_state)
    }

    /// Creates a builder with 16 buckets and a 0.75 load factor.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        <Self as Default>::default()
    }
}

impl<K, V> BlobMapBuilder<K, V>
where
    K: Clone + Eq + Hash + Ord,
    V: Clone,
{
    /// Overrides the seed used to distribute keys across buckets.
    ///
    /// Pairs already added are restaged under the new seed.
    pub fn with_hash_seed(mut self, seed: u64) -> Self {
        let (hash_config, hash_state) = BlobMapDefaultHashLoader::with_seed(seed);
        self.hash_config = hash_config;
        self.hash_state = hash_state;
        self.restage();
        self
    }
}

impl<K, V, H: BlobMapHashLoader> BlobMapBuilder<K, V, H> {
    /// Creates a builder whose hasher is loaded from `config` by `H`.
    ///
    /// # Errors
    ///
    /// Returns whatever error `H` reports for an unusable configuration.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`new`](BlobMapBuilder::new).
    pub fn with_hash_config(
        initial_buckets: u32,
        load_factor: f32,
        config: BlobMapHashConfig,
    ) -> Result<Self> {
        let hash_state = H::load(&config)?;
        Ok(Self::with_parts(initial_buckets, load_factor, config, hash_state))
    }

    fn with_parts(
        initial_buckets: u32,
        load_factor: f32,
        hash_config: BlobMapHashConfig,
        hash_state: H::BuildHasher,
    ) -> Self {
        assert!(
            initial_buckets.is_power_of_two(),
            "bucket count must be a power of two, got {}",
            initial_buckets
        );
        assert!(
            load_factor.is_finite() && load_factor > 0.0,
            "load factor must be finite and positive, got {}",
            load_factor
        );
        Self {
            hash_config,
            hash_state,
            bucket_count: initial_buckets as u64,
            load_factor,
            staging: HashMap::new(),
            insertion_log: Vec::new(),
            unique_keys: HashSet::new(),
            phantom: PhantomData,
        }
    }

    pub fn hash_config(&self) -> &BlobMapHashConfig {
        &self.hash_config
    }

    /// Current number of staging buckets, always a power of two.
    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Number of distinct keys added so far.
    pub fn unique_key_count(&self) -> usize {
        self.unique_keys.len()
    }

    /// Number of pairs added so far.
    pub fn value_count(&self) -> usize {
        self.insertion_log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_log.is_empty()
    }

    fn exceeds_load(&self, bucket_count: u64) -> bool {
        (bucket_count as f64) * (self.load_factor as f64) < self.unique_keys.len() as f64
    }
}

impl<K, V, H> BlobMapBuilder<K, V, H>
where
    K: Clone + Eq + Hash + Ord,
    V: Clone,
    H: BlobMapHashLoader,
{
    /// Adds one pair. Values for the same key keep their insertion order.
    pub fn add(&mut self, key: K, value: V) -> &mut Self {
        if self.exceeds_load(self.bucket_count) {
            self.rehash();
        }
        self.unique_keys.insert(key.clone());
        self.insertion_log.push((key.clone(), value.clone()));
        self.stage(key, value);
        self
    }

    /// Adds every pair yielded by `entries`.
    pub fn add_all(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> &mut Self {
        for (key, value) in entries {
            self.add(key, value);
        }
        self
    }

    /// Consumes the builder and lays the staged pairs out in one arena.
    ///
    /// Each bucket stores its distinct keys sorted by hash (ties stay in
    /// ascending key order) followed by every key's values, contiguous and in
    /// insertion order. Buckets with nothing staged stay empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use blobmap::BlobMapBuilder;
    ///
    /// let mut builder = BlobMapBuilder::default();
    /// builder.add("it", 1u32).add("works", 2u32).add("it", 3u32);
    /// let map = builder.build();
    /// assert_eq!(map.get_values_for_key("it"), &[1, 3]);
    /// assert_eq!(map.value_count(), 3);
    /// ```
    pub fn build(self) -> BlobMap<K, V, H> {
        let Self {
            hash_config,
            hash_state,
            bucket_count,
            mut staging,
            ..
        } = self;

        let key_count: usize = staging.values().map(|bucket| bucket.len()).sum();
        let value_count: usize = staging
            .values()
            .flat_map(|bucket| bucket.values())
            .map(|staged| staged.values.len())
            .sum();

        let mut buckets = Vec::with_capacity(bucket_count as usize);
        let mut keys = Vec::with_capacity(key_count);
        let mut key_indexes = Vec::with_capacity(key_count);
        let mut values = Vec::with_capacity(value_count);
        for i in 0..bucket_count as usize {
            let key_offset = keys.len() as u64;
            let value_offset = values.len() as u64;
            if let Some(bucket) = staging.remove(&i) {
                let mut entries: Vec<_> = bucket.into_iter().collect();
                entries.sort_by_key(|(_, staged)| staged.hash);

                let mut first_index = 0u64;
                for (key, staged) in entries {
                    let element_count = staged.values.len() as u64;
                    keys.push(key);
                    key_indexes.push(BlobMapKeyIndex {
                        hash: staged.hash,
                        first_index,
                        element_count,
                    });
                    values.extend(staged.values);
                    first_index += element_count;
                }
            }
            buckets.push(BlobMapBucketMeta {
                key_offset,
                key_count: keys.len() as u64 - key_offset,
                value_offset,
                value_count: values.len() as u64 - value_offset,
            });
        }

        debug!(
            "baked {} keys and {} values into {} buckets",
            key_count, value_count, bucket_count
        );
        let arena = BlobMapArena {
            header: BlobMapHeader {
                bucket_count,
                value_count: value_count as u64,
            },
            hash_config,
            buckets,
            keys,
            key_indexes,
            values,
        };
        BlobMap::from_parts(arena, hash_state)
    }

    fn stage(&mut self, key: K, value: V) {
        let (index, hash) = bucket_index(&self.hash_state, &key, self.bucket_count);
        self.staging
            .entry(index)
            .or_default()
            .entry(key)
            .or_insert_with(|| StagedKey {
                hash,
                values: Vec::new(),
            })
            .values
            .push(value);
    }

    fn rehash(&mut self) {
        let previous = self.bucket_count;
        debug_assert!(previous < 1 << 63);
        self.bucket_count <<= 1;
        debug!(
            "rehashing {} keys from {} to {} buckets",
            self.unique_keys.len(),
            previous,
            self.bucket_count
        );
        self.restage();
    }

    /// Rebuilds staging from the insertion log under the current bucket count
    /// and hasher.
    fn restage(&mut self) {
        trace!(
            "restaging {} pairs into {} buckets",
            self.insertion_log.len(),
            self.bucket_count
        );
        self.staging.clear();
        let log = std::mem::take(&mut self.insertion_log);
        for (key, value) in &log {
            self.stage(key.clone(), value.clone());
        }
        self.insertion_log = log;
    }
}

impl<K, V, H> Extend<(K, V)> for BlobMapBuilder<K, V, H>
where
    K: Clone + Eq + Hash + Ord,
    V: Clone,
    H: BlobMapHashLoader,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}
