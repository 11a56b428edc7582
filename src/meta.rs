use serde::{Deserialize, Serialize};

use crate::BlobMapHashConfig;

/// Locates the run of values belonging to one key inside its bucket.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlobMapKeyIndex {
    /// Spread hash of the key, kept so lookups never rehash stored keys.
    pub hash: u64,
    /// Offset of the first value, relative to the start of the bucket's values.
    pub first_index: u64,
    /// Number of values stored for the key. Always at least one.
    pub element_count: u64,
}

impl BlobMapKeyIndex {
    /// Range of the key's values within the bucket value slice.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.first_index as usize;
        start..start + self.element_count as usize
    }
}

/// Position of one bucket inside the arena's flat arrays.
///
/// `keys` and `key_indexes` share `key_offset`/`key_count`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlobMapBucketMeta {
    pub key_offset: u64,
    pub key_count: u64,
    pub value_offset: u64,
    pub value_count: u64,
}

impl BlobMapBucketMeta {
    #[inline]
    pub fn key_range(&self) -> std::ops::Range<usize> {
        let start = self.key_offset as usize;
        start..start + self.key_count as usize
    }

    #[inline]
    pub fn value_range(&self) -> std::ops::Range<usize> {
        let start = self.value_offset as usize;
        start..start + self.value_count as usize
    }
}

/// Leading record of every arena.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlobMapHeader {
    /// Number of buckets, always a power of two.
    pub bucket_count: u64,
    /// Total number of values across all buckets.
    pub value_count: u64,
}

/// Summary returned by [`BlobMap::info`](crate::BlobMap::info).
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
pub struct BlobMapInfo {
    /// Number of buckets allocated.
    pub bucket_count: u64,
    /// Number of buckets holding at least one key.
    pub occupied_buckets: u64,
    /// Number of buckets that ended up empty.
    pub empty_buckets: u64,
    /// Number of distinct keys.
    pub key_count: u64,
    /// Number of values, duplicates included.
    pub value_count: u64,
    /// Largest number of distinct keys sharing one bucket.
    pub max_bucket_keys: u64,
    /// Hash function the buckets were laid out with.
    pub hash_config: BlobMapHashConfig,
}
