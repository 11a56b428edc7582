//! Immutable, contiguous multi-value hash maps.
//!
//! The `blobmap` crate accumulates an arbitrary stream of key-value pairs in a
//! [`BlobMapBuilder`] and bakes them into a [`BlobMap`]: a read-only map whose
//! buckets, keys, per-key value runs and values all live in one arena
//! addressed by offsets. The finished map can be shared across threads,
//! cloned, or copied out as bytes and restored without any pointer fix-up,
//! while lookups stay allocation-free and return slices straight into the
//! arena.
//!
//! Keys may carry any number of values. Within a bucket, keys are sorted by
//! their spread hash and located by binary search, with a short linear scan
//! over keys that collide on the full hash.
//!
//! ```
//! use blobmap::{BlobMap, BlobMapBuilder};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut builder = BlobMapBuilder::default();
//! builder
//!     .add("apple".to_string(), 1u32)
//!     .add("banana".to_string(), 2u32)
//!     .add("apple".to_string(), 3u32);
//! let map = builder.build();
//! assert_eq!(map.get_values_for_key("apple"), &[1, 3]);
//! assert!(map.get_values_for_key("cherry").is_empty());
//!
//! let bytes = map.to_bytes()?;
//! let copy = BlobMap::<String, u32>::from_bytes(&bytes)?;
//! assert_eq!(copy.value_count(), 3);
//! # Ok(())
//! # }
//! ```
const MAGIC_NUMBER: u64 = u64::from_be_bytes(*b"BLOBMAP!");

mod hasher;
pub use hasher::{
    BlobMapDefaultHashLoader, BlobMapHashConfig, BlobMapHashLoader, bucket_index, key_hash,
};

mod meta;
pub use meta::{BlobMapBucketMeta, BlobMapHeader, BlobMapInfo, BlobMapKeyIndex};

mod bucket;
pub use bucket::BlobMapBucket;

mod arena;
pub use arena::BlobMapArena;

mod blobmap;
pub use blobmap::{BlobMap, BlobMapIter};

mod builder;
pub use builder::{BlobMapBuilder, DEFAULT_BUCKET_COUNT, DEFAULT_LOAD_FACTOR};

#[cfg(test)]
mod proptests;
