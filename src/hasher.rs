use std::hash::{BuildHasher, Hash};
use std::io::{Error, ErrorKind, Result};

use foldhash::fast::FixedState;
use serde::{Deserialize, Serialize};

/// Configuration for the hash function used by a blobmap.
///
/// The configuration travels with the arena so that a relocated map can
/// rebuild exactly the hasher its buckets were laid out with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlobMapHashConfig {
    /// Name of hash function used.
    pub name: String,
    /// Parameters for the hash function.
    pub parameters: serde_json::Value,
}

impl Default for BlobMapHashConfig {
    fn default() -> Self {
        BlobMapHashConfig {
            name: BlobMapDefaultHashLoader::NAME.to_string(),
            parameters: serde_json::json!({ "seed": 0 }),
        }
    }
}

/// Turns a [`BlobMapHashConfig`] into a concrete [`BuildHasher`].
pub trait BlobMapHashLoader {
    type BuildHasher: BuildHasher;

    fn load(config: &BlobMapHashConfig) -> Result<Self::BuildHasher>;
}

#[derive(Debug, Default)]
pub struct BlobMapDefaultHashLoader;

impl BlobMapDefaultHashLoader {
    pub const NAME: &'static str = "foldhash";

    /// Infallible shortcut for the default configuration with a custom seed.
    pub fn with_seed(seed: u64) -> (BlobMapHashConfig, FixedState) {
        let config = BlobMapHashConfig {
            name: Self::NAME.to_string(),
            parameters: serde_json::json!({ "seed": seed }),
        };
        (config, FixedState::with_seed(seed))
    }
}

impl BlobMapHashLoader for BlobMapDefaultHashLoader {
    type BuildHasher = FixedState;

    fn load(config: &BlobMapHashConfig) -> Result<Self::BuildHasher> {
        if config.name != Self::NAME {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Unsupported hash type: {}", config.name),
            ));
        }
        if let Some(seed) = config.parameters.get("seed").and_then(|v| v.as_u64()) {
            Ok(FixedState::with_seed(seed))
        } else {
            Err(Error::new(
                ErrorKind::InvalidData,
                "Missing or invalid 'seed' parameter for foldhash hash",
            ))
        }
    }
}

/// Spreads the native hash of `key` so that high bits influence the bucket mask.
#[inline]
pub fn key_hash<S, Q>(state: &S, key: &Q) -> u64
where
    S: BuildHasher,
    Q: Hash + ?Sized,
{
    let hash = state.hash_one(key);
    hash ^ (hash >> 16)
}

/// Returns `(bucket_index, key_hash)` for `key` under `bucket_count` buckets.
///
/// `bucket_count` must be a power of two; the index is the spread hash masked
/// by `bucket_count - 1`.
#[inline]
pub fn bucket_index<S, Q>(state: &S, key: &Q, bucket_count: u64) -> (usize, u64)
where
    S: BuildHasher,
    Q: Hash + ?Sized,
{
    debug_assert!(bucket_count.is_power_of_two());
    let hash = key_hash(state, key);
    ((hash & (bucket_count - 1)) as usize, hash)
}
