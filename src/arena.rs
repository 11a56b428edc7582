use std::io::{Error, ErrorKind, Result};

use serde::{Deserialize, Serialize};

use crate::{
    BlobMapBucket, BlobMapBucketMeta, BlobMapHashConfig, BlobMapHeader, BlobMapKeyIndex,
    MAGIC_NUMBER,
};

/// Single contiguous storage backing a [`BlobMap`](crate::BlobMap).
///
/// Every bucket is described by offsets into the flat `keys`, `key_indexes`
/// and `values` arrays; nothing inside the arena is an address, so the whole
/// structure can be moved, cloned or copied out as bytes with
/// [`to_bytes`](Self::to_bytes) and restored elsewhere with
/// [`from_bytes`](Self::from_bytes) without fixing anything up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlobMapArena<K, V> {
    pub header: BlobMapHeader,
    pub hash_config: BlobMapHashConfig,
    pub buckets: Vec<BlobMapBucketMeta>,
    pub keys: Vec<K>,
    pub key_indexes: Vec<BlobMapKeyIndex>,
    pub values: Vec<V>,
}

impl<K, V> BlobMapArena<K, V> {
    /// Returns a borrowed view over bucket `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn bucket(&self, index: usize) -> BlobMapBucket<'_, K, V> {
        let meta = &self.buckets[index];
        let keys = meta.key_range();
        BlobMapBucket::new(
            &self.keys[keys.clone()],
            &self.key_indexes[keys],
            &self.values[meta.value_range()],
        )
    }

    /// Checks the layout invariants every lookup relies on.
    ///
    /// Buckets must tile the flat arrays in order with nothing left over.
    /// Every key's value run must stay inside its bucket, every stored hash
    /// must map to the bucket holding it, and runs must be sorted by hash.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidData` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let bucket_count = self.header.bucket_count;
        if !bucket_count.is_power_of_two() {
            return Err(invalid(format!(
                "bucket count {} is not a power of two",
                bucket_count
            )));
        }
        if self.buckets.len() as u64 != bucket_count {
            return Err(invalid(format!(
                "header declares {} buckets, found {}",
                bucket_count,
                self.buckets.len()
            )));
        }
        if self.keys.len() != self.key_indexes.len() {
            return Err(invalid(format!(
                "{} keys but {} key indexes",
                self.keys.len(),
                self.key_indexes.len()
            )));
        }
        if self.values.len() as u64 != self.header.value_count {
            return Err(invalid(format!(
                "header declares {} values, found {}",
                self.header.value_count,
                self.values.len()
            )));
        }

        let mut key_offset = 0u64;
        let mut value_offset = 0u64;
        for (i, meta) in self.buckets.iter().enumerate() {
            if meta.key_offset != key_offset || meta.value_offset != value_offset {
                return Err(invalid(format!("bucket {} is not contiguous", i)));
            }
            key_offset = key_offset.saturating_add(meta.key_count);
            value_offset = value_offset.saturating_add(meta.value_count);
            if key_offset > self.keys.len() as u64 || value_offset > self.values.len() as u64 {
                return Err(invalid(format!("bucket {} exceeds the arena", i)));
            }

            let mut expected_first = 0u64;
            let mut previous_hash = None;
            for index in &self.key_indexes[meta.key_range()] {
                if index.element_count == 0 || index.first_index != expected_first {
                    return Err(invalid(format!("bucket {} has a malformed key index", i)));
                }
                if index.hash & (bucket_count - 1) != i as u64 {
                    return Err(invalid(format!(
                        "hash {:#x} does not belong in bucket {}",
                        index.hash, i
                    )));
                }
                if previous_hash.is_some_and(|hash| hash > index.hash) {
                    return Err(invalid(format!("bucket {} is not sorted by hash", i)));
                }
                previous_hash = Some(index.hash);
                expected_first = expected_first.saturating_add(index.element_count);
            }
            if expected_first != meta.value_count {
                return Err(invalid(format!(
                    "bucket {} key indexes cover {} of {} values",
                    i, expected_first, meta.value_count
                )));
            }
        }
        if key_offset != self.keys.len() as u64 {
            return Err(invalid(format!(
                "buckets cover {} of {} keys",
                key_offset,
                self.keys.len()
            )));
        }
        if value_offset != self.values.len() as u64 {
            return Err(invalid(format!(
                "buckets cover {} of {} values",
                value_offset,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Copies the arena out as a relocatable byte image.
    ///
    /// The image is the big-endian magic number followed by the MessagePack
    /// encoding of the arena.
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value fails to serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>>
    where
        K: Serialize,
        V: Serialize,
    {
        let mut bytes = MAGIC_NUMBER.to_be_bytes().to_vec();
        rmp_serde::encode::write(&mut bytes, self)
            .map_err(|e| Error::other(format!("Fail to serialize arena: {}", e)))?;
        Ok(bytes)
    }

    /// Restores an arena from an image produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidData` when the magic number is wrong, the
    /// payload cannot be decoded, or the decoded arena fails
    /// [`validate`](Self::validate).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        K: for<'de> Deserialize<'de>,
        V: for<'de> Deserialize<'de>,
    {
        const S: usize = std::mem::size_of::<u64>();
        let Some((magic, payload)) = bytes.split_first_chunk::<S>() else {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "Arena image is shorter than its header",
            ));
        };
        let magic_number = u64::from_be_bytes(*magic);
        if magic_number != MAGIC_NUMBER {
            return Err(invalid(format!("Invalid magic number: {}", magic_number)));
        }
        let arena: Self = rmp_serde::from_slice(payload)
            .map_err(|e| invalid(format!("Failed to deserialize BlobMapArena: {}", e)))?;
        arena.validate()?;
        Ok(arena)
    }
}

fn invalid(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}
