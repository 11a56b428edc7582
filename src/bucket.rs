use std::borrow::Borrow;

use crate::BlobMapKeyIndex;

/// Borrowed view over one hash bucket of a [`BlobMap`](crate::BlobMap).
///
/// A bucket is three parallel slices into the owning arena: the distinct keys,
/// one [`BlobMapKeyIndex`] per key sorted ascending by hash, and the values of
/// every key laid out contiguously. Views never allocate and live as long as
/// the map they were taken from.
#[derive(Debug)]
pub struct BlobMapBucket<'a, K, V> {
    keys: &'a [K],
    key_indexes: &'a [BlobMapKeyIndex],
    values: &'a [V],
}

impl<K, V> Clone for BlobMapBucket<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for BlobMapBucket<'_, K, V> {}

impl<'a, K, V> BlobMapBucket<'a, K, V> {
    pub(crate) fn new(keys: &'a [K], key_indexes: &'a [BlobMapKeyIndex], values: &'a [V]) -> Self {
        debug_assert_eq!(keys.len(), key_indexes.len());
        Self {
            keys,
            key_indexes,
            values,
        }
    }

    /// Distinct keys of this bucket, in stored (hash) order.
    pub fn keys(&self) -> &'a [K] {
        self.keys
    }

    pub fn key_indexes(&self) -> &'a [BlobMapKeyIndex] {
        self.key_indexes
    }

    /// Every value of the bucket, grouped by key.
    pub fn values(&self) -> &'a [V] {
        self.values
    }

    /// Number of distinct keys in the bucket.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates `(key, values)` pairs in stored order.
    pub fn iter(self) -> impl ExactSizeIterator<Item = (&'a K, &'a [V])> + 'a {
        let values = self.values;
        self.keys
            .iter()
            .zip(self.key_indexes)
            .map(move |(key, index)| (key, &values[index.range()]))
    }

    /// Returns whether `key` (whose spread hash is `hash`) is stored here.
    pub fn contains_key<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.keys.len() {
            0 => false,
            1 => self.keys[0].borrow() == key,
            _ => self.binary_search(key, hash).is_some(),
        }
    }

    /// Returns the values stored for `key`, or an empty slice when absent.
    ///
    /// The returned slice points straight into the arena.
    pub fn get_values_for_key<Q>(&self, key: &Q, hash: u64) -> &'a [V]
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.find_key_index(key, hash) {
            Some(i) => &self.values[self.key_indexes[i].range()],
            None => &[],
        }
    }

    /// Position of `key` in [`keys`](Self::keys) and [`key_indexes`](Self::key_indexes).
    pub fn find_key_index<Q>(&self, key: &Q, hash: u64) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.keys.len() {
            0 => None,
            1 => (self.keys[0].borrow() == key).then_some(0),
            _ => self.binary_search(key, hash),
        }
    }

    fn binary_search<Q>(&self, key: &Q, hash: u64) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let hit = self
            .key_indexes
            .binary_search_by_key(&hash, |index| index.hash)
            .ok()?;
        if self.keys[hit].borrow() == key {
            return Some(hit);
        }

        // Distinct keys sharing a hash sit next to each other; walk the run
        // backward then forward from the hit, stopping once the hash changes.
        let same_hash = |i: &usize| self.key_indexes[*i].hash == hash;
        let is_key = |i: &usize| self.keys[*i].borrow() == key;
        if let Some(i) = (0..hit).rev().take_while(same_hash).find(is_key) {
            return Some(i);
        }
        (hit + 1..self.keys.len())
            .take_while(same_hash)
            .find(is_key)
    }
}
