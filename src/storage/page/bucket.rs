use std::marker::PhantomData;

use crate::common::types::PAGE_SIZE;
use crate::storage::page::codec::StorageCodec;

/// Number of slots a bucket page can hold for a given entry width
///
/// Each slot costs its encoded bytes plus two bitmap bits, hence
/// `4 * PAGE_SIZE / (4 * entry_size + 1)`.
pub fn bucket_array_size(entry_size: usize) -> usize {
    (4 * PAGE_SIZE) / (4 * entry_size + 1)
}

/// Typed view over an extendible hash bucket page
///
/// Layout: `occupied` bitmap, `readable` bitmap, then the `(K, V)` slot
/// array. Bit `i` of a bitmap lives in byte `i / 8` at offset `i % 8`.
/// A slot's `occupied` bit records that it has ever held a pair; the
/// `readable` bit records that it holds a live one.
pub struct HashTableBucketPage<T, K, V> {
    data: T,
    capacity: usize,
    _marker: PhantomData<(K, V)>,
}

impl<T, K, V> HashTableBucketPage<T, K, V>
where
    T: AsRef<[u8]>,
    K: StorageCodec,
    V: StorageCodec,
{
    pub fn new(data: T) -> Self {
        let capacity = bucket_array_size(K::ENCODED_SIZE + V::ENCODED_SIZE);
        Self {
            data,
            capacity,
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bitmap_bytes(&self) -> usize {
        (self.capacity + 7) / 8
    }

    fn readable_offset(&self) -> usize {
        self.bitmap_bytes()
    }

    fn array_offset(&self) -> usize {
        2 * self.bitmap_bytes()
    }

    fn slot_offset(&self, idx: usize) -> usize {
        debug_assert!(idx < self.capacity);
        self.array_offset() + idx * (K::ENCODED_SIZE + V::ENCODED_SIZE)
    }

    pub fn is_occupied(&self, idx: usize) -> bool {
        debug_assert!(idx < self.capacity);
        self.data.as_ref()[idx / 8] & (1 << (idx % 8)) != 0
    }

    pub fn is_readable(&self, idx: usize) -> bool {
        debug_assert!(idx < self.capacity);
        self.data.as_ref()[self.readable_offset() + idx / 8] & (1 << (idx % 8)) != 0
    }

    pub fn key_at(&self, idx: usize) -> K {
        let offset = self.slot_offset(idx);
        K::decode(&self.data.as_ref()[offset..offset + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, idx: usize) -> V {
        let offset = self.slot_offset(idx) + K::ENCODED_SIZE;
        V::decode(&self.data.as_ref()[offset..offset + V::ENCODED_SIZE])
    }

    /// Append every live value stored under `key` to `result`
    pub fn get_value(&self, key: &K, result: &mut Vec<V>) -> bool {
        let mut found = false;
        for idx in 0..self.capacity {
            if self.is_readable(idx) && self.key_at(idx) == *key {
                result.push(self.value_at(idx));
                found = true;
            }
        }
        found
    }

    /// Whether the exact pair is already stored
    pub fn contains(&self, key: &K, value: &V) -> bool {
        (0..self.capacity).any(|idx| {
            self.is_readable(idx) && self.key_at(idx) == *key && self.value_at(idx) == *value
        })
    }

    pub fn num_readable(&self) -> usize {
        (0..self.capacity).filter(|&idx| self.is_readable(idx)).count()
    }

    pub fn is_full(&self) -> bool {
        self.num_readable() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }
}

impl<T, K, V> HashTableBucketPage<T, K, V>
where
    T: AsRef<[u8]> + AsMut<[u8]>,
    K: StorageCodec,
    V: StorageCodec,
{
    fn set_occupied(&mut self, idx: usize) {
        self.data.as_mut()[idx / 8] |= 1 << (idx % 8);
    }

    fn set_readable(&mut self, idx: usize) {
        let offset = self.readable_offset();
        self.data.as_mut()[offset + idx / 8] |= 1 << (idx % 8);
    }

    /// Insert a pair into the first free slot
    ///
    /// Rejects an exact `(key, value)` duplicate and rejects a full
    /// bucket; callers distinguish the two via `is_full`.
    pub fn insert(&mut self, key: &K, value: &V) -> bool {
        if self.contains(key, value) {
            return false;
        }
        for idx in 0..self.capacity {
            if !self.is_readable(idx) {
                self.put_slot(idx, key, value);
                return true;
            }
        }
        false
    }

    /// Remove the live pair matching both key and value
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        for idx in 0..self.capacity {
            if self.is_readable(idx) && self.key_at(idx) == *key && self.value_at(idx) == *value {
                self.remove_at(idx);
                return true;
            }
        }
        false
    }

    /// Clear the readable bit, leaving the occupied bit as a tombstone
    pub fn remove_at(&mut self, idx: usize) {
        debug_assert!(idx < self.capacity);
        let offset = self.readable_offset();
        self.data.as_mut()[offset + idx / 8] &= !(1 << (idx % 8));
    }

    /// Clear both bits for one slot; used when a pair migrates to the
    /// split image during redistribution
    pub fn delete_at(&mut self, idx: usize) {
        debug_assert!(idx < self.capacity);
        self.data.as_mut()[idx / 8] &= !(1 << (idx % 8));
        let offset = self.readable_offset();
        self.data.as_mut()[offset + idx / 8] &= !(1 << (idx % 8));
    }

    /// Write a pair into a specific slot and mark it live
    pub fn put_slot(&mut self, idx: usize, key: &K, value: &V) {
        let offset = self.slot_offset(idx);
        key.encode(&mut self.data.as_mut()[offset..offset + K::ENCODED_SIZE]);
        value.encode(
            &mut self.data.as_mut()
                [offset + K::ENCODED_SIZE..offset + K::ENCODED_SIZE + V::ENCODED_SIZE],
        );
        self.set_occupied(idx);
        self.set_readable(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Rid;

    type IntBucket<'a> = HashTableBucketPage<&'a mut [u8], i32, i32>;

    #[test]
    fn test_capacity_fits_in_page() {
        for entry_size in [8, 12, 16, 24] {
            let capacity = bucket_array_size(entry_size);
            let bitmap_bytes = (capacity + 7) / 8;
            assert!(2 * bitmap_bytes + capacity * entry_size <= PAGE_SIZE);
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut buf[..]);

        assert!(bucket.insert(&1, &10));
        assert!(bucket.insert(&1, &11));
        assert!(bucket.insert(&2, &20));

        let mut values = Vec::new();
        assert!(bucket.get_value(&1, &mut values));
        assert_eq!(values, vec![10, 11]);

        values.clear();
        assert!(!bucket.get_value(&3, &mut values));
        assert!(values.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut buf[..]);

        assert!(bucket.insert(&7, &70));
        assert!(!bucket.insert(&7, &70));
        assert_eq!(bucket.num_readable(), 1);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut buf[..]);
        let capacity = bucket.capacity();

        for i in 0..capacity {
            assert!(bucket.insert(&(i as i32), &0));
        }
        assert!(bucket.is_full());
        assert!(!bucket.insert(&-1, &0));
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut buf[..]);

        assert!(bucket.insert(&5, &50));
        assert!(bucket.remove(&5, &50));
        assert!(!bucket.remove(&5, &50));
        assert!(bucket.is_empty());
        // The slot was used once, so its tombstone remains
        assert!(bucket.is_occupied(0));
        assert!(!bucket.is_readable(0));

        // The freed slot is reusable
        assert!(bucket.insert(&6, &60));
        assert_eq!(bucket.key_at(0), 6);
    }

    #[test]
    fn test_delete_at_clears_both_bits() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket = IntBucket::new(&mut buf[..]);

        assert!(bucket.insert(&1, &10));
        assert!(bucket.insert(&2, &20));
        bucket.delete_at(0);

        assert!(!bucket.is_occupied(0));
        assert!(!bucket.is_readable(0));
        // Neighbouring slot is untouched
        assert!(bucket.is_occupied(1));
        assert!(bucket.is_readable(1));
    }

    #[test]
    fn test_rid_values() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut bucket: HashTableBucketPage<&mut [u8], i64, Rid> =
            HashTableBucketPage::new(&mut buf[..]);

        let rid = Rid::new(3, 14);
        assert!(bucket.insert(&99, &rid));
        let mut values = Vec::new();
        assert!(bucket.get_value(&99, &mut values));
        assert_eq!(values, vec![rid]);
    }
}
