use std::marker::PhantomData;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::types::{PageId, PagePtr};
use crate::index::hash::error::HashIndexError;
use crate::storage::buffer::BufferPool;
use crate::storage::page::{
    fnv1a_hash32, HashTableBucketPage, HashTableDirectoryPage, StorageCodec,
    DIRECTORY_ARRAY_SIZE,
};

enum InsertOutcome {
    Inserted,
    Duplicate,
    Full,
}

/// On-disk extendible hash table
///
/// A single directory page maps the low `global_depth` bits of a key's
/// hash to bucket pages. Buckets split (and the directory doubles) as
/// they fill; removing the last pair of a bucket folds it back into its
/// split image and lets the directory shrink.
///
/// Lookups run under a shared table latch, mutations under the exclusive
/// one. All page access goes through the buffer pool; every fetched page
/// is unpinned on every exit path, dirty when modified.
pub struct ExtendibleHashTable<K, V> {
    directory_page_id: PageId,
    buffer_pool: Arc<dyn BufferPool>,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: StorageCodec,
    V: StorageCodec,
{
    /// Create an empty table: a directory at depth zero pointing every
    /// slot at one empty bucket
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, HashIndexError> {
        let (directory_page, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket_page, bucket_page_id) = buffer_pool.new_page()?;

        {
            let mut guard = directory_page.write();
            let mut directory = HashTableDirectoryPage::new(&mut guard.data[..]);
            directory.set_page_id(directory_page_id);
            directory.set_bucket_page_id(0, bucket_page_id);
            directory.set_local_depth(0, 0);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id, true)?;

        Ok(Self {
            directory_page_id,
            buffer_pool,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    fn hash(key: &K) -> u32 {
        let mut buf = vec![0u8; K::ENCODED_SIZE];
        key.encode(&mut buf);
        fnv1a_hash32(&buf)
    }

    /// All values stored under `key`
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let _latch = self.table_latch.read();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let guard = directory_page.read();
            let directory = HashTableDirectoryPage::new(&guard.data[..]);
            let idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
            directory.bucket_page_id(idx)
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut result = Vec::new();
        {
            let guard = bucket_page.read();
            let bucket = HashTableBucketPage::<_, K, V>::new(&guard.data[..]);
            bucket.get_value(key, &mut result);
        }
        self.buffer_pool.unpin_page(bucket_page_id, false)?;

        Ok(result)
    }

    /// Insert a pair, splitting buckets and growing the directory as
    /// needed
    ///
    /// Returns `Ok(false)` for an exact duplicate, and also when the
    /// bucket cannot split because the directory is already at its
    /// maximum depth.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _latch = self.table_latch.write();
        let hash = Self::hash(key);

        loop {
            let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let bucket_page_id = {
                let guard = directory_page.read();
                let directory = HashTableDirectoryPage::new(&guard.data[..]);
                let idx = (hash & directory.global_depth_mask()) as usize;
                directory.bucket_page_id(idx)
            };

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let outcome = {
                let mut guard = bucket_page.write();
                let mut bucket = HashTableBucketPage::<_, K, V>::new(&mut guard.data[..]);
                // A duplicate never splits, even out of a full bucket
                if bucket.contains(key, value) {
                    InsertOutcome::Duplicate
                } else if bucket.insert(key, value) {
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Full
                }
            };

            match outcome {
                InsertOutcome::Inserted => {
                    self.buffer_pool.unpin_page(bucket_page_id, true)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(true);
                }
                InsertOutcome::Duplicate => {
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(false);
                }
                InsertOutcome::Full => {
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    let split = self.split_bucket(&directory_page, hash)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, split)?;
                    if !split {
                        return Ok(false);
                    }
                    // The key's bucket may still be full when its pairs all
                    // share the new bit; the next round splits again
                }
            }
        }
    }

    /// Split the bucket covering `hash`, growing the directory when the
    /// bucket already sits at global depth
    ///
    /// Returns `Ok(false)` when the directory is exhausted. The caller
    /// holds the directory page pinned.
    fn split_bucket(&self, directory_page: &PagePtr, hash: u32) -> Result<bool, HashIndexError> {
        let mut guard = directory_page.write();
        let mut directory = HashTableDirectoryPage::new(&mut guard.data[..]);

        let mut idx = (hash & directory.global_depth_mask()) as usize;
        if directory.local_depth(idx) == directory.global_depth() {
            if directory.size() >= DIRECTORY_ARRAY_SIZE {
                return Ok(false);
            }
            directory.incr_global_depth();
            idx = (hash & directory.global_depth_mask()) as usize;
            debug!("hash directory grew to global depth {}", directory.global_depth());
        }

        let local_depth = directory.local_depth(idx);
        let old_bucket_id = directory.bucket_page_id(idx);
        let (new_bucket_page, new_bucket_id) = self.buffer_pool.new_page()?;
        debug!(
            "splitting bucket {} at local depth {} into {}",
            old_bucket_id, local_depth, new_bucket_id
        );

        // Every slot covering the old bucket deepens by one; those whose
        // distinguishing bit differs from the key's move to the new bucket
        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == old_bucket_id {
                if ((i >> local_depth) & 1) != ((idx >> local_depth) & 1) {
                    directory.set_bucket_page_id(i, new_bucket_id);
                }
                directory.incr_local_depth(i);
            }
        }

        // Redistribute the old bucket's pairs in place, keeping slot
        // indices stable across the move
        let old_bucket_page = self.buffer_pool.fetch_page(old_bucket_id)?;
        {
            let mut old_guard = old_bucket_page.write();
            let mut new_guard = new_bucket_page.write();
            let mut old_bucket = HashTableBucketPage::<_, K, V>::new(&mut old_guard.data[..]);
            let mut new_bucket = HashTableBucketPage::<_, K, V>::new(&mut new_guard.data[..]);

            for slot in 0..old_bucket.capacity() {
                if !old_bucket.is_readable(slot) {
                    continue;
                }
                let slot_key = old_bucket.key_at(slot);
                let target = (Self::hash(&slot_key) & directory.global_depth_mask()) as usize;
                if directory.bucket_page_id(target) == new_bucket_id {
                    let slot_value = old_bucket.value_at(slot);
                    new_bucket.put_slot(slot, &slot_key, &slot_value);
                    old_bucket.delete_at(slot);
                }
            }
        }
        self.buffer_pool.unpin_page(old_bucket_id, true)?;
        self.buffer_pool.unpin_page(new_bucket_id, true)?;

        Ok(true)
    }

    /// Remove the pair matching both key and value
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _latch = self.table_latch.write();
        let hash = Self::hash(key);

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let (idx, bucket_page_id) = {
            let guard = directory_page.read();
            let directory = HashTableDirectoryPage::new(&guard.data[..]);
            let idx = (hash & directory.global_depth_mask()) as usize;
            (idx, directory.bucket_page_id(idx))
        };

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let (removed, now_empty) = {
            let mut guard = bucket_page.write();
            let mut bucket = HashTableBucketPage::<_, K, V>::new(&mut guard.data[..]);
            let removed = bucket.remove(key, value);
            (removed, bucket.is_empty())
        };
        self.buffer_pool.unpin_page(bucket_page_id, removed)?;

        let mut directory_dirty = false;
        if removed && now_empty {
            directory_dirty = self.merge_bucket(&directory_page, idx)?;
        }
        self.buffer_pool.unpin_page(self.directory_page_id, directory_dirty)?;

        Ok(removed)
    }

    /// Fold the empty bucket at directory slot `idx` into its split
    /// image, shrinking the directory while every slot sits below global
    /// depth and cascading into the surviving bucket when it is empty too
    ///
    /// Returns whether the directory page was modified. The caller holds
    /// the directory page pinned.
    fn merge_bucket(&self, directory_page: &PagePtr, mut idx: usize) -> Result<bool, HashIndexError> {
        let mut guard = directory_page.write();
        let mut directory = HashTableDirectoryPage::new(&mut guard.data[..]);
        let mut dirty = false;

        loop {
            if directory.local_depth(idx) == 0 {
                break;
            }
            let image_idx = directory.split_image_index(idx);
            if directory.local_depth(idx) != directory.local_depth(image_idx) {
                break;
            }
            let empty_bucket_id = directory.bucket_page_id(idx);
            let image_bucket_id = directory.bucket_page_id(image_idx);
            if empty_bucket_id == image_bucket_id {
                break;
            }

            // The first round merges the bucket the caller just emptied;
            // later rounds must confirm emptiness themselves
            let candidate_page = self.buffer_pool.fetch_page(empty_bucket_id)?;
            let is_empty = {
                let bucket_guard = candidate_page.read();
                let bucket =
                    HashTableBucketPage::<_, K, V>::new(&bucket_guard.data[..]);
                bucket.is_empty()
            };
            self.buffer_pool.unpin_page(empty_bucket_id, false)?;
            if !is_empty {
                break;
            }

            for i in 0..directory.size() {
                if directory.bucket_page_id(i) == empty_bucket_id {
                    directory.set_bucket_page_id(i, image_bucket_id);
                }
            }
            for i in 0..directory.size() {
                if directory.bucket_page_id(i) == image_bucket_id {
                    directory.decr_local_depth(i);
                }
            }
            self.buffer_pool.delete_page(empty_bucket_id)?;
            dirty = true;
            debug!("merged bucket {} into {}", empty_bucket_id, image_bucket_id);

            while directory.can_shrink() {
                directory.decr_global_depth();
                debug!("hash directory shrank to global depth {}", directory.global_depth());
            }

            // Continue from a slot covering the surviving bucket
            match (0..directory.size()).find(|&i| directory.bucket_page_id(i) == image_bucket_id) {
                Some(i) => idx = i,
                None => break,
            }
        }

        Ok(dirty)
    }

    /// Global depth of the directory; used by tests and diagnostics
    pub fn global_depth(&self) -> Result<u32, HashIndexError> {
        let _latch = self.table_latch.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = {
            let guard = directory_page.read();
            HashTableDirectoryPage::new(&guard.data[..]).global_depth()
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(depth)
    }

    /// Assert the directory invariants; used by tests
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let _latch = self.table_latch.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let guard = directory_page.read();
            HashTableDirectoryPage::new(&guard.data[..]).verify_integrity();
        }
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}
