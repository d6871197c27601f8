use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::{BufferPool, BufferPoolManager};
use crate::storage::disk::DiskManager;

/// Sharded front end over several buffer pool instances
///
/// Page-id space is split by `page_id % num_instances`, so each shard
/// serves a disjoint slice of pages under its own latch. `new_page`
/// rotates its starting shard to spread fresh allocations.
pub struct ParallelBufferPoolManager {
    instances: Vec<BufferPoolManager>,
    start_index: AtomicUsize,
}

impl ParallelBufferPoolManager {
    pub fn new(num_instances: u32, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");

        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolManager::new_instance(pool_size, num_instances, i, disk_manager.clone())
            })
            .collect();

        Self {
            instances,
            start_index: AtomicUsize::new(0),
        }
    }

    /// Instance responsible for the given page id
    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id.rem_euclid(self.instances.len() as i32) as usize]
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let num = self.instances.len();
        let start = self.start_index.load(Ordering::SeqCst);

        let mut result = Err(BufferPoolError::BufferPoolFull);
        for offset in 0..num {
            match self.instances[(start + offset) % num].new_page() {
                Ok(ok) => {
                    result = Ok(ok);
                    break;
                }
                Err(BufferPoolError::BufferPoolFull) => continue,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        // The starting shard advances once per call, successful or not
        self.start_index.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }

    fn pool_size(&self) -> usize {
        self.instances.len() * self.instances[0].pool_size()
    }
}
