use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// Common surface of the buffer pool variants
///
/// Exactly two implementations exist: [`BufferPoolManager`] (a single
/// instance) and [`ParallelBufferPoolManager`] (a sharded front end over
/// several instances).
///
/// [`ParallelBufferPoolManager`]: crate::storage::buffer::ParallelBufferPoolManager
pub trait BufferPool: Send + Sync {
    /// Allocate a fresh page, pinned in a frame
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError>;

    /// Fetch a page, pinning it in a frame
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError>;

    /// Release one pin, optionally marking the page dirty
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError>;

    /// Write a resident page back to disk
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Write every resident page back to disk
    fn flush_all_pages(&self) -> Result<(), BufferPoolError>;

    /// Drop a page from the pool and release its id
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Total number of frames
    fn pool_size(&self) -> usize;
}

/// Page table and free list, guarded together by the instance latch
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// A single buffer pool instance
///
/// Owns a fixed array of frames and serves fetch/new/unpin/flush/delete
/// under one latch. Page ids are allocated here, stepping by
/// `num_instances` so that every id produced by instance `k` of `N`
/// satisfies `id % N == k`.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    next_page_id: AtomicI32,
    frames: Vec<FramePtr>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Create a standalone instance owning all page ids
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_instance(pool_size, 1, 0, disk_manager)
    }

    /// Create instance `instance_index` of a pool of `num_instances`
    pub fn new_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(num_instances > 0, "num_instances must be > 0");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicI32::new(instance_index as i32),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
        }
    }

    /// Allocate a fresh durable page id belonging to this instance
    fn allocate_page(&self) -> PageId {
        let page_id = self
            .next_page_id
            .fetch_add(self.num_instances as i32, Ordering::SeqCst);
        debug_assert_eq!(page_id as u32 % self.num_instances, self.instance_index);
        page_id
    }

    /// Find a frame to hold a new page: free list first, then the replacer
    ///
    /// A dirty victim is written back before its frame is handed out, and
    /// its old mapping is removed. Fails when every frame is pinned.
    fn find_victim(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BufferPoolError::BufferPoolFull)?;
        let mut frame = self.frames[frame_id].write();
        let old_page_id = {
            let page = frame.page.read();
            if frame.is_dirty {
                debug!("writing back dirty victim page {}", page.page_id);
                self.disk_manager.write_page(page.page_id, &page.data)?;
            }
            page.page_id
        };
        frame.is_dirty = false;
        if old_page_id != INVALID_PAGE_ID {
            state.page_table.remove(&old_page_id);
        }
        Ok(frame_id)
    }
}

impl BufferPool for BufferPoolManager {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.find_victim(&mut state)?;
        let page_id = self.allocate_page();

        let mut frame = self.frames[frame_id].write();
        {
            let mut page = frame.page.write();
            page.reset();
            page.page_id = page_id;
        }
        frame.pin_count = 1;
        frame.is_dirty = false;

        state.page_table.insert(page_id, frame_id);
        Ok((frame.page.clone(), page_id))
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.replacer.pin(frame_id);
            let mut frame = self.frames[frame_id].write();
            frame.pin_count += 1;
            return Ok(frame.page.clone());
        }

        let frame_id = self.find_victim(&mut state)?;

        let mut frame = self.frames[frame_id].write();
        {
            let mut page = frame.page.write();
            page.page_id = page_id;
            self.disk_manager.read_page(page_id, &mut page.data)?;
        }
        frame.pin_count = 1;
        frame.is_dirty = false;

        state.page_table.insert(page_id, frame_id);
        Ok(frame.page.clone())
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let &frame_id = state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let mut frame = self.frames[frame_id].write();
        if is_dirty {
            frame.is_dirty = true;
        }
        if frame.pin_count > 0 {
            frame.pin_count -= 1;
        }
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        // Resolve the frame under the latch, then drop it before touching
        // the page lock: a caller may hold a pinned page's lock while
        // waiting on this latch.
        let frame = {
            let state = self.state.lock();
            let &frame_id = state
                .page_table
                .get(&page_id)
                .ok_or(BufferPoolError::PageNotFound(page_id))?;
            self.frames[frame_id].clone()
        };

        // Write unconditionally; the dirty bit is left as-is so a flush
        // can never race a concurrent modification into silence.
        let frame = frame.read();
        let page = frame.page.read();
        if page.page_id != page_id {
            // Evicted between the lookup and here; its contents reached
            // disk during eviction
            return Ok(());
        }
        self.disk_manager.write_page(page.page_id, &page.data)?;
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let resident: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in resident {
            match self.flush_page(page_id) {
                Ok(()) | Err(BufferPoolError::PageNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(()),
        };

        let mut frame = self.frames[frame_id].write();
        if frame.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        self.replacer.pin(frame_id);
        {
            let mut page = frame.page.write();
            page.reset();
            page.page_id = INVALID_PAGE_ID;
        }
        frame.is_dirty = false;

        state.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_pool(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(file.path()).unwrap());
        (BufferPoolManager::new(pool_size, disk_manager), file)
    }

    #[test]
    fn test_new_page_pins_frame() {
        let (pool, _file) = create_pool(3);

        let (page, page_id) = pool.new_page().unwrap();
        assert_eq!(page.read().page_id, page_id);
        assert!(page.read().data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_id_sharding() {
        let file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(file.path()).unwrap());
        let pool = BufferPoolManager::new_instance(4, 3, 1, disk_manager);

        for _ in 0..4 {
            let (_, page_id) = pool.new_page().unwrap();
            assert_eq!(page_id % 3, 1);
            pool.unpin_page(page_id, false).unwrap();
        }
    }

    #[test]
    fn test_unpin_below_zero_is_clamped() {
        let (pool, _file) = create_pool(3);

        let (_, page_id) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false).unwrap();
        // Second unpin of a resident page with pin count zero is a no-op
        pool.unpin_page(page_id, false).unwrap();

        // Still resident and fetchable
        let page = pool.fetch_page(page_id).unwrap();
        assert_eq!(page.read().page_id, page_id);
    }

    #[test]
    fn test_unpin_absent_page() {
        let (pool, _file) = create_pool(3);
        assert!(matches!(
            pool.unpin_page(99, false),
            Err(BufferPoolError::PageNotFound(99))
        ));
    }

    #[test]
    fn test_delete_absent_page_is_ok() {
        let (pool, _file) = create_pool(3);
        pool.delete_page(42).unwrap();
    }

    #[test]
    fn test_delete_pinned_page_fails() {
        let (pool, _file) = create_pool(3);
        let (_, page_id) = pool.new_page().unwrap();
        assert!(matches!(
            pool.delete_page(page_id),
            Err(BufferPoolError::PagePinned(p)) if p == page_id
        ));
    }
}
