use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::PageId;

/// Depth ceiling for the directory; chosen so the page layout below fits
/// in one 4KB page
pub const MAX_DEPTH: u32 = 9;

/// Number of directory slots, 2^MAX_DEPTH
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const BUCKET_PAGE_IDS_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

/// Typed view over the extendible hash directory page
///
/// Layout, all fields little-endian:
///
/// ```text
/// offset 0     page_id: i32
/// offset 4     global_depth: u32
/// offset 8     bucket_page_ids: i32[DIRECTORY_ARRAY_SIZE]
/// offset 2056  local_depths: u8[DIRECTORY_ARRAY_SIZE]
/// ```
///
/// Only the first `2^global_depth` slots are live.
pub struct HashTableDirectoryPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> HashTableDirectoryPage<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data.as_ref()[PAGE_ID_OFFSET..])
    }

    pub fn global_depth(&self) -> u32 {
        LittleEndian::read_u32(&self.data.as_ref()[GLOBAL_DEPTH_OFFSET..])
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth()) - 1
    }

    /// Number of live directory slots
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        LittleEndian::read_i32(&self.data.as_ref()[BUCKET_PAGE_IDS_OFFSET + 4 * idx..])
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        self.data.as_ref()[LOCAL_DEPTHS_OFFSET + idx] as u32
    }

    /// Directory slot that pairs with `idx` at its current local depth
    pub fn split_image_index(&self, idx: usize) -> usize {
        let local_depth = self.local_depth(idx);
        debug_assert!(local_depth > 0);
        idx ^ (1 << (local_depth - 1))
    }

    /// The directory may halve only when every live slot sits below the
    /// global depth
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    /// Panic if a directory invariant is broken; used by tests
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        assert!(global_depth <= MAX_DEPTH);
        for i in 0..self.size() {
            let local_depth = self.local_depth(i);
            assert!(
                local_depth <= global_depth,
                "slot {} has local depth {} above global depth {}",
                i,
                local_depth,
                global_depth
            );
            // Slots sharing a bucket agree on the low local_depth bits
            for j in (i + 1)..self.size() {
                if self.bucket_page_id(i) == self.bucket_page_id(j) {
                    assert_eq!(self.local_depth(i), self.local_depth(j));
                    let mask = (1usize << local_depth) - 1;
                    assert_eq!(i & mask, j & mask);
                }
            }
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<T> {
    pub fn set_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data.as_mut()[PAGE_ID_OFFSET..], page_id);
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, bucket_page_id: PageId) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        LittleEndian::write_i32(
            &mut self.data.as_mut()[BUCKET_PAGE_IDS_OFFSET + 4 * idx..],
            bucket_page_id,
        );
    }

    pub fn set_local_depth(&mut self, idx: usize, local_depth: u32) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        debug_assert!(local_depth <= MAX_DEPTH);
        self.data.as_mut()[LOCAL_DEPTHS_OFFSET + idx] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        let depth = self.local_depth(idx);
        self.set_local_depth(idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, idx: usize) {
        let depth = self.local_depth(idx);
        debug_assert!(depth > 0);
        self.set_local_depth(idx, depth - 1);
    }

    /// Double the live prefix; each new upper slot aliases its lower twin
    pub fn incr_global_depth(&mut self) {
        let old_size = self.size();
        debug_assert!(old_size < DIRECTORY_ARRAY_SIZE);
        for i in 0..old_size {
            let bucket_page_id = self.bucket_page_id(i);
            let local_depth = self.local_depth(i);
            self.set_bucket_page_id(old_size + i, bucket_page_id);
            self.set_local_depth(old_size + i, local_depth);
        }
        let global_depth = self.global_depth();
        LittleEndian::write_u32(
            &mut self.data.as_mut()[GLOBAL_DEPTH_OFFSET..],
            global_depth + 1,
        );
    }

    /// Halve the live prefix; callers must have checked `can_shrink`
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        debug_assert!(global_depth > 0);
        LittleEndian::write_u32(
            &mut self.data.as_mut()[GLOBAL_DEPTH_OFFSET..],
            global_depth - 1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::PAGE_SIZE;

    #[test]
    fn test_layout_fits_in_one_page() {
        assert!(LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE <= PAGE_SIZE);
    }

    #[test]
    fn test_depth_zero_single_slot() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.set_page_id(5);
        dir.set_bucket_page_id(0, 9);

        assert_eq!(dir.page_id(), 5);
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.global_depth_mask(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.bucket_page_id(0), 9);
        assert!(!dir.can_shrink());
        dir.verify_integrity();
    }

    #[test]
    fn test_incr_global_depth_aliases_upper_half() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.set_bucket_page_id(0, 3);
        dir.set_local_depth(0, 0);

        dir.incr_global_depth();
        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.bucket_page_id(1), 3);
        assert_eq!(dir.local_depth(1), 0);
        dir.verify_integrity();

        dir.incr_global_depth();
        assert_eq!(dir.size(), 4);
        assert_eq!(dir.bucket_page_id(2), 3);
        assert_eq!(dir.bucket_page_id(3), 3);
    }

    #[test]
    fn test_split_image_index() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.set_local_depth(0b01, 1);
        assert_eq!(dir.split_image_index(0b01), 0b00);

        dir.set_local_depth(0b10, 2);
        assert_eq!(dir.split_image_index(0b10), 0b00);

        dir.set_local_depth(0b011, 3);
        assert_eq!(dir.split_image_index(0b011), 0b111);
    }

    #[test]
    fn test_can_shrink() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.set_bucket_page_id(0, 1);
        dir.incr_global_depth();
        dir.set_bucket_page_id(1, 2);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert!(!dir.can_shrink());

        dir.set_local_depth(0, 0);
        dir.set_local_depth(1, 0);
        dir.set_bucket_page_id(1, 1);
        assert!(dir.can_shrink());

        dir.decr_global_depth();
        assert_eq!(dir.global_depth(), 0);
        assert!(!dir.can_shrink());
    }
}
