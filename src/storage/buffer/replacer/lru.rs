use std::collections::{HashSet, VecDeque};
use parking_lot::Mutex;

use crate::common::types::FrameId;

struct LruState {
    /// Frames in unpin order (front = next victim)
    list: VecDeque<FrameId>,
    /// Set of frames in the list for O(1) membership testing
    members: HashSet<FrameId>,
}

/// LRU replacement policy over unpinned buffer-pool frames
///
/// Tracks frames whose pin count has dropped to zero, in the order they
/// became unpinned. `victim` evicts from the head, so among unpinned
/// frames the one unpinned earliest goes first.
pub struct LruReplacer {
    state: Mutex<LruState>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                list: VecDeque::with_capacity(pool_size),
                members: HashSet::with_capacity(pool_size),
            }),
            capacity: pool_size,
        }
    }

    /// Remove and return the least recently unpinned frame
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.list.pop_front()?;
        state.members.remove(&frame_id);
        Some(frame_id)
    }

    /// Remove a frame from the eviction candidates (a caller pinned it)
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.remove(&frame_id) {
            state.list.retain(|&id| id != frame_id);
        }
    }

    /// Add a frame to the tail of the eviction candidates
    ///
    /// A frame that is already a candidate stays where it is: the order is
    /// strictly the order of becoming unpinned. The list can never outgrow
    /// the pool, every frame has at most one entry.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.contains(&frame_id) {
            return;
        }
        debug_assert!(state.list.len() < self.capacity);
        state.list.push_back(frame_id);
        state.members.insert(frame_id);
    }

    /// Number of frames currently eligible for eviction
    pub fn len(&self) -> usize {
        self.state.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
