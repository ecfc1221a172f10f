use crate::models::geometry::GlobalRect;
use crate::models::window::ProcessId;
use std::collections::VecDeque;
use tracing::debug;

/// Default number of remembered pre-maximize frames
pub const DEFAULT_FRAME_CACHE_CAPACITY: usize = 10;

/// Frames windows had before they were maximized, keyed by owning process.
///
/// Holds at most one entry per process. Eviction is FIFO by insertion order,
/// not by recency of use.
#[derive(Debug, Clone)]
pub struct PreviousFrameCache {
    entries: VecDeque<(ProcessId, GlobalRect)>,
    capacity: usize,
}

impl Default for PreviousFrameCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CACHE_CAPACITY)
    }
}

impl PreviousFrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `frame` for `pid`, replacing any stale entry for the same process
    pub fn push(&mut self, pid: ProcessId, frame: GlobalRect) {
        self.entries.retain(|(existing, _)| *existing != pid);
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                debug!(pid = %evicted, "Evicting oldest pre-maximize frame");
            }
        }
        self.entries.push_back((pid, frame));
    }

    /// Remove and return the frame remembered for `pid`
    pub fn pop(&mut self, pid: ProcessId) -> Option<GlobalRect> {
        let index = self.entries.iter().position(|(existing, _)| *existing == pid)?;
        self.entries.remove(index).map(|(_, frame)| frame)
    }

    pub fn get(&self, pid: ProcessId) -> Option<GlobalRect> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == pid)
            .map(|(_, frame)| *frame)
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.get(pid).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: i32) -> GlobalRect {
        GlobalRect::from_xywh(n, n, 100 + n, 100 + n)
    }

    #[test]
    fn eleventh_push_evicts_first_inserted() {
        let mut cache = PreviousFrameCache::new(10);
        for pid in 1..=11 {
            cache.push(ProcessId(pid), frame(pid));
        }

        assert_eq!(cache.len(), 10);
        assert!(!cache.contains(ProcessId(1)));
        for pid in 2..=11 {
            assert_eq!(cache.get(ProcessId(pid)), Some(frame(pid)));
        }
    }

    #[test]
    fn pushing_same_process_replaces_entry() {
        let mut cache = PreviousFrameCache::new(3);
        cache.push(ProcessId(7), frame(1));
        cache.push(ProcessId(7), frame(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(ProcessId(7)), Some(frame(2)));
    }

    #[test]
    fn replaced_entry_moves_to_back_of_queue() {
        let mut cache = PreviousFrameCache::new(2);
        cache.push(ProcessId(1), frame(1));
        cache.push(ProcessId(2), frame(2));
        cache.push(ProcessId(1), frame(3));
        cache.push(ProcessId(3), frame(4));

        assert!(!cache.contains(ProcessId(2)));
        assert_eq!(cache.get(ProcessId(1)), Some(frame(3)));
    }

    #[test]
    fn pop_removes_entry() {
        let mut cache = PreviousFrameCache::default();
        cache.push(ProcessId(42), frame(5));

        assert_eq!(cache.pop(ProcessId(42)), Some(frame(5)));
        assert_eq!(cache.pop(ProcessId(42)), None);
        assert!(cache.is_empty());
    }
}
