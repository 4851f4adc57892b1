use std::collections::{BTreeMap, HashMap};

use crate::common::{FrameId, ReplacementPolicy, Timestamp};

use super::LruKReplacer;

/// Eviction policy for buffer pool frames.
///
/// A replacer only tracks frames the pool has told it about. Frames start
/// non-evictable; the pool flips them to evictable when their pin count drops
/// to zero. All calls happen under the pool's state lock.
pub trait Replacer: Send + Sync {
    /// Records that a frame was touched (loaded or hit).
    fn record_access(&mut self, frame_id: FrameId);

    /// Marks a frame as a candidate for eviction or withdraws it.
    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool);

    /// Chooses a victim among the evictable frames and forgets it.
    fn evict(&mut self) -> Option<FrameId>;

    /// Forgets a frame entirely (its page was deleted).
    fn remove(&mut self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Builds the replacer for a policy.
pub fn make_replacer(policy: ReplacementPolicy, num_frames: usize) -> Box<dyn Replacer> {
    match policy {
        ReplacementPolicy::Lru => Box::new(LruReplacer::new(num_frames)),
        ReplacementPolicy::Fifo => Box::new(FifoReplacer::new(num_frames)),
        ReplacementPolicy::LruK { k } => Box::new(LruKReplacer::new(k.max(1), num_frames)),
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    stamp: Timestamp,
    is_evictable: bool,
}

/// Frames ordered by a per-frame stamp; the smallest evictable stamp loses.
#[derive(Debug)]
struct StampOrder {
    clock: Timestamp,
    max_frames: usize,
    by_stamp: BTreeMap<Timestamp, FrameId>,
    frames: HashMap<FrameId, FrameEntry>,
    num_evictable: usize,
}

impl StampOrder {
    fn new(max_frames: usize) -> Self {
        Self {
            clock: 0,
            max_frames,
            by_stamp: BTreeMap::new(),
            frames: HashMap::with_capacity(max_frames),
            num_evictable: 0,
        }
    }

    /// Stamps a frame. With `refresh` false an already tracked frame keeps
    /// its original stamp.
    fn touch(&mut self, frame_id: FrameId, refresh: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let stamp = self.clock;
        self.clock += 1;

        match self.frames.get_mut(&frame_id) {
            Some(entry) if refresh => {
                self.by_stamp.remove(&entry.stamp);
                entry.stamp = stamp;
                self.by_stamp.insert(stamp, frame_id);
            }
            Some(_) => {}
            None => {
                self.frames.insert(
                    frame_id,
                    FrameEntry {
                        stamp,
                        is_evictable: false,
                    },
                );
                self.by_stamp.insert(stamp, frame_id);
            }
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        if let Some(entry) = self.frames.get_mut(&frame_id) {
            if entry.is_evictable != is_evictable {
                entry.is_evictable = is_evictable;
                if is_evictable {
                    self.num_evictable += 1;
                } else {
                    self.num_evictable -= 1;
                }
            }
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }

        let victim = self
            .by_stamp
            .values()
            .copied()
            .find(|frame_id| self.frames[frame_id].is_evictable)?;
        self.remove(victim);
        Some(victim)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(entry) = self.frames.remove(&frame_id) {
            self.by_stamp.remove(&entry.stamp);
            if entry.is_evictable {
                self.num_evictable -= 1;
            }
        }
    }
}

/// LRU replacer: evicts the least recently touched evictable frame.
#[derive(Debug)]
pub struct LruReplacer {
    order: StampOrder,
}

impl LruReplacer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            order: StampOrder::new(max_frames),
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.order.touch(frame_id, true);
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        self.order.set_evictable(frame_id, is_evictable);
    }

    fn evict(&mut self) -> Option<FrameId> {
        self.order.evict()
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.order.remove(frame_id);
    }

    fn size(&self) -> usize {
        self.order.num_evictable
    }
}

/// FIFO replacer: evicts the evictable frame whose page was loaded first.
/// Hits do not change a frame's position.
#[derive(Debug)]
pub struct FifoReplacer {
    order: StampOrder,
}

impl FifoReplacer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            order: StampOrder::new(max_frames),
        }
    }
}

impl Replacer for FifoReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.order.touch(frame_id, false);
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        self.order.set_evictable(frame_id, is_evictable);
    }

    fn evict(&mut self) -> Option<FrameId> {
        self.order.evict()
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.order.remove(frame_id);
    }

    fn size(&self) -> usize {
        self.order.num_evictable
    }
}
