use std::collections::{HashMap, VecDeque};

use crate::common::{FrameId, Timestamp};

use super::Replacer;

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// History of access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// LRU-K replacement policy.
///
/// Evicts the frame whose backward k-distance (time since its kth most
/// recent access) is largest. Frames with fewer than k accesses count as
/// +inf; among those the frame with the earliest access goes first, which
/// degrades to plain LRU ordering for k = 1.
#[derive(Debug)]
pub struct LruKReplacer {
    k: usize,
    max_frames: usize,
    current_timestamp: Timestamp,
    frame_info: HashMap<FrameId, FrameAccessInfo>,
    num_evictable: usize,
}

impl LruKReplacer {
    pub fn new(k: usize, max_frames: usize) -> Self {
        Self {
            k,
            max_frames,
            current_timestamp: 0,
            frame_info: HashMap::with_capacity(max_frames),
            num_evictable: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        self.frame_info
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        if let Some(info) = self.frame_info.get_mut(&frame_id) {
            if info.is_evictable != is_evictable {
                if is_evictable {
                    self.num_evictable += 1;
                } else {
                    self.num_evictable -= 1;
                }
                info.is_evictable = is_evictable;
            }
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }

        let now = self.current_timestamp;
        let mut victim: Option<(FrameId, Option<Timestamp>, Option<Timestamp>)> = None;

        for (&frame_id, info) in self.frame_info.iter() {
            if !info.is_evictable {
                continue;
            }

            let k_dist = info.k_distance(now, self.k);
            let earliest = info.earliest_timestamp();

            let better = match victim {
                None => true,
                Some((_, victim_dist, victim_earliest)) => match (victim_dist, k_dist) {
                    (None, Some(_)) => false,
                    (Some(_), None) => true,
                    (None, None) => earliest < victim_earliest,
                    (Some(v), Some(c)) => c > v,
                },
            };

            if better {
                victim = Some((frame_id, k_dist, earliest));
            }
        }

        let (frame_id, _, _) = victim?;
        self.frame_info.remove(&frame_id);
        self.num_evictable -= 1;
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(info) = self.frame_info.remove(&frame_id) {
            if info.is_evictable {
                self.num_evictable -= 1;
            }
        }
    }

    fn size(&self) -> usize {
        self.num_evictable
    }
}
