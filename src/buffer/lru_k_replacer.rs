use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{FrameId, Result, StrataError, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// Last k access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    /// Timestamp of the first access since the frame started being tracked
    first_access: Timestamp,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new(timestamp: Timestamp) -> Self {
        Self {
            history: VecDeque::new(),
            first_access: timestamp,
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance from `now`, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    /// Logical clock, advanced on every recorded access
    current_timestamp: Timestamp,
    /// Access information for each tracked frame
    frame_info: HashMap<FrameId, FrameAccessInfo>,
    /// Number of evictable frames
    num_evictable: usize,
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts a frame whose backward k-distance is the maximum
/// of all evictable frames. Backward k-distance is the difference between the
/// current timestamp and the timestamp of the kth previous access.
///
/// A frame with fewer than k historical accesses is given +inf as its backward
/// k-distance. Ties (in particular several +inf frames) go to the frame whose
/// first access is the earliest.
///
/// Contract violations (tracking more than `max_frames` frames, toggling an
/// untracked frame, removing a pinned frame) are reported as errors.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance and stops
    /// tracking it. Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let now = state.current_timestamp;
        let victim = state
            .frame_info
            .iter()
            .filter(|(_, info)| info.is_evictable)
            .max_by(|(_, a), (_, b)| {
                let a_dist = a.k_distance(now, self.k).unwrap_or(Timestamp::MAX);
                let b_dist = b.k_distance(now, self.k).unwrap_or(Timestamp::MAX);
                a_dist
                    .cmp(&b_dist)
                    .then_with(|| b.first_access.cmp(&a.first_access))
            })
            .map(|(frame_id, _)| *frame_id)?;

        state.frame_info.remove(&victim);
        state.num_evictable -= 1;
        trace!("Replacer evicted {}", victim);
        Some(victim)
    }

    /// Records an access to `frame_id` at the current logical time.
    /// A frame seen for the first time starts out non-evictable.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.state.lock();
        if !state.frame_info.contains_key(&frame_id) && state.frame_info.len() >= self.max_frames
        {
            return Err(StrataError::ReplacerFull(self.max_frames));
        }

        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;

        state
            .frame_info
            .entry(frame_id)
            .or_insert_with(|| FrameAccessInfo::new(timestamp))
            .record_access(timestamp, self.k);
        Ok(())
    }

    /// Sets whether a tracked frame is evictable.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) -> Result<()> {
        let mut state = self.state.lock();
        let info = state
            .frame_info
            .get_mut(&frame_id)
            .ok_or(StrataError::FrameNotTracked(frame_id))?;

        if info.is_evictable == is_evictable {
            return Ok(());
        }
        info.is_evictable = is_evictable;
        if is_evictable {
            state.num_evictable += 1;
        } else {
            state.num_evictable -= 1;
        }
        Ok(())
    }

    /// Stops tracking a frame. Untracked frames are ignored; removing a frame
    /// that is not evictable is an error.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.state.lock();
        match state.frame_info.get(&frame_id) {
            None => Ok(()),
            Some(info) if !info.is_evictable => Err(StrataError::FrameNotEvictable(frame_id)),
            Some(_) => {
                state.frame_info.remove(&frame_id);
                state.num_evictable -= 1;
                Ok(())
            }
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns true if the replacer holds history for `frame_id`.
    pub fn is_tracked(&self, frame_id: FrameId) -> bool {
        self.state.lock().frame_info.contains_key(&frame_id)
    }

    /// Returns true if `frame_id` is tracked and evictable.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.state
            .lock()
            .frame_info
            .get(&frame_id)
            .is_some_and(|info| info.is_evictable)
    }
}
