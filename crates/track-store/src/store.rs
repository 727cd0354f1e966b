//! Bounded track history implementation

use std::collections::HashMap;

use crate::Position;

/// Default per-entity history horizon (frames).
///
/// Sized to cover the largest rule lookback in use: the fall-detection
/// frame gap and the approach-trend duration at typical sample rates.
pub const DEFAULT_HORIZON: usize = 64;

/// One retained observation of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub frame_number: u64,
    pub timestamp_ms: i64,
    pub position: Position,
}

/// Per-(video, entity) bounded position history.
///
/// One store is owned by exactly one evaluation pass over one video;
/// entries older than the horizon are evicted on append, and all state
/// for a video is dropped in one call when its analysis completes.
#[derive(Debug)]
pub struct TrackStore {
    tracks: HashMap<(String, String), Vec<TrackPoint>>,
    horizon: usize,
}

impl TrackStore {
    pub fn new(horizon: usize) -> Self {
        Self {
            tracks: HashMap::new(),
            horizon: horizon.max(2),
        }
    }

    /// Append an observation to the entity's history, evicting the oldest
    /// entry once the horizon is reached.
    pub fn record(
        &mut self,
        video_id: &str,
        entity_id: &str,
        frame_number: u64,
        timestamp_ms: i64,
        position: Position,
    ) {
        let history = self
            .tracks
            .entry((video_id.to_string(), entity_id.to_string()))
            .or_default();

        while history.len() >= self.horizon {
            history.remove(0);
        }

        history.push(TrackPoint {
            frame_number,
            timestamp_ms,
            position,
        });
    }

    /// Retained history for an entity, oldest first. Empty if unseen.
    pub fn history(&self, video_id: &str, entity_id: &str) -> &[TrackPoint] {
        self.tracks
            .get(&(video_id.to_string(), entity_id.to_string()))
            .map(|h| h.as_slice())
            .unwrap_or(&[])
    }

    /// Most recent retained observation for an entity.
    pub fn latest(&self, video_id: &str, entity_id: &str) -> Option<TrackPoint> {
        self.tracks
            .get(&(video_id.to_string(), entity_id.to_string()))
            .and_then(|h| h.last().copied())
    }

    /// Oldest retained observation whose frame number is within `max_gap`
    /// frames of `frame_number` (exclusive of the current frame itself).
    pub fn earliest_within_gap(
        &self,
        video_id: &str,
        entity_id: &str,
        frame_number: u64,
        max_gap: u64,
    ) -> Option<TrackPoint> {
        self.tracks
            .get(&(video_id.to_string(), entity_id.to_string()))?
            .iter()
            .find(|p| {
                p.frame_number < frame_number && frame_number - p.frame_number <= max_gap
            })
            .copied()
    }

    /// Number of entities currently tracked for a video.
    pub fn entity_count(&self, video_id: &str) -> usize {
        self.tracks.keys().filter(|(v, _)| v == video_id).count()
    }

    /// Drop all state belonging to a video.
    pub fn clear_video(&mut self, video_id: &str) {
        self.tracks.retain(|(v, _), _| v != video_id);
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON)
    }
}
