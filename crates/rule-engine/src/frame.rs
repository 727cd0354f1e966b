//! Detector output consumed by the evaluator

use serde::{Deserialize, Serialize};
use track_store::Position;

/// One detected entity in one frame. The tracker guarantees `entity_id`
/// stability across frames of the same video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub entity_id: String,
    pub label: String,
    pub center_x: f64,
    pub center_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Instantaneous velocity in pixels/second, when the tracker provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 2]>,
}

impl Detection {
    pub fn position(&self) -> Position {
        Position::new(self.center_x, self.center_y)
    }
}

/// One frame of detections for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub video_id: String,
    pub frame_number: u64,
    pub timestamp_ms: i64,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(
        video_id: impl Into<String>,
        frame_number: u64,
        timestamp_ms: i64,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            frame_number,
            timestamp_ms,
            detections,
        }
    }
}
