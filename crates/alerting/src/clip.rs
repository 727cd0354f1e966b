//! Video-evidence clip windows
//!
//! Clip extraction itself is an external collaborator; the pipeline only
//! chooses the window and records the returned reference.

use async_trait::async_trait;
use thiserror::Error;

use rules::RuleType;

/// Bounded window around a triggering frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub video_id: String,
    pub alert_id: String,
    pub center_frame: u64,
    pub pre_seconds: f64,
    pub post_seconds: f64,
}

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("clip extraction failed: {0}")]
    Failed(String),
}

/// Clip-extraction collaborator. Implementations may return a reference
/// to a clip that is still being written; the path is the contract.
#[async_trait]
pub trait ClipExtractor: Send + Sync {
    async fn request(&self, request: &ClipRequest) -> Result<String, ClipError>;
}

/// Default (pre, post) seconds of evidence per rule type. Falls get a
/// longer tail so the aftermath is visible.
pub fn clip_window(rule_type: RuleType) -> (f64, f64) {
    match rule_type {
        RuleType::FallDetection => (1.5, 3.5),
        _ => (1.5, 1.5),
    }
}
