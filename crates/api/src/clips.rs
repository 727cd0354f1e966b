//! Clip-extraction collaborator binding
//!
//! The actual cutting of video evidence happens out of process. This
//! implementation hands the pipeline the deterministic reference the
//! extractor will write to, so the alert can be created immediately and
//! the clip filled in behind it.

use async_trait::async_trait;
use tracing::debug;

use alerting::{ClipError, ClipExtractor, ClipRequest};

pub struct DeferredClipPlanner {
    base_dir: String,
}

impl DeferredClipPlanner {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl ClipExtractor for DeferredClipPlanner {
    async fn request(&self, request: &ClipRequest) -> Result<String, ClipError> {
        debug!(
            video_id = %request.video_id,
            alert_id = %request.alert_id,
            center_frame = request.center_frame,
            pre_seconds = request.pre_seconds,
            post_seconds = request.post_seconds,
            "clip extraction requested"
        );
        Ok(format!(
            "{}/{}/{}.mp4",
            self.base_dir, request.video_id, request.alert_id
        ))
    }
}
