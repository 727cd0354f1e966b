//! Video analysis routes
//!
//! The detector/tracker collaborator feeds detection frames per video.
//! A worker task is created on first contact with a rule snapshot taken
//! at that moment; frames for one video are processed strictly in
//! arrival order while other videos run in parallel.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use analysis::VideoTask;
use rule_engine::{Detection, DetectionFrame};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FrameIngest {
    pub frame_number: u64,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
pub struct FrameBatch {
    pub frames: Vec<FrameIngest>,
}

/// Queue a batch of detection frames for a video.
pub async fn ingest_frames(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    Json(batch): Json<FrameBatch>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let frames: Vec<DetectionFrame> = batch
        .frames
        .into_iter()
        .map(|f| DetectionFrame::new(video_id.clone(), f.frame_number, f.timestamp_ms, f.detections))
        .collect();
    let queued = frames.len();

    let sender = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get(&video_id) {
            Some(task) => task.sender(),
            None => {
                // The rule snapshot for this pass is taken here; later
                // registry edits apply from the next video.
                let rules = state.registry.snapshot().await;
                info!(video_id = %video_id, rule_count = rules.len(), "starting analysis worker");
                let task = VideoTask::spawn(
                    video_id.clone(),
                    rules,
                    state.config.engine.evaluator_config(),
                    state.alert_generator(),
                );
                let sender = task.sender();
                sessions.insert(video_id.clone(), task);
                sender
            }
        }
    };

    // Queue outside the sessions lock: a backlogged video must not stall
    // frame ingest for unrelated videos.
    sender
        .send(frames)
        .await
        .map_err(|_| ApiError::Internal(format!("analysis for video `{video_id}` stopped")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "video_id": video_id,
            "queued_frames": queued,
        })),
    ))
}

/// End of the detection stream: drain the worker and tear down its state.
pub async fn complete_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .sessions
        .lock()
        .await
        .remove(&video_id)
        .ok_or_else(|| ApiError::NotFound(format!("no analysis running for video: {video_id}")))?;

    let summary = task.complete().await?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "video_id": summary.video_id,
            "frames_processed": summary.frames_processed,
            "alerts_created": summary.alerts_created,
            "persist_failures": summary.persist_failures,
        }
    })))
}

/// Cancel a video's analysis (e.g. the upload was deleted): queued frames
/// produce no further alerts, per-video state is released, and the
/// video's alert history is purged.
pub async fn cancel_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task: Option<VideoTask> = state.sessions.lock().await.remove(&video_id);
    if let Some(task) = &task {
        task.cancel();
    }
    if let Some(task) = task {
        // Reap the worker off the request path.
        tokio::spawn(async move {
            if let Err(e) = task.complete().await {
                warn!(error = %e, "cancelled analysis worker did not shut down cleanly");
            }
        });
    }

    let removed_alerts = state.store.delete_video(&video_id).await?;
    info!(video_id = %video_id, removed_alerts, "video analysis cancelled");
    Ok(Json(json!({
        "success": true,
        "video_id": video_id,
        "removed_alerts": removed_alerts,
    })))
}
