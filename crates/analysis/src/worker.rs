//! Per-video worker task
//!
//! Wraps an [`AnalysisSession`] in a spawned task with a frame inbox and
//! a cancellation signal. Frames for one video are handled sequentially
//! by that task; slow collaborators (store, clip extraction) never block
//! any other video's worker.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use alerting::AlertGenerator;
use rule_engine::{DetectionFrame, EvaluatorConfig};
use rules::Rule;

use crate::session::{AnalysisSession, AnalysisSummary};

/// Depth of the frame-batch inbox per video.
const FRAME_QUEUE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis for video `{0}` is no longer accepting frames")]
    Closed(String),

    #[error("analysis task for video `{0}` panicked")]
    TaskFailed(String),
}

/// Handle to a running per-video analysis task.
pub struct VideoTask {
    video_id: String,
    frames_tx: mpsc::Sender<Vec<DetectionFrame>>,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<AnalysisSummary>,
}

impl VideoTask {
    /// Spawn the worker with a rule snapshot taken by the caller.
    pub fn spawn(
        video_id: impl Into<String>,
        rules: Vec<Rule>,
        evaluator_config: EvaluatorConfig,
        generator: AlertGenerator,
    ) -> Self {
        let video_id = video_id.into();
        let (frames_tx, mut frames_rx) = mpsc::channel::<Vec<DetectionFrame>>(FRAME_QUEUE_DEPTH);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task_video_id = video_id.clone();
        let handle = tokio::spawn(async move {
            let mut session =
                AnalysisSession::new(task_video_id.clone(), rules, evaluator_config, generator);

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            info!(video_id = %task_video_id, "analysis cancelled");
                            break;
                        }
                    }
                    batch = frames_rx.recv() => {
                        match batch {
                            Some(frames) => {
                                for frame in frames {
                                    // Frames already queued are abandoned
                                    // the moment cancellation lands.
                                    if *cancel_rx.borrow() {
                                        break;
                                    }
                                    session.process_frame(&frame).await;
                                }
                            }
                            // Inbox closed: the video completed normally.
                            None => break,
                        }
                    }
                }
            }

            session.finish()
        });

        Self {
            video_id,
            frames_tx,
            cancel_tx,
            handle,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Clone of the frame inbox sender, so callers can queue frames
    /// without holding whatever lock guards the task registry.
    pub fn sender(&self) -> mpsc::Sender<Vec<DetectionFrame>> {
        self.frames_tx.clone()
    }

    /// Queue a batch of frames for in-order processing.
    pub async fn submit(&self, frames: Vec<DetectionFrame>) -> Result<(), AnalysisError> {
        self.frames_tx
            .send(frames)
            .await
            .map_err(|_| AnalysisError::Closed(self.video_id.clone()))
    }

    /// Signal cancellation. Queued-but-unprocessed frames produce no
    /// further alerts.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Close the inbox and wait for the worker to drain and tear down.
    pub async fn complete(self) -> Result<AnalysisSummary, AnalysisError> {
        let VideoTask {
            video_id,
            frames_tx,
            cancel_tx: _cancel_tx,
            handle,
        } = self;
        drop(frames_tx);
        handle
            .await
            .map_err(|_| AnalysisError::TaskFailed(video_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{Alert, AlertConfig, ClipError, ClipExtractor, ClipRequest};
    use async_trait::async_trait;
    use broadcast::Broadcaster;
    use rule_engine::Detection;
    use rules::{ParamsBag, RuleSpec, RuleType, Severity};
    use std::sync::Arc;
    use storage::InMemoryAlertStore;

    struct StubClips;

    #[async_trait]
    impl ClipExtractor for StubClips {
        async fn request(&self, request: &ClipRequest) -> Result<String, ClipError> {
            Ok(format!("clips/{}.mp4", request.alert_id))
        }
    }

    fn distance_rule() -> Rule {
        let bag = ParamsBag {
            min_distance: Some(100.0),
            labels: Some(vec!["person".into(), "forklift".into()]),
            ..Default::default()
        };
        Rule {
            id: "r-distance".into(),
            name: "distance".into(),
            rule_type: RuleType::DistanceBelow,
            enabled: true,
            severity: Severity::High,
            description: None,
            spec: RuleSpec::from_bag(RuleType::DistanceBelow, &bag).unwrap(),
        }
    }

    fn close_pair_frame(video_id: &str, n: u64, ts: i64) -> DetectionFrame {
        DetectionFrame::new(
            video_id,
            n,
            ts,
            vec![
                Detection {
                    entity_id: "p1".into(),
                    label: "person".into(),
                    center_x: 0.0,
                    center_y: 0.0,
                    confidence: Some(0.9),
                    velocity: None,
                },
                Detection {
                    entity_id: "f1".into(),
                    label: "forklift".into(),
                    center_x: 10.0,
                    center_y: 0.0,
                    confidence: Some(0.9),
                    velocity: None,
                },
            ],
        )
    }

    fn spawn_task(video_id: &str, store: Arc<InMemoryAlertStore>) -> VideoTask {
        let generator = AlertGenerator::new(
            AlertConfig::default(),
            store,
            Arc::new(StubClips),
            Broadcaster::<Alert>::default(),
        );
        let config = rule_engine::EvaluatorConfig {
            pixel_to_meter: 1.0,
            ..Default::default()
        };
        VideoTask::spawn(video_id, vec![distance_rule()], config, generator)
    }

    #[tokio::test]
    async fn test_frames_processed_in_order_and_summarized() {
        let store = Arc::new(InMemoryAlertStore::new());
        let task = spawn_task("v1", store.clone());

        task.submit(vec![
            close_pair_frame("v1", 0, 0),
            close_pair_frame("v1", 1, 200),
        ])
        .await
        .unwrap();

        let summary = task.complete().await.unwrap();
        assert_eq!(summary.frames_processed, 2);
        // Cooldown collapses the two matching frames into one alert.
        assert_eq!(summary.alerts_created, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_alerts() {
        let store = Arc::new(InMemoryAlertStore::new());
        let task = spawn_task("v1", store.clone());

        // Cancel before any frames are picked up; the queued batch must
        // not produce alerts.
        task.cancel();
        let _ = task
            .submit(vec![close_pair_frame("v1", 0, 0)])
            .await;

        let summary = task.complete().await.unwrap();
        assert_eq!(summary.alerts_created, 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_parallel_videos_do_not_share_state() {
        let store = Arc::new(InMemoryAlertStore::new());
        let task_a = spawn_task("va", store.clone());
        let task_b = spawn_task("vb", store.clone());

        task_a.submit(vec![close_pair_frame("va", 0, 0)]).await.unwrap();
        task_b.submit(vec![close_pair_frame("vb", 0, 0)]).await.unwrap();

        let summary_a = task_a.complete().await.unwrap();
        let summary_b = task_b.complete().await.unwrap();

        // Each video got its own cooldown window and its own alert.
        assert_eq!(summary_a.alerts_created, 1);
        assert_eq!(summary_b.alerts_created, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_complete_fails() {
        let store = Arc::new(InMemoryAlertStore::new());
        let task = spawn_task("v1", store);
        let frames_tx = task.frames_tx.clone();

        task.complete().await.unwrap();
        // The worker is gone; the retained sender sees a closed channel
        // once the receiver is dropped.
        let result = frames_tx.send(vec![]).await;
        assert!(result.is_err());
    }
}
