//! Alert Generator
//!
//! Decides whether a rule match materializes into an alert (cooldown,
//! dedup), assembles the alert with its evidence clip reference, persists
//! it, and only then hands it to the broadcaster — so the store and the
//! stream can never disagree about an alert's existence.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use broadcast::Broadcaster;
use rule_engine::RuleMatch;

use crate::alert::{Alert, AlertStatus};
use crate::clip::{clip_window, ClipExtractor, ClipRequest};
use crate::cooldown::CooldownTracker;
use crate::store::{AlertStore, StoreError};

/// Alert pipeline configuration.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Per-video cooldown window (seconds of video time).
    pub cooldown_seconds: f64,
    /// Persistence attempts before giving up on an alert.
    pub persist_attempts: u32,
    /// Base delay between persistence attempts; grows linearly.
    pub persist_retry_delay_ms: u64,
    /// Retained dedup keys before the oldest are forgotten.
    pub dedup_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 3.0,
            persist_attempts: 3,
            persist_retry_delay_ms: 200,
            dedup_capacity: 1024,
        }
    }
}

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("failed to persist alert: {0}")]
    Persistence(#[from] StoreError),

    #[error("rule match carried no violations")]
    EmptyMatch,
}

/// Stateful converter from rule matches to persisted, broadcast alerts.
///
/// One generator serves one video's evaluation pass, so cooldown
/// decisions are applied in that video's frame order by construction.
pub struct AlertGenerator {
    config: AlertConfig,
    store: Arc<dyn AlertStore>,
    clips: Arc<dyn ClipExtractor>,
    broadcaster: Broadcaster<Alert>,
    cooldown: CooldownTracker,
    seen: HashSet<(String, String, u64)>,
    seen_order: VecDeque<(String, String, u64)>,
}

impl AlertGenerator {
    pub fn new(
        config: AlertConfig,
        store: Arc<dyn AlertStore>,
        clips: Arc<dyn ClipExtractor>,
        broadcaster: Broadcaster<Alert>,
    ) -> Self {
        let cooldown = CooldownTracker::new(config.cooldown_seconds);
        Self {
            config,
            store,
            clips,
            broadcaster,
            cooldown,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    /// Process one rule match. Returns the created alert, or `None` when
    /// cooldown or dedup decided against creating one.
    pub async fn process(&mut self, rule_match: RuleMatch) -> Result<Option<Alert>, AlertError> {
        let first = rule_match.violations.first().ok_or(AlertError::EmptyMatch)?;
        let video_id = first.video_id.clone();
        let ts_ms = first.timestamp_ms;
        let frame_number = first.frame_number;

        let dedup_key = (video_id.clone(), rule_match.rule_id.clone(), frame_number);
        if self.seen.contains(&dedup_key) {
            debug!(
                video_id = %video_id,
                rule_id = %rule_match.rule_id,
                frame_number,
                "duplicate violation, alert already generated"
            );
            return Ok(None);
        }

        if self
            .cooldown
            .should_suppress(&video_id, ts_ms, rule_match.rule_type)
        {
            debug!(
                video_id = %video_id,
                rule_type = %rule_match.rule_type,
                "alert suppressed by per-video cooldown"
            );
            return Ok(None);
        }

        let alert_id = Uuid::new_v4().to_string();
        let (pre_seconds, post_seconds) = clip_window(rule_match.rule_type);
        let clip_request = ClipRequest {
            video_id: video_id.clone(),
            alert_id: alert_id.clone(),
            center_frame: frame_number,
            pre_seconds,
            post_seconds,
        };
        // A failed clip never drops the alert; the record just carries no
        // evidence reference.
        let video_clip_path = match self.clips.request(&clip_request).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(alert_id, error = %e, "clip extraction failed, alert proceeds without clip");
                None
            }
        };

        let alert = Alert {
            alert_id,
            rule_id: rule_match.rule_id.clone(),
            rule_type: rule_match.rule_type,
            ts_ms,
            summary: rule_match.summary.clone(),
            severity: rule_match.severity,
            detail: rule_match,
            created_at: Utc::now(),
            video_id: video_id.clone(),
            frame_number,
            status: AlertStatus::Unprocessed,
            processed_at: None,
            video_clip_path,
        };

        // Store first, stream second: a subscriber must always be able to
        // re-fetch a broadcast alert.
        self.persist(&alert).await?;
        self.remember(dedup_key);
        self.cooldown.mark(&video_id, ts_ms, alert.rule_type);

        let delivered = self.broadcaster.publish(alert.clone());
        info!(
            alert_id = %alert.alert_id,
            rule_type = %alert.rule_type,
            severity = %alert.severity,
            video_id = %video_id,
            frame_number,
            delivered,
            "alert created"
        );
        Ok(Some(alert))
    }

    /// Release per-video bookkeeping once a video's analysis ends.
    pub fn clear_video(&mut self, video_id: &str) {
        self.cooldown.clear_video(video_id);
        self.seen.retain(|(v, _, _)| v != video_id);
        self.seen_order.retain(|(v, _, _)| v != video_id);
    }

    async fn persist(&self, alert: &Alert) -> Result<(), AlertError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.create(alert.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.config.persist_attempts => {
                    warn!(
                        alert_id = %alert.alert_id,
                        attempt,
                        error = %e,
                        "alert store write failed, retrying"
                    );
                    let backoff = self.config.persist_retry_delay_ms * attempt as u64;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    warn!(
                        alert_id = %alert.alert_id,
                        attempts = attempt,
                        error = %e,
                        "alert store unavailable, entering degraded mode for this alert"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    fn remember(&mut self, key: (String, String, u64)) {
        while self.seen_order.len() >= self.config.dedup_capacity {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.seen.insert(key.clone());
        self.seen_order.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rule_engine::{Violation, ViolationDetail};
    use rules::{RuleType, Severity};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use track_store::Position;

    use crate::clip::ClipError;
    use crate::store::AlertFilter;

    /// Minimal in-memory store for generator tests.
    #[derive(Default)]
    struct MockStore {
        alerts: Mutex<Vec<Alert>>,
        fail_first: AtomicU32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl AlertStore for MockStore {
        async fn create(&self, alert: Alert) -> Result<String, StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("mock outage".into()));
            }
            let id = alert.alert_id.clone();
            self.alerts.lock().unwrap().push(alert);
            Ok(id)
        }

        async fn get(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
            Ok(self
                .alerts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.alert_id == alert_id)
                .cloned())
        }

        async fn list(&self, _filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
            Ok(self.alerts.lock().unwrap().clone())
        }

        async fn update_status(
            &self,
            alert_id: &str,
            _status: AlertStatus,
        ) -> Result<Alert, StoreError> {
            self.get(alert_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(alert_id.into()))
        }

        async fn count_by_status(&self, status: AlertStatus) -> Result<usize, StoreError> {
            Ok(self
                .alerts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.status == status)
                .count())
        }

        async fn delete_video(&self, video_id: &str) -> Result<usize, StoreError> {
            let mut alerts = self.alerts.lock().unwrap();
            let before = alerts.len();
            alerts.retain(|a| a.video_id != video_id);
            Ok(before - alerts.len())
        }
    }

    struct OkClips;

    #[async_trait]
    impl ClipExtractor for OkClips {
        async fn request(&self, request: &ClipRequest) -> Result<String, ClipError> {
            Ok(format!("clips/{}/{}.mp4", request.video_id, request.alert_id))
        }
    }

    struct BrokenClips;

    #[async_trait]
    impl ClipExtractor for BrokenClips {
        async fn request(&self, _request: &ClipRequest) -> Result<String, ClipError> {
            Err(ClipError::Failed("extractor offline".into()))
        }
    }

    fn rule_match(rule_type: RuleType, rule_id: &str, frame: u64, ts_ms: i64) -> RuleMatch {
        let detail = match rule_type {
            RuleType::FallDetection => ViolationDetail::FallDetection {
                pre_duration: 1.5,
                post_duration: 3.5,
                y_change: 90.0,
                time_duration: 0.8,
                frame_gap: 20,
                fall_detected: true,
                record_video: true,
            },
            _ => ViolationDetail::DistanceBelow {
                distance: 1.0,
                min_distance: 2.0,
            },
        };
        RuleMatch {
            rule_id: rule_id.into(),
            rule_type,
            severity: Severity::High,
            summary: format!("{rule_type} fired"),
            violations: vec![Violation {
                position: Position::new(10.0, 10.0),
                objects: vec!["person_1".into()],
                timestamp_ms: ts_ms,
                video_id: "v1".into(),
                frame_number: frame,
                detail,
            }],
        }
    }

    fn generator(store: Arc<MockStore>, clips: Arc<dyn ClipExtractor>) -> AlertGenerator {
        AlertGenerator::new(
            AlertConfig {
                persist_retry_delay_ms: 1,
                ..Default::default()
            },
            store,
            clips,
            Broadcaster::default(),
        )
    }

    #[tokio::test]
    async fn test_cooldown_allows_one_alert_per_window() {
        let store = Arc::new(MockStore::default());
        let mut generator = generator(store.clone(), Arc::new(OkClips));

        let first = generator
            .process(rule_match(RuleType::DistanceBelow, "r1", 10, 1000))
            .await
            .unwrap();
        assert!(first.is_some());

        // Different rule, same video, inside the window: suppressed.
        let second = generator
            .process(rule_match(RuleType::ZoneEntry, "r2", 15, 2000))
            .await
            .unwrap();
        assert!(second.is_none());

        // Past the window: allowed again.
        let third = generator
            .process(rule_match(RuleType::ZoneEntry, "r2", 60, 4200))
            .await
            .unwrap();
        assert!(third.is_some());

        assert_eq!(store.alerts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fall_detection_never_suppressed() {
        let store = Arc::new(MockStore::default());
        let mut generator = generator(store.clone(), Arc::new(OkClips));

        generator
            .process(rule_match(RuleType::DistanceBelow, "r1", 10, 1000))
            .await
            .unwrap();

        // Fall alert 500 ms later must still be created.
        let fall = generator
            .process(rule_match(RuleType::FallDetection, "r-fall", 12, 1500))
            .await
            .unwrap();
        assert!(fall.is_some());

        let alerts = store.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].rule_type, RuleType::FallDetection);
    }

    #[tokio::test]
    async fn test_duplicate_violation_is_idempotent() {
        let store = Arc::new(MockStore::default());
        let mut generator = generator(store.clone(), Arc::new(OkClips));

        let m = rule_match(RuleType::FallDetection, "r-fall", 12, 1500);
        assert!(generator.process(m.clone()).await.unwrap().is_some());
        // Re-evaluation of the same (video, rule, frame): no second alert.
        assert!(generator.process(m).await.unwrap().is_none());
        assert_eq!(store.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clip_failure_still_creates_alert() {
        let store = Arc::new(MockStore::default());
        let mut generator = generator(store.clone(), Arc::new(BrokenClips));

        let alert = generator
            .process(rule_match(RuleType::LineCross, "r1", 5, 800))
            .await
            .unwrap()
            .expect("alert created despite clip failure");
        assert!(alert.video_clip_path.is_none());
    }

    #[tokio::test]
    async fn test_persistence_retries_then_succeeds() {
        let store = Arc::new(MockStore::default());
        store.fail_first.store(2, Ordering::SeqCst);
        let mut generator = generator(store.clone(), Arc::new(OkClips));

        let alert = generator
            .process(rule_match(RuleType::DistanceBelow, "r1", 10, 1000))
            .await
            .unwrap();
        assert!(alert.is_some());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_persisted_before_broadcast() {
        let store = Arc::new(MockStore::default());
        let broadcaster: Broadcaster<Alert> = Broadcaster::default();
        let mut subscription = broadcaster.subscribe();
        let mut generator = AlertGenerator::new(
            AlertConfig::default(),
            store.clone(),
            Arc::new(OkClips),
            broadcaster,
        );

        generator
            .process(rule_match(RuleType::CollisionRisk, "r1", 30, 3000))
            .await
            .unwrap();

        let received = subscription.receiver.recv().await.expect("broadcast alert");
        // The broadcast alert is re-fetchable from the store.
        let stored = store.get(&received.alert_id).await.unwrap();
        assert_eq!(stored.unwrap().alert_id, received.alert_id);
        assert!(received.video_clip_path.unwrap().starts_with("clips/v1/"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_error() {
        let store = Arc::new(MockStore::default());
        store.fail_first.store(10, Ordering::SeqCst);
        let mut generator = generator(store.clone(), Arc::new(OkClips));

        let result = generator
            .process(rule_match(RuleType::DistanceBelow, "r1", 10, 1000))
            .await;
        assert!(matches!(result, Err(AlertError::Persistence(_))));
        // The failed alert neither marked cooldown nor dedup state.
        let retry = generator
            .process(rule_match(RuleType::DistanceBelow, "r1", 10, 1000))
            .await;
        assert!(matches!(retry, Err(AlertError::Persistence(_))));
    }
}
