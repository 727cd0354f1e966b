//! In-memory alert repository

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use alerting::{Alert, AlertFilter, AlertStatus, AlertStore, StoreError};

/// Bounded in-memory alert store.
///
/// Alerts are held newest-last; reads return newest-first. Status
/// updates run under the same lock as reads, so a transition is atomic
/// per alert and concurrent requests cannot lose updates.
pub struct InMemoryAlertStore {
    alerts: Mutex<VecDeque<Alert>>,
    /// Retention cap; the oldest alerts are evicted beyond it.
    max_alerts: usize,
}

const DEFAULT_MAX_ALERTS: usize = 10_000;
const DEFAULT_LIST_LIMIT: usize = 50;

impl InMemoryAlertStore {
    pub fn new() -> Self {
        info!("creating in-memory alert store");
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(1024)),
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }

    pub fn with_capacity(max_alerts: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            max_alerts: max_alerts.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Alert>>, StoreError> {
        self.alerts
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(alert: &Alert, filter: &AlertFilter) -> bool {
    filter.rule_type.map_or(true, |t| alert.rule_type == t)
        && filter
            .video_id
            .as_ref()
            .map_or(true, |v| &alert.video_id == v)
        && filter.severity.map_or(true, |s| alert.severity == s)
        && filter.status.map_or(true, |s| alert.status == s)
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create(&self, alert: Alert) -> Result<String, StoreError> {
        let mut alerts = self.lock()?;

        while alerts.len() >= self.max_alerts {
            alerts.pop_front();
        }

        let id = alert.alert_id.clone();
        alerts.push_back(alert);
        debug!(alert_id = %id, "alert stored");
        Ok(id)
    }

    async fn get(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        let alerts = self.lock()?;
        Ok(alerts.iter().find(|a| a.alert_id == alert_id).cloned())
    }

    async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.lock()?;
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);

        Ok(alerts
            .iter()
            .rev()
            .filter(|a| matches(a, filter))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        alert_id: &str,
        status: AlertStatus,
    ) -> Result<Alert, StoreError> {
        let mut alerts = self.lock()?;
        let alert = alerts
            .iter_mut()
            .find(|a| a.alert_id == alert_id)
            .ok_or_else(|| StoreError::NotFound(alert_id.to_string()))?;

        match alert.status.transition(status) {
            Some(next) => {
                alert.status = next;
                alert.processed_at = Some(Utc::now());
                debug!(alert_id, status = next.as_str(), "alert status updated");
            }
            None => {
                debug!(
                    alert_id,
                    current = alert.status.as_str(),
                    requested = status.as_str(),
                    "status transition is a no-op"
                );
            }
        }
        Ok(alert.clone())
    }

    async fn count_by_status(&self, status: AlertStatus) -> Result<usize, StoreError> {
        let alerts = self.lock()?;
        Ok(alerts.iter().filter(|a| a.status == status).count())
    }

    async fn delete_video(&self, video_id: &str) -> Result<usize, StoreError> {
        let mut alerts = self.lock()?;
        let before = alerts.len();
        alerts.retain(|a| a.video_id != video_id);
        let removed = before - alerts.len();
        if removed > 0 {
            info!(video_id, removed, "purged alerts for deleted video");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{RuleMatch, Violation, ViolationDetail};
    use rules::{RuleType, Severity};
    use track_store::Position;

    fn alert(id: &str, video_id: &str, rule_type: RuleType, ts_ms: i64) -> Alert {
        Alert {
            alert_id: id.into(),
            rule_id: "r1".into(),
            rule_type,
            ts_ms,
            summary: "test alert".into(),
            detail: RuleMatch {
                rule_id: "r1".into(),
                rule_type,
                severity: Severity::Medium,
                summary: "test alert".into(),
                violations: vec![Violation {
                    position: Position::new(1.0, 2.0),
                    objects: vec!["person_1".into()],
                    timestamp_ms: ts_ms,
                    video_id: video_id.into(),
                    frame_number: 10,
                    detail: ViolationDetail::DistanceBelow {
                        distance: 1.0,
                        min_distance: 2.0,
                    },
                }],
            },
            created_at: Utc::now(),
            video_id: video_id.into(),
            frame_number: 10,
            severity: Severity::Medium,
            status: AlertStatus::Unprocessed,
            processed_at: None,
            video_clip_path: None,
        }
    }

    #[tokio::test]
    async fn test_create_get_and_newest_first_list() {
        let store = InMemoryAlertStore::new();
        store.create(alert("a1", "v1", RuleType::DistanceBelow, 100)).await.unwrap();
        store.create(alert("a2", "v1", RuleType::ZoneEntry, 200)).await.unwrap();

        let fetched = store.get("a1").await.unwrap().unwrap();
        assert_eq!(fetched.alert_id, "a1");

        let listed = store.list(&AlertFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].alert_id, "a2");
    }

    #[tokio::test]
    async fn test_list_filters_compose() {
        let store = InMemoryAlertStore::new();
        store.create(alert("a1", "v1", RuleType::DistanceBelow, 100)).await.unwrap();
        store.create(alert("a2", "v2", RuleType::FallDetection, 200)).await.unwrap();
        store.create(alert("a3", "v1", RuleType::FallDetection, 300)).await.unwrap();

        let filter = AlertFilter {
            video_id: Some("v1".into()),
            rule_type: Some(RuleType::FallDetection),
            ..Default::default()
        };
        let listed = store.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].alert_id, "a3");
    }

    #[tokio::test]
    async fn test_status_lifecycle_and_noop() {
        let store = InMemoryAlertStore::new();
        store.create(alert("a1", "v1", RuleType::LineCross, 100)).await.unwrap();

        let processing = store
            .update_status("a1", AlertStatus::Processing)
            .await
            .unwrap();
        assert_eq!(processing.status, AlertStatus::Processing);
        assert!(processing.processed_at.is_some());

        let completed = store
            .update_status("a1", AlertStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status, AlertStatus::Completed);

        // completed → processing is a no-op, not an error.
        let unchanged = store
            .update_status("a1", AlertStatus::Processing)
            .await
            .unwrap();
        assert_eq!(unchanged.status, AlertStatus::Completed);

        assert!(matches!(
            store.update_status("missing", AlertStatus::Processing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_status_updates_end_terminal() {
        let store = std::sync::Arc::new(InMemoryAlertStore::new());
        store.create(alert("a1", "v1", RuleType::ZoneEntry, 100)).await.unwrap();

        let mut handles = Vec::new();
        for status in [AlertStatus::Processing, AlertStatus::Completed] {
            for _ in 0..8 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.update_status("a1", status).await.unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Whatever the interleaving, the state machine only moved forward.
        let final_alert = store.get("a1").await.unwrap().unwrap();
        assert_eq!(final_alert.status, AlertStatus::Completed);
    }

    #[tokio::test]
    async fn test_count_and_delete_video() {
        let store = InMemoryAlertStore::new();
        store.create(alert("a1", "v1", RuleType::DistanceBelow, 100)).await.unwrap();
        store.create(alert("a2", "v2", RuleType::DistanceBelow, 200)).await.unwrap();

        assert_eq!(store.count_by_status(AlertStatus::Unprocessed).await.unwrap(), 2);

        let removed = store.delete_video("v1").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_cap_evicts_oldest() {
        let store = InMemoryAlertStore::with_capacity(3);
        for i in 0..5 {
            store
                .create(alert(&format!("a{i}"), "v1", RuleType::ZoneEntry, i as i64))
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 3);
        assert!(store.get("a0").await.unwrap().is_none());
        assert!(store.get("a4").await.unwrap().is_some());
    }
}
