//! Alert Store boundary
//!
//! Persistence is an external collaborator; the pipeline only relies on
//! the operations below. Status updates must be atomic per alert id.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::alert::{Alert, AlertStatus};
use rules::{RuleType, Severity};

/// Alert list filter. All fields are conjunctive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub rule_type: Option<RuleType>,
    pub video_id: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("alert not found: {0}")]
    NotFound(String),

    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

/// Operations the pipeline needs from the persistence collaborator.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a new alert and return its id.
    async fn create(&self, alert: Alert) -> Result<String, StoreError>;

    async fn get(&self, alert_id: &str) -> Result<Option<Alert>, StoreError>;

    /// Matching alerts, newest first.
    async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;

    /// Apply a status transition atomically and return the resulting
    /// alert. No-op transitions return the alert unchanged.
    async fn update_status(&self, alert_id: &str, status: AlertStatus)
        -> Result<Alert, StoreError>;

    async fn count_by_status(&self, status: AlertStatus) -> Result<usize, StoreError>;

    /// Remove every alert belonging to a video; returns how many went.
    async fn delete_video(&self, video_id: &str) -> Result<usize, StoreError>;
}
