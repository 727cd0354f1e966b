//! Alert resource and status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rule_engine::RuleMatch;
use rules::{RuleType, Severity};

/// Alert processing state.
///
/// Transitions only move forward through
/// `unprocessed → processing → completed`; a request that would move
/// backward (or re-enter the current state) is a no-op, not an error.
/// `resolved` is accepted on the wire as an alias of the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Unprocessed,
    Processing,
    #[serde(alias = "resolved")]
    Completed,
}

impl AlertStatus {
    fn rank(self) -> u8 {
        match self {
            AlertStatus::Unprocessed => 0,
            AlertStatus::Processing => 1,
            AlertStatus::Completed => 2,
        }
    }

    /// The state to move to, or `None` when the request is a no-op.
    pub fn transition(self, requested: AlertStatus) -> Option<AlertStatus> {
        (requested.rank() > self.rank()).then_some(requested)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Unprocessed => "unprocessed",
            AlertStatus::Processing => "processing",
            AlertStatus::Completed => "completed",
        }
    }
}

/// The durable, user-facing alert record.
///
/// Everything except `status`/`processed_at` is immutable once persisted.
/// `detail` is the full per-rule evaluation result (rule_id, rule_type,
/// ordered violations, summary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "alertId")]
    pub alert_id: String,
    pub rule_id: String,
    pub rule_type: RuleType,
    /// Event time: video timestamp of the triggering frame.
    pub ts_ms: i64,
    pub summary: String,
    pub detail: RuleMatch,
    pub created_at: DateTime<Utc>,
    pub video_id: String,
    pub frame_number: u64,
    pub severity: Severity,
    pub status: AlertStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub video_clip_path: Option<String>,
}
