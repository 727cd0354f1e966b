//! Alert Routes

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use alerting::{Alert, AlertFilter, AlertStatus};

use crate::error::ApiError;
use crate::AppState;

/// List alerts, newest first, with conjunctive filters.
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state.store.list(&filter).await?;
    Ok(Json(alerts))
}

/// Fetch a single alert.
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .store
        .get(&alert_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("alert not found: {alert_id}")))?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    /// `processing` or `completed` (`resolved` accepted as an alias).
    pub status: AlertStatus,
}

/// Advance an alert through its lifecycle. Backward or repeated
/// transitions are no-ops, not errors.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
    Json(body): Json<StatusUpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let alert = state.store.update_status(&alert_id, body.status).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("alert status is now '{}'", alert.status.as_str()),
        "data": {
            "alert_id": alert.alert_id,
            "new_status": alert.status,
            "processed_at": alert.processed_at,
        }
    })))
}

/// Count of alerts no consumer has picked up yet.
pub async fn unprocessed_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let count = state.store.count_by_status(AlertStatus::Unprocessed).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "unprocessed_count": count }
    })))
}
