//! Rule Routes
//!
//! CRUD over the rule registry plus toggle and dry-run. Every change is
//! pushed to stream subscribers so clients can hot-reload their rule
//! view; running analysis passes pick the change up on their next video.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use rule_engine::{Detection, DetectionFrame, RuleEvaluator, RuleMatch};
use rules::{Rule, RuleDraft, RuleUpdate};

use crate::error::ApiError;
use crate::{AppState, RuleStreamEvent};

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub success: bool,
    pub data: Vec<Rule>,
    pub total_count: usize,
}

/// List all rules (optionally only enabled ones).
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RuleListQuery>,
) -> Json<RuleListResponse> {
    let data = state.registry.list(query.enabled_only).await;
    Json(RuleListResponse {
        success: true,
        total_count: data.len(),
        data,
    })
}

/// Fetch a single rule.
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let rule = state
        .registry
        .get(&rule_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("rule not found: {rule_id}")))?;
    Ok(Json(json!({ "success": true, "data": rule })))
}

/// Create a rule. Params are validated against the declared type; a
/// failure leaves the registry untouched.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<RuleDraft>,
) -> Result<Json<Value>, ApiError> {
    let rule = state.registry.create(draft).await?;
    state.rules_broker.publish(RuleStreamEvent {
        action: "created".into(),
        rule: Some(rule.clone()),
        rule_id: None,
        enabled: None,
    });
    Ok(Json(json!({
        "success": true,
        "message": "rule created",
        "data": rule,
    })))
}

/// Partially update a rule (type is immutable).
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<Value>, ApiError> {
    let rule = state.registry.update(&rule_id, update).await?;
    state.rules_broker.publish(RuleStreamEvent {
        action: "updated".into(),
        rule: Some(rule.clone()),
        rule_id: None,
        enabled: None,
    });
    Ok(Json(json!({
        "success": true,
        "message": "rule updated",
        "data": rule,
    })))
}

/// Delete a rule. Alerts generated under it are untouched.
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.registry.delete(&rule_id).await?;
    state.rules_broker.publish(RuleStreamEvent {
        action: "deleted".into(),
        rule: None,
        rule_id: Some(rule_id),
        enabled: None,
    });
    Ok(Json(json!({
        "success": true,
        "message": "rule deleted",
        "deleted_rule": removed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub enabled: bool,
}

/// Enable/disable a rule without a full update.
pub async fn toggle_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> Result<Json<Value>, ApiError> {
    let rule = state.registry.set_enabled(&rule_id, body.enabled).await?;
    state.rules_broker.publish(RuleStreamEvent {
        action: "toggled".into(),
        rule: None,
        rule_id: Some(rule.id.clone()),
        enabled: Some(body.enabled),
    });
    Ok(Json(json!({
        "success": true,
        "rule_id": rule.id,
        "enabled": body.enabled,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RuleTestFrame {
    pub frame_number: u64,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
pub struct RuleTestRequest {
    pub rule: RuleDraft,
    /// Frames evaluated in order, so temporal rules can be exercised too.
    pub frames: Vec<RuleTestFrame>,
}

#[derive(Debug, Serialize)]
pub struct RuleTestResponse {
    pub success: bool,
    pub matches: Vec<RuleMatch>,
}

/// Dry-run a candidate rule against caller-supplied detections with a
/// throwaway evaluator: nothing is persisted or broadcast.
pub async fn test_rule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RuleTestRequest>,
) -> Result<Json<RuleTestResponse>, ApiError> {
    let spec = rules::RuleSpec::from_bag(request.rule.rule_type, &request.rule.params)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let rule = Rule {
        id: "rule-under-test".to_string(),
        name: request.rule.name,
        rule_type: request.rule.rule_type,
        enabled: true,
        severity: request.rule.severity,
        description: request.rule.description,
        spec,
    };

    let mut evaluator =
        RuleEvaluator::new("rule-test", state.config.engine.evaluator_config());
    let mut matches = Vec::new();
    for frame in request.frames {
        let detection_frame = DetectionFrame::new(
            "rule-test",
            frame.frame_number,
            frame.timestamp_ms,
            frame.detections,
        );
        matches.extend(evaluator.evaluate(&detection_frame, std::slice::from_ref(&rule)));
    }

    Ok(Json(RuleTestResponse {
        success: true,
        matches,
    }))
}
