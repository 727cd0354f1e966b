//! Safety Monitoring API Server
//!
//! REST + SSE surface over the rule registry, alert store, broadcast
//! broker, and per-video analysis workers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod clips;
mod config;
mod error;
mod rate_limit;
mod routes;

pub use config::AppConfig;
pub use error::ApiError;

use alerting::{Alert, AlertGenerator, AlertStatus, AlertStore, ClipExtractor};
use analysis::VideoTask;
use broadcast::{Broadcaster, BrokerConfig};
use clips::DeferredClipPlanner;
use rate_limit::create_governor_config;
use rules::{Rule, RuleRegistry};
use storage::InMemoryAlertStore;

/// Rule change notification carried on the push stream alongside alerts,
/// so clients can hot-reload their rule view.
#[derive(Debug, Clone, Serialize)]
pub struct RuleStreamEvent {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub registry: RuleRegistry,
    pub store: Arc<dyn AlertStore>,
    pub clips: Arc<dyn ClipExtractor>,
    pub alerts_broker: Broadcaster<Alert>,
    pub rules_broker: Broadcaster<RuleStreamEvent>,
    /// Running per-video analysis workers.
    pub sessions: tokio::sync::Mutex<HashMap<String, VideoTask>>,
    pub start_time: std::time::Instant,
    pub version: String,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let broker_config = BrokerConfig {
            queue_capacity: config.broker.queue_capacity,
        };
        Self {
            store: Arc::new(InMemoryAlertStore::new()),
            clips: Arc::new(DeferredClipPlanner::new(config.clips.base_dir.clone())),
            alerts_broker: Broadcaster::new(broker_config.clone()),
            rules_broker: Broadcaster::new(broker_config),
            registry: RuleRegistry::new(),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
        }
    }

    /// Fresh generator for one video's analysis pass.
    pub fn alert_generator(&self) -> AlertGenerator {
        AlertGenerator::new(
            self.config.alerting.alert_config(),
            self.store.clone(),
            self.clips.clone(),
            self.alerts_broker.clone(),
        )
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub registry: ComponentHealth,
    pub alert_store: ComponentHealth,
    pub broker: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub rule_count: usize,
    pub enabled_rule_count: usize,
    pub unprocessed_alerts: usize,
    pub active_subscribers: usize,
    pub active_analyses: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let governor = create_governor_config(&state.config.rate_limit);

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/config", get(config_handler))
        .route(
            "/api/v1/rules",
            get(routes::rules::list_rules).post(routes::rules::create_rule),
        )
        .route("/api/v1/rules/test", post(routes::rules::test_rule))
        .route(
            "/api/v1/rules/:id",
            get(routes::rules::get_rule)
                .put(routes::rules::update_rule)
                .delete(routes::rules::delete_rule),
        )
        .route("/api/v1/rules/:id/toggle", patch(routes::rules::toggle_rule))
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/v1/alerts/stats/unprocessed",
            get(routes::alerts::unprocessed_count),
        )
        .route("/api/v1/alerts/:id", get(routes::alerts::get_alert))
        .route(
            "/api/v1/alerts/:id/status",
            patch(routes::alerts::update_status),
        )
        .route("/api/v1/sse/alerts", get(routes::stream::sse_alerts))
        .route("/api/v1/sse/status", get(routes::stream::sse_status))
        .route(
            "/api/v1/videos/:id/frames",
            post(routes::videos::ingest_frames),
        )
        .route(
            "/api/v1/videos/:id/complete",
            post(routes::videos::complete_video),
        )
        .route("/api/v1/videos/:id", delete(routes::videos::cancel_video))
        .layer(GovernorLayer { config: governor })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let store_health = match state.store.count_by_status(AlertStatus::Unprocessed).await {
        Ok(_) => "ok",
        Err(_) => "degraded",
    };
    let unprocessed = state
        .store
        .count_by_status(AlertStatus::Unprocessed)
        .await
        .unwrap_or(0);

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            registry: ComponentHealth {
                status: "ok".to_string(),
            },
            alert_store: ComponentHealth {
                status: store_health.to_string(),
            },
            broker: ComponentHealth {
                status: "ok".to_string(),
            },
        },
        metrics: SystemMetrics {
            rule_count: state.registry.len().await,
            enabled_rule_count: state.registry.list(true).await.len(),
            unprocessed_alerts: unprocessed,
            active_subscribers: state.alerts_broker.status().active_connections,
            active_analyses: state.sessions.lock().await.len(),
        },
    };

    Json(response)
}

/// Read-only view of the engine parameters.
async fn config_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "data": {
                "engine": state.config.engine,
                "alerting": state.config.alerting,
                "broker": state.config.broker,
            }
        })),
    )
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the server
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.server.addr.clone();
    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
