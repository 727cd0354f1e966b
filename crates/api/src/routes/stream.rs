//! Real-time push stream
//!
//! Long-lived SSE connection emitting newly created alerts and rule
//! change notifications. A subscriber that stops draining its queue is
//! disconnected by the broker rather than allowed to stall publishers;
//! clients recover missed alerts by re-fetching history on reconnect.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::AppState;

fn sse_event(name: &str, payload: &impl Serialize) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(_) => Event::default().event(name).comment("serialization failed"),
    }
}

fn receiver_stream<T: Serialize + Send + 'static>(
    receiver: mpsc::Receiver<T>,
    event_name: &'static str,
) -> impl Stream<Item = Event> {
    stream::unfold(receiver, move |mut rx| async move {
        let item = rx.recv().await?;
        Some((sse_event(event_name, &item), rx))
    })
}

/// SSE stream of alerts and rule updates created after subscription
/// (no backfill).
pub async fn sse_alerts(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let alerts = state.alerts_broker.subscribe();
    let rule_updates = state.rules_broker.subscribe();

    let merged = stream::select(
        receiver_stream(alerts.receiver, "alert"),
        receiver_stream(rule_updates.receiver, "rule_update"),
    )
    .map(Ok);

    Sse::new(merged).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Live subscriber count.
pub async fn sse_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.alerts_broker.status();
    Json(json!({
        "success": true,
        "data": {
            "active_connections": status.active_connections,
            "status": if status.active_connections > 0 { "active" } else { "idle" },
        }
    }))
}
