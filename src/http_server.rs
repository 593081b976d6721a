use crate::config::TriggerConfig;
use crate::error::WebhookError;
use crate::trigger::{self, TriggerOutcome};
use crate::types::PendingEvent;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Clone)]
struct ServerState {
    trigger: Arc<TriggerConfig>,
    event_tx: mpsc::UnboundedSender<PendingEvent>,
}

/// Spawn the Axum server on 127.0.0.1:0 and return the bound port and
/// a channel receiver for accepted webhook events.
pub async fn start(
    trigger: Arc<TriggerConfig>,
) -> Result<(u16, mpsc::UnboundedReceiver<PendingEvent>), String> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let app = router(trigger, event_tx);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("failed to bind HTTP server: {e}"))?;

    let port = listener
        .local_addr()
        .map_err(|e| format!("failed to read bound address: {e}"))?
        .port();
    tracing::info!(port, "webhook server bound");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "webhook server error");
        }
    });

    Ok((port, event_rx))
}

fn router(trigger: Arc<TriggerConfig>, event_tx: mpsc::UnboundedSender<PendingEvent>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .with_state(ServerState { trigger, event_tx })
}

async fn handle_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now().timestamp();

    match trigger::process_delivery(&state.trigger, &headers, &body, now) {
        Ok(TriggerOutcome::Emitted(event)) => {
            let (event_type, subject) = (event.event_type.clone(), event.subject.clone());
            if state.event_tx.send(event).is_err() {
                // Receiver is gone; make the sender retry rather than lose the delivery.
                tracing::error!(%event_type, %subject, "event queue closed, delivery not accepted");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "event queue unavailable" })),
                );
            }
            tracing::info!(%event_type, %subject, "webhook accepted");
            (StatusCode::OK, Json(json!({ "received": true, "emitted": true })))
        }
        Ok(TriggerOutcome::Suppressed { event_type }) => {
            tracing::debug!(%event_type, "webhook filtered by event allow-list");
            (StatusCode::OK, Json(json!({ "received": true, "emitted": false })))
        }
        Err(e) => {
            tracing::warn!(error = %e, "webhook rejected");
            (status_for(&e), Json(json!({ "error": e.to_string() })))
        }
    }
}

fn status_for(error: &WebhookError) -> StatusCode {
    match error {
        WebhookError::MalformedBody(_) | WebhookError::MissingHeaders => StatusCode::BAD_REQUEST,
        WebhookError::TimestampOutOfTolerance { .. }
        | WebhookError::InvalidTimestamp { .. }
        | WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
        WebhookError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
