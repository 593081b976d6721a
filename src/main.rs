mod client;
mod config;
mod error;
mod http_server;
mod money;
mod operations;
mod pagination;
mod trigger;
mod types;
mod verification;

use client::PolarClient;
use config::ExtensionConfig;
use error::ConfigError;
use operations::OperationContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing_subscriber::EnvFilter;
use types::PendingEvent;

// ─── JSON-RPC wire types ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn ok_response(id: Value, data: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: Some(serde_json::json!({
            "success": true,
            "data": data,
            "message": null
        })),
        error: None,
        id,
    }
}

fn raw_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: Some(result),
        error: None,
        id,
    }
}

fn err_response(id: Value, code: i64, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: None,
        error: Some(JsonRpcError { code, message }),
        id,
    }
}

// ─── Shared app state ────────────────────────────────────────────────────────

/// Populated by `initialize`; everything else requires it.
struct Session {
    config: ExtensionConfig,
    client: PolarClient,
}

#[derive(Default)]
struct AppState {
    session: Option<Session>,
    /// Events accepted by the HTTP server, not yet published to host.
    pending_rx: Option<mpsc::UnboundedReceiver<PendingEvent>>,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // stdout carries JSON-RPC; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let state: Arc<RwLock<AppState>> = Arc::new(RwLock::new(AppState::default()));
    let handle = tokio::runtime::Handle::current();

    // Stdin loop on a blocking thread to avoid blocking the async runtime.
    let result = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                _ => {}
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    let resp =
                        err_response(Value::Number(0.into()), -32700, format!("Parse error: {e}"));
                    emit_line(&mut out, &resp);
                    continue;
                }
            };

            let is_shutdown = request.method == "shutdown";

            let response = handle.block_on(handle_request(&request, &state, &mut out));
            emit_line(&mut out, &response);

            if is_shutdown {
                break;
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "stdin loop panicked");
    }
}

fn emit_line(out: &mut impl Write, resp: &JsonRpcResponse) {
    match serde_json::to_string(resp) {
        Ok(line) => {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize response"),
    }
}

// ─── Request dispatch ─────────────────────────────────────────────────────────

async fn handle_request(
    req: &JsonRpcRequest,
    state: &Arc<RwLock<AppState>>,
    out: &mut dyn Write,
) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => handle_initialize(req, state).await,
        "shutdown" => raw_response(req.id.clone(), serde_json::json!({})),
        "execute" => handle_execute(req, state, out).await,
        "load_options" => handle_load_options(req, state, out).await,
        _ => err_response(req.id.clone(), -32601, format!("Unknown method: {}", req.method)),
    }
}

async fn handle_initialize(
    req: &JsonRpcRequest,
    state: &Arc<RwLock<AppState>>,
) -> JsonRpcResponse {
    // A second server would orphan the first one's event queue.
    if state.read().await.session.is_some() {
        return err_response(req.id.clone(), -32600, "extension already initialized".into());
    }

    let mut config = match ExtensionConfig::from_params(&req.params) {
        Ok(c) => c,
        Err(e) => return err_response(req.id.clone(), -32602, e.to_string()),
    };

    let client = match PolarClient::new(&config.credentials) {
        Ok(c) => c,
        Err(e) => return err_response(req.id.clone(), -32603, ConfigError::from(e).to_string()),
    };

    // The HTTP server owns the trigger settings from here on.
    let trigger = std::mem::take(&mut config.trigger);
    tracing::info!(
        environment = ?config.credentials.environment,
        base_url = client.base_url(),
        authentication = ?trigger.authentication,
        events = trigger.events.len(),
        "configuration accepted"
    );

    let (port, pending_rx) = match http_server::start(Arc::new(trigger)).await {
        Ok(r) => r,
        Err(e) => {
            return err_response(req.id.clone(), -32603, format!("HTTP server failed: {e}"));
        }
    };

    let webhook_url = format!("http://127.0.0.1:{port}/webhook");
    tracing::info!(%webhook_url, "initialized");

    let mut st = state.write().await;
    st.session = Some(Session {
        config,
        client,
    });
    st.pending_rx = Some(pending_rx);

    raw_response(
        req.id.clone(),
        serde_json::json!({ "ready": true, "webhook_url": webhook_url }),
    )
}

// ─── Execute handler ──────────────────────────────────────────────────────────

async fn handle_execute(
    req: &JsonRpcRequest,
    state: &Arc<RwLock<AppState>>,
    out: &mut dyn Write,
) -> JsonRpcResponse {
    drain_pending_events(state, out).await;

    let operation = req
        .params
        .get("operation")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let items = execution_items(&req.params);

    let st = state.read().await;
    let session = match &st.session {
        Some(s) => s,
        None => return err_response(req.id.clone(), -32002, "extension not initialized".into()),
    };

    let ctx = OperationContext {
        client: &session.client,
        pagination: &session.config.pagination,
        continue_on_fail: session.config.continue_on_fail,
    };

    match operations::execute(operation, &items, &ctx).await {
        Ok(records) => ok_response(req.id.clone(), Value::Array(records)),
        Err(e) => err_response(req.id.clone(), -32000, e.to_string()),
    }
}

/// `params.items` is the batch; a lone `params.input` is a batch of one.
fn execution_items(params: &Value) -> Vec<Value> {
    match params.get("items") {
        Some(Value::Array(items)) => items.clone(),
        _ => vec![params
            .get("input")
            .cloned()
            .unwrap_or(Value::Object(Default::default()))],
    }
}

// ─── Load options handler ─────────────────────────────────────────────────────

async fn handle_load_options(
    req: &JsonRpcRequest,
    state: &Arc<RwLock<AppState>>,
    out: &mut dyn Write,
) -> JsonRpcResponse {
    drain_pending_events(state, out).await;

    let method = req.params.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let empty = serde_json::Map::new();
    // Dependent fields arrive under `parameters`; older hosts send them inline.
    let params = req
        .params
        .get("parameters")
        .or(Some(&req.params))
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);

    let st = state.read().await;
    let session = match &st.session {
        Some(s) => s,
        None => {
            tracing::warn!(method, "load_options before initialize");
            return raw_response(req.id.clone(), Value::Array(Vec::new()));
        }
    };
    let ctx = OperationContext {
        client: &session.client,
        pagination: &session.config.pagination,
        continue_on_fail: false,
    };

    let entries = operations::load_options(method, params, &ctx).await;
    match serde_json::to_value(entries) {
        Ok(v) => raw_response(req.id.clone(), v),
        Err(e) => err_response(req.id.clone(), -32603, e.to_string()),
    }
}

// ─── Pending event draining ───────────────────────────────────────────────────

/// Drain events queued by the HTTP server and publish them as IPC events.
/// Must be called while the host is in its read loop (i.e., during any execute/load_options call).
async fn drain_pending_events(state: &Arc<RwLock<AppState>>, out: &mut dyn Write) {
    let mut pending: Vec<PendingEvent> = Vec::new();
    {
        let mut st = state.write().await;
        if let Some(rx) = &mut st.pending_rx {
            while let Ok(item) = rx.try_recv() {
                pending.push(item);
            }
        }
    }

    if pending.is_empty() {
        return;
    }

    static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(20000);
    let stdin = io::stdin();

    for event in &pending {
        let call_id = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "event.publish",
            "params": {
                "type": event.event_type,
                "subject": event.subject,
                "data": event.data,
            },
            "id": call_id,
        });
        let _ = writeln!(out, "{req}");
        let _ = out.flush();

        // Read back the host's response to keep the protocol in sync
        let mut line = String::new();
        let _ = stdin.lock().read_line(&mut line);
    }

    tracing::debug!(count = pending.len(), "published webhook events");
}
