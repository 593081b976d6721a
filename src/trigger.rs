use crate::config::{Authentication, TriggerConfig};
use crate::error::WebhookError;
use crate::types::PendingEvent;
use crate::verification::{self, VerifyOptions, WebhookDelivery};
use axum::http::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

/// Body keys that may carry the event type, highest priority first.
const EVENT_TYPE_KEYS: [&str; 3] = ["type", "event_type", "eventType"];

const FALLBACK_EVENT_TYPE: &str = "polar.webhook";

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Emitted(PendingEvent),
    /// The event type is not in the configured allow-list.
    Suppressed { event_type: String },
}

/// Run one delivery through parsing, authentication, filtering and
/// normalization.
pub fn process_delivery(
    config: &TriggerConfig,
    headers: &HeaderMap,
    raw_body: &[u8],
    now_seconds: i64,
) -> Result<TriggerOutcome, WebhookError> {
    let body = verification::parse_body(raw_body).map_err(WebhookError::MalformedBody)?;

    let msg_id = header_str(headers, verification::HEADER_ID);
    let timestamp = header_str(headers, verification::HEADER_TIMESTAMP);

    if config.authentication == Authentication::Secret {
        let secret = config
            .webhook_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSecret)?;

        let delivery = WebhookDelivery {
            id: msg_id,
            timestamp,
            signature_header: header_str(headers, verification::HEADER_SIGNATURE),
            raw_body,
            secret,
        };
        let options = VerifyOptions {
            validate_timestamp: config.options.validate_timestamp,
            tolerance_seconds: config.options.timestamp_tolerance,
        };
        let result = verification::verify_at(&delivery, options, now_seconds);
        if !result.is_valid() {
            tracing::debug!(?result, msg_id = ?msg_id, "delivery failed verification");
        }
        result.into_result()?;
    }

    let event_type = resolve_event_type(&body);
    if !config.events.is_empty() {
        if let Some(ref t) = event_type {
            if !config.events.iter().any(|allowed| allowed == t) {
                return Ok(TriggerOutcome::Suppressed {
                    event_type: t.clone(),
                });
            }
        }
    }

    let mut data = body;
    if let Some(id) = msg_id {
        data.insert("webhook_id".to_string(), Value::String(id.to_string()));
    }
    if let Some(ts) = timestamp {
        data.insert("webhook_timestamp".to_string(), Value::String(ts.to_string()));
    }
    if config.options.include_headers {
        data.insert("headers".to_string(), headers_to_json(headers));
    }
    if config.options.include_raw_body {
        data.insert(
            "raw_body".to_string(),
            Value::String(String::from_utf8_lossy(raw_body).into_owned()),
        );
    }

    Ok(TriggerOutcome::Emitted(PendingEvent {
        event_type: event_type.unwrap_or_else(|| FALLBACK_EVENT_TYPE.to_string()),
        subject: msg_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("delivery_{}", uuid::Uuid::new_v4())),
        data: Value::Object(data),
    }))
}

/// First truthy value among `type`, `event_type`, `eventType`. Strings are
/// taken as-is; other truthy values use their JSON text.
pub fn resolve_event_type(body: &Map<String, Value>) -> Option<String> {
    EVENT_TYPE_KEYS
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|v| is_truthy(v))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|s| (k.to_string(), Value::String(s.to_string())))
        })
        .collect();
    Value::Object(map)
}
