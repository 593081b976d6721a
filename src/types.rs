use serde::Serialize;

/// A webhook delivery queued for event.publish, not yet sent to host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEvent {
    pub event_type: String,
    pub subject: String,
    pub data: serde_json::Value,
}

/// Dropdown entry returned by `load_options`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionEntry {
    pub name: String,
    pub value: String,
    pub description: String,
}
