use chrono::{DateTime, Utc};

/// Append-only row recorded on every provider status call — read back to
/// compute `Payment::attempts` (I5).
pub struct NewStatusCheck {
    pub payment_id: i64,
    pub provider: &'static str,
    pub success: bool,
    pub provider_status: Option<String>,
    pub mapped_status: Option<&'static str>,
    pub response_code: Option<i32>,
    pub raw_payload: serde_json::Value,
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Full request/response audit row for a single provider call.
pub struct NewProviderEventLog {
    pub payment_id: i64,
    pub provider: &'static str,
    pub url: String,
    pub masked_headers: serde_json::Value,
    pub body: Option<String>,
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

/// Full request/response audit row for a single CRM delivery attempt.
pub struct NewCrmEventLog {
    pub crm_queue_item_id: i64,
    pub url: String,
    pub masked_headers: serde_json::Value,
    pub body: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRuntimeEventType {
    Startup,
    Shutdown,
    Heartbeat,
}

impl ServiceRuntimeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Lifecycle/heartbeat row emitted by each loop — §5 heartbeat discipline.
pub struct NewServiceRuntimeLog {
    pub instance_id: String,
    pub host: String,
    pub pid: i32,
    pub event_type: ServiceRuntimeEventType,
    pub payload: serde_json::Value,
}
