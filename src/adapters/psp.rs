pub mod paypal;
pub mod stripe;
pub mod webpay;

use {
    crate::domain::error::ReconcileError,
    crate::domain::provider_status::MappedStatus,
    std::{future::Future, pin::Pin},
};

/// Header names whose values are replaced with `***` before a call log is
/// persisted. Masking is the only sensitive-data protection — bodies are
/// kept as-is.
const MASKED_HEADERS: &[&str] = &["authorization", "tbk-api-key-secret", "x-api-key"];

pub fn mask_sensitive_headers(headers: &[(String, String)]) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (name, value) in headers {
        let masked = if MASKED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            "***".to_string()
        } else {
            value.clone()
        };
        out.insert(name.clone(), serde_json::Value::String(masked));
    }
    serde_json::Value::Object(out)
}

/// Outcome of a single `status(token)` call. `mapped_status = None` means
/// "no conclusion yet, retry later", not an error. `error_message` carries
/// transport and configuration failures; it may be set alongside a
/// `mapped_status` of `None`.
#[derive(Debug, Clone)]
pub struct ProviderStatusResult {
    pub provider_status_raw: Option<String>,
    pub mapped_status: Option<MappedStatus>,
    pub response_code: Option<i32>,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
}

impl ProviderStatusResult {
    pub fn success(&self) -> bool {
        self.error_message.is_none() && self.provider_status_raw.is_some()
    }
}

/// Append-only record of one provider HTTP call, ready for `ProviderEventLog`.
#[derive(Debug, Clone)]
pub struct ProviderCallLog {
    pub url: String,
    pub masked_headers: serde_json::Value,
    pub body: Option<String>,
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

/// Uniform capability every PSP adapter implements. Selected by a string
/// key (the payment's `provider` column), never by runtime attribute
/// access — §9 "Provider capability abstraction".
pub trait PspAdapter: Send + Sync {
    /// The `provider` column value this adapter handles, e.g. `"webpay"`.
    fn name(&self) -> &'static str;

    fn status(
        &self,
        token: &str,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<(ProviderStatusResult, ProviderCallLog), ReconcileError>>
                + Send
                + '_,
        >,
    >;
}
