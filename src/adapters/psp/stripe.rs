use {
    super::{ProviderCallLog, ProviderStatusResult, PspAdapter, mask_sensitive_headers},
    crate::domain::error::ReconcileError,
    crate::domain::provider_status::MappedStatus,
    base64::Engine,
    std::time::Instant,
    std::{future::Future, pin::Pin},
};

pub struct StripeAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

enum LookupTarget {
    CheckoutSession,
    PaymentIntent,
}

impl StripeAdapter {
    pub fn new(api_key: Option<String>, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            api_key,
            base_url,
        }
    }

    fn resolve_lookup(token: &str) -> (LookupTarget, String) {
        let normalized = token.trim();
        if let Some(stripped) = normalized.strip_prefix("cs_") {
            return (LookupTarget::CheckoutSession, format!("cs_{stripped}"));
        }
        if normalized.starts_with("pi_") {
            if let Some((head, _)) = normalized.split_once("_secret_") {
                return (LookupTarget::PaymentIntent, head.to_string());
            }
        }
        (LookupTarget::PaymentIntent, normalized.to_string())
    }

    fn build_url(&self, target: &LookupTarget, token: &str) -> String {
        match target {
            LookupTarget::CheckoutSession => {
                format!("{}/v1/checkout/sessions/{token}", self.base_url)
            }
            LookupTarget::PaymentIntent => {
                format!("{}/v1/payment_intents/{token}", self.base_url)
            }
        }
    }

    async fn status_inner(
        &self,
        token: &str,
    ) -> Result<(ProviderStatusResult, ProviderCallLog), ReconcileError> {
        let (target, normalized_token) = Self::resolve_lookup(token);
        let url = self.build_url(&target, &normalized_token);
        let headers = vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )];

        let Some(api_key) = &self.api_key else {
            return Ok((
                ProviderStatusResult {
                    provider_status_raw: None,
                    mapped_status: None,
                    response_code: None,
                    payload: serde_json::Value::Null,
                    error_message: Some("Stripe API key is not configured".to_string()),
                },
                ProviderCallLog {
                    url,
                    masked_headers: mask_sensitive_headers(&headers),
                    body: None,
                    response_status: None,
                    response_headers: None,
                    response_body: None,
                    error_message: Some("Stripe API key is not configured".to_string()),
                    latency_ms: 0,
                },
            ));
        };

        let mut request = self
            .client
            .get(&url)
            .basic_auth(api_key, Some(""))
            .header("Content-Type", "application/x-www-form-urlencoded");
        if matches!(target, LookupTarget::CheckoutSession) {
            request = request.query(&[("expand[]", "payment_intent")]);
        }

        let start = Instant::now();
        let mut error_message = None;
        let mut response_status = None;
        let mut response_headers = None;
        let mut response_body: Option<serde_json::Value> = None;

        match request.send().await {
            Ok(resp) => {
                response_status = Some(resp.status().as_u16() as i32);
                let hdrs: Vec<(String, String)> = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();
                response_headers = Some(mask_sensitive_headers(&hdrs));
                match resp.json::<serde_json::Value>().await {
                    Ok(body) => response_body = Some(body),
                    Err(err) => error_message = Some(err.to_string()),
                }
            }
            Err(err) => {
                error_message = Some(err.to_string());
            }
        }

        let latency_ms = start.elapsed().as_millis() as i64;

        let (provider_status_raw, mapped_status) = response_body
            .as_ref()
            .map(|body| extract_status(body, &target))
            .unwrap_or((None, None));

        let basic = base64::engine::general_purpose::STANDARD.encode(format!("{api_key}:"));
        let mut auth_headers = headers.clone();
        auth_headers.push(("Authorization".to_string(), format!("Basic {basic}")));

        let result = ProviderStatusResult {
            provider_status_raw,
            mapped_status,
            response_code: response_status,
            payload: response_body.clone().unwrap_or(serde_json::Value::Null),
            error_message: error_message.clone(),
        };
        let log = ProviderCallLog {
            url,
            masked_headers: mask_sensitive_headers(&auth_headers),
            body: None,
            response_status,
            response_headers,
            response_body: response_body.map(|b| b.to_string()),
            error_message,
            latency_ms,
        };
        Ok((result, log))
    }
}

fn map_payment_intent_status(raw: &str) -> Option<MappedStatus> {
    match raw {
        "succeeded" | "requires_capture" => Some(MappedStatus::Authorized),
        "processing" | "requires_action" => Some(MappedStatus::ToConfirm),
        "requires_payment_method" => Some(MappedStatus::Failed),
        "canceled" => Some(MappedStatus::Canceled),
        _ => None,
    }
}

fn map_checkout_session_status(raw: &str) -> Option<MappedStatus> {
    match raw {
        "paid" | "no_payment_required" => Some(MappedStatus::Authorized),
        "unpaid" => Some(MappedStatus::ToConfirm),
        _ => None,
    }
}

fn extract_status(
    payload: &serde_json::Value,
    target: &LookupTarget,
) -> (Option<String>, Option<MappedStatus>) {
    match target {
        LookupTarget::CheckoutSession => {
            let from_pi = payload
                .get("payment_intent")
                .and_then(|pi| pi.get("status"))
                .and_then(|s| s.as_str());
            if let Some(status) = from_pi {
                let mapped = map_payment_intent_status(status);
                if mapped.is_some() {
                    return (Some(status.to_string()), mapped);
                }
            }
            let payment_status = payload.get("payment_status").and_then(|s| s.as_str());
            match payment_status {
                Some(status) => (
                    Some(status.to_string()),
                    map_checkout_session_status(status),
                ),
                None => (from_pi.map(|s| s.to_string()), None),
            }
        }
        LookupTarget::PaymentIntent => {
            let status = payload.get("status").and_then(|s| s.as_str());
            (
                status.map(|s| s.to_string()),
                status.and_then(map_payment_intent_status),
            )
        }
    }
}

impl PspAdapter for StripeAdapter {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn status(
        &self,
        token: &str,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<(ProviderStatusResult, ProviderCallLog), ReconcileError>>
                + Send
                + '_,
        >,
    > {
        let token = token.to_string();
        Box::pin(async move { self.status_inner(&token).await })
    }
}
