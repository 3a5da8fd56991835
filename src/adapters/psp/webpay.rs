use {
    super::{ProviderCallLog, ProviderStatusResult, PspAdapter, mask_sensitive_headers},
    crate::domain::error::ReconcileError,
    crate::domain::provider_status::MappedStatus,
    std::time::Instant,
    std::{future::Future, pin::Pin},
};

pub struct WebpayAdapter {
    client: reqwest::Client,
    status_url_template: String,
    api_key_id: Option<String>,
    api_key_secret: Option<String>,
    commerce_code: Option<String>,
}

impl WebpayAdapter {
    pub fn new(
        status_url_template: String,
        api_key_id: Option<String>,
        api_key_secret: Option<String>,
        commerce_code: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            status_url_template,
            api_key_id,
            api_key_secret,
            commerce_code,
        }
    }

    async fn status_inner(
        &self,
        token: &str,
    ) -> Result<(ProviderStatusResult, ProviderCallLog), ReconcileError> {
        let url = self.status_url_template.replace("{token}", token);

        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(id) = &self.api_key_id {
            headers.push(("Tbk-Api-Key-Id".to_string(), id.clone()));
        }
        if let Some(secret) = &self.api_key_secret {
            headers.push(("Tbk-Api-Key-Secret".to_string(), secret.clone()));
        }
        if let Some(code) = &self.commerce_code {
            headers.push(("Tbk-Commerce-Code".to_string(), code.clone()));
        }

        let mut request = self.client.get(&url);
        for (name, value) in &headers {
            request = request.header(name, value);
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
                let is_json = hdrs
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.starts_with("application/json"));
                response_headers = Some(mask_sensitive_headers(&hdrs));
                let text = resp.text().await.unwrap_or_default();
                response_body = if is_json {
                    serde_json::from_str(&text).ok()
                } else {
                    Some(serde_json::json!({ "raw": text }))
                };
            }
            Err(err) => {
                error_message = Some(err.to_string());
            }
        }

        let latency_ms = start.elapsed().as_millis() as i64;

        let provider_status_raw = response_body
            .as_ref()
            .and_then(|b| b.get("status"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string());
        let mapped_status = provider_status_raw.as_deref().and_then(map_status);

        let result = ProviderStatusResult {
            provider_status_raw,
            mapped_status,
            response_code: response_status,
            payload: response_body.clone().unwrap_or(serde_json::Value::Null),
            error_message: error_message.clone(),
        };
        let log = ProviderCallLog {
            url,
            masked_headers: mask_sensitive_headers(&headers),
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

fn map_status(raw: &str) -> Option<MappedStatus> {
    match raw.to_ascii_uppercase().as_str() {
        "AUTHORIZED" => Some(MappedStatus::Authorized),
        "FAILED" | "REJECTED" => Some(MappedStatus::Failed),
        "REVERSED" | "NULLIFIED" => Some(MappedStatus::Canceled),
        "PENDING" | "INITIALIZED" => Some(MappedStatus::Pending),
        _ => None,
    }
}

impl PspAdapter for WebpayAdapter {
    fn name(&self) -> &'static str {
        "webpay"
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
