use {super::psp::mask_sensitive_headers, crate::domain::error::ReconcileError, std::time::Instant};

/// Result of one `send(payload)` call — §4.3.
pub struct CrmResponse {
    pub status_code: i32,
    pub response_body: serde_json::Value,
    pub crm_id: Option<String>,
    pub latency_ms: i64,
}

/// Full request/response pair ready for `CrmEventLog`.
pub struct CrmCallLog {
    pub masked_request_headers: serde_json::Value,
    pub request_body: serde_json::Value,
    pub masked_response_headers: serde_json::Value,
    pub response_body: serde_json::Value,
    pub error_message: Option<String>,
}

pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    pagar_path: String,
    bearer_token: Option<String>,
}

impl CrmClient {
    pub fn new(
        base_url: String,
        pagar_path: String,
        bearer_token: Option<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            pagar_path,
            bearer_token,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.pagar_path)
    }

    pub async fn send(
        &self,
        payload: &serde_json::Value,
    ) -> Result<(CrmResponse, CrmCallLog), ReconcileError> {
        let url = self.endpoint();
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(token) = &self.bearer_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        let mut request = self.client.post(&url).json(payload);
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        let start = Instant::now();
        let mut status_code = 0i32;
        let mut response_headers: Vec<(String, String)> = Vec::new();
        let mut response_body: Option<serde_json::Value> = None;
        let mut crm_id = None;
        let mut error_message = None;

        match request.send().await {
            Ok(resp) => {
                status_code = resp.status().as_u16() as i32;
                response_headers = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();
                let is_json = response_headers.iter().any(|(k, v)| {
                    k.eq_ignore_ascii_case("content-type") && v.starts_with("application/json")
                });
                let text = resp.text().await.unwrap_or_default();
                let body = if is_json {
                    serde_json::from_str(&text).ok()
                } else {
                    Some(serde_json::json!({ "raw": text }))
                };
                if let Some(b) = &body {
                    crm_id = b.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());
                }
                response_body = body;
            }
            Err(err) => {
                error_message = Some(err.to_string());
            }
        }

        let latency_ms = start.elapsed().as_millis() as i64;
        let response_payload = response_body.clone().unwrap_or_else(|| {
            error_message
                .as_ref()
                .map(|e| serde_json::json!({ "error": e }))
                .unwrap_or_else(|| serde_json::json!({ "status_code": status_code }))
        });

        let result = CrmResponse {
            status_code,
            response_body: response_payload.clone(),
            crm_id,
            latency_ms,
        };
        let log = CrmCallLog {
            masked_request_headers: mask_sensitive_headers(&headers),
            request_body: payload.clone(),
            masked_response_headers: mask_sensitive_headers(&response_headers),
            response_body: response_payload,
            error_message,
        };
        Ok((result, log))
    }
}
