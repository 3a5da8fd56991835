use {
    super::{ProviderCallLog, ProviderStatusResult, PspAdapter, mask_sensitive_headers},
    crate::domain::error::ReconcileError,
    crate::domain::provider_status::MappedStatus,
    std::time::Instant,
    std::{future::Future, pin::Pin},
};

pub struct PaypalAdapter {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    base_url: String,
}

impl PaypalAdapter {
    pub fn new(client_id: Option<String>, client_secret: Option<String>, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            client_id,
            client_secret,
            base_url,
        }
    }

    async fn fetch_access_token(&self) -> Result<String, String> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err("PayPal credentials are not configured".to_string());
        };
        let token_url = format!("{}/v1/oauth2/token", self.base_url);
        let resp = self
            .client
            .post(&token_url)
            .basic_auth(client_id, Some(client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("token request failed: {}", resp.status()));
        }
        let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "token response missing access_token".to_string())
    }

    async fn status_inner(
        &self,
        token: &str,
    ) -> Result<(ProviderStatusResult, ProviderCallLog), ReconcileError> {
        let url = format!("{}/v2/checkout/orders/{token}", self.base_url);
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        let start = Instant::now();
        let mut error_message = None;
        let mut response_status = None;
        let mut response_headers = None;
        let mut response_body: Option<serde_json::Value> = None;

        match self.fetch_access_token().await {
            Ok(access_token) => {
                headers.push(("Authorization".to_string(), format!("Bearer {access_token}")));

                let mut request = self.client.get(&url);
                for (name, value) in &headers {
                    request = request.header(name, value);
                }

                match request.send().await {
                    Ok(resp) => {
                        response_status = Some(resp.status().as_u16() as i32);
                        let hdrs: Vec<(String, String)> = resp
                            .headers()
                            .iter()
                            .map(|(k, v)| {
                                (k.to_string(), v.to_str().unwrap_or_default().to_string())
                            })
                            .collect();
                        let is_json = hdrs.iter().any(|(k, v)| {
                            k.eq_ignore_ascii_case("content-type")
                                && v.starts_with("application/json")
                        });
                        response_headers = Some(mask_sensitive_headers(&hdrs));
                        let text = resp.text().await.unwrap_or_default();
                        response_body = if is_json {
                            serde_json::from_str(&text).ok()
                        } else {
                            Some(serde_json::json!({ "raw": text }))
                        };
                    }
                    Err(err) => error_message = Some(err.to_string()),
                }
            }
            Err(err) => {
                error_message = Some(format!("token_error: {err}"));
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
        "COMPLETED" => Some(MappedStatus::Authorized),
        "APPROVED" | "PAYER_ACTION_REQUIRED" => Some(MappedStatus::ToConfirm),
        "CREATED" => Some(MappedStatus::Pending),
        "VOIDED" => Some(MappedStatus::Canceled),
        _ => None,
    }
}

impl PspAdapter for PaypalAdapter {
    fn name(&self) -> &'static str {
        "paypal"
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
