use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn env_var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required(key: &'static str) -> Result<String, ConfigError> {
    env_var(key).ok_or(ConfigError::Missing(key))
}

fn env_or(key: &'static str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
    }
}

fn env_int(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn csv_to_int_list(key: &'static str, default: &[i64]) -> Result<Vec<i64>, ConfigError> {
    match env_var(key) {
        None => Ok(default.to_vec()),
        Some(v) => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| ConfigError::Invalid { key, value: v.clone() }))
            .collect(),
    }
}

fn csv_to_str_list(key: &'static str, default: &[&str]) -> Vec<String> {
    match env_var(key) {
        None => default.iter().map(|s| s.to_string()).collect(),
        Some(v) => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Process-wide configuration, read once from the environment at startup.
/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub app_environment: String,
    pub app_version: String,

    pub database_dsn: String,

    pub reconcile_enabled: bool,
    pub crm_enabled: bool,
    pub reconcile_interval_seconds: u64,
    pub reconcile_batch_size: i64,
    pub reconcile_attempt_offsets: Vec<i64>,
    pub reconcile_polling_providers: Vec<String>,
    pub abandoned_timeout_minutes: i64,

    pub crm_base_url: String,
    pub crm_pagar_path: String,
    pub crm_auth_bearer: Option<String>,
    pub crm_timeout_seconds: u64,
    pub crm_retry_backoff: Vec<i64>,

    pub heartbeat_interval_seconds: i64,

    pub health_auth_bearer: Option<String>,

    pub stripe_api_key: Option<String>,
    pub stripe_api_base: String,

    pub paypal_client_id: Option<String>,
    pub paypal_client_secret: Option<String>,
    pub paypal_base_url: String,

    pub webpay_status_url_template: String,
    pub webpay_api_key_id: Option<String>,
    pub webpay_api_key_secret: Option<String>,
    pub webpay_commerce_code: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            app_name: env_or("APP_NAME", "payment_reconciler"),
            app_environment: env_or("APP_ENVIRONMENT", "development"),
            app_version: env_or("APP_VERSION", env!("CARGO_PKG_VERSION")),

            database_dsn: env_required("DATABASE_DSN")?,

            reconcile_enabled: env_bool("RECONCILE_ENABLED", true)?,
            crm_enabled: env_bool("CRM_ENABLED", true)?,
            reconcile_interval_seconds: env_int("RECONCILE_INTERVAL_SECONDS", 15)? as u64,
            reconcile_batch_size: env_int("RECONCILE_BATCH_SIZE", 100)?,
            reconcile_attempt_offsets: csv_to_int_list(
                "RECONCILE_ATTEMPT_OFFSETS",
                &[60, 180, 900, 1800],
            )?,
            reconcile_polling_providers: csv_to_str_list(
                "RECONCILE_POLLING_PROVIDERS",
                &["webpay", "stripe", "paypal"],
            ),
            abandoned_timeout_minutes: env_int("ABANDONED_TIMEOUT_MINUTES", 60)?,

            crm_base_url: env_or(
                "CRM_BASE_URL",
                "http://localhost:8980/unify/inyeccion/contrato/v2",
            ),
            crm_pagar_path: env_or("CRM_PAGAR_PATH", "/pagar"),
            crm_auth_bearer: env_var("CRM_AUTH_BEARER"),
            crm_timeout_seconds: env_int("CRM_TIMEOUT_SECONDS", 10)? as u64,
            crm_retry_backoff: csv_to_int_list("CRM_RETRY_BACKOFF", &[60, 300, 1800])?,

            heartbeat_interval_seconds: env_int("HEARTBEAT_INTERVAL_SECONDS", 60)?,

            health_auth_bearer: env_var("HEALTH_AUTH_BEARER"),

            stripe_api_key: env_var("STRIPE_API_KEY"),
            stripe_api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com"),

            paypal_client_id: env_var("PAYPAL_CLIENT_ID"),
            paypal_client_secret: env_var("PAYPAL_CLIENT_SECRET"),
            paypal_base_url: env_or("PAYPAL_BASE_URL", "https://api-m.sandbox.paypal.com"),

            webpay_status_url_template: env_or(
                "WEBPAY_STATUS_URL_TEMPLATE",
                "https://webpay3gint.transbank.cl/rswebpaytransaction/api/webpay/v1.2/transactions/{token}",
            ),
            webpay_api_key_id: env_var("WEBPAY_API_KEY_ID"),
            webpay_api_key_secret: env_var("WEBPAY_API_KEY_SECRET"),
            webpay_commerce_code: env_var("WEBPAY_COMMERCE_CODE"),
        })
    }

    /// Backoff seconds for the given (1-based) attempt count, saturating at
    /// the schedule's last entry.
    pub fn crm_backoff_for_attempt(&self, attempts: i32) -> i64 {
        let idx = ((attempts - 1).max(0) as usize).min(self.crm_retry_backoff.len() - 1);
        self.crm_retry_backoff[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_backoff_saturates_at_last_entry() {
        let mut cfg = minimal();
        cfg.crm_retry_backoff = vec![60, 300, 1800];
        assert_eq!(cfg.crm_backoff_for_attempt(1), 60);
        assert_eq!(cfg.crm_backoff_for_attempt(2), 300);
        assert_eq!(cfg.crm_backoff_for_attempt(3), 1800);
        assert_eq!(cfg.crm_backoff_for_attempt(10), 1800);
    }

    fn minimal() -> Config {
        Config {
            app_name: "payment_reconciler".into(),
            app_environment: "test".into(),
            app_version: "0.0.0".into(),
            database_dsn: "postgres://localhost/test".into(),
            reconcile_enabled: true,
            crm_enabled: true,
            reconcile_interval_seconds: 15,
            reconcile_batch_size: 100,
            reconcile_attempt_offsets: vec![60, 180, 900, 1800],
            reconcile_polling_providers: vec!["webpay".into()],
            abandoned_timeout_minutes: 60,
            crm_base_url: "http://localhost".into(),
            crm_pagar_path: "/pagar".into(),
            crm_auth_bearer: None,
            crm_timeout_seconds: 10,
            crm_retry_backoff: vec![60, 300, 1800],
            heartbeat_interval_seconds: 60,
            health_auth_bearer: None,
            stripe_api_key: None,
            stripe_api_base: "https://api.stripe.com".into(),
            paypal_client_id: None,
            paypal_client_secret: None,
            paypal_base_url: "https://api-m.sandbox.paypal.com".into(),
            webpay_status_url_template: "https://example.com/{token}".into(),
            webpay_api_key_id: None,
            webpay_api_key_secret: None,
            webpay_commerce_code: None,
        }
    }
}
