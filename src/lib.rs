pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {config::Config, std::sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Arc<Config>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub host: String,
}
