use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider: {0}")]
    Provider(String),

    #[error("configuration: {0}")]
    Config(String),
}
