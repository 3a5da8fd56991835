pub mod errors;

use {
    crate::AppState,
    crate::infra::postgres::payment_repo,
    axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
    },
    chrono::Utc,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health/metrics", get(health_metrics))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Mirrors the source's `_verify_health_auth`: no configured token means
/// the endpoint is open; otherwise a missing/mismatched bearer is rejected.
fn verify_health_auth(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = &state.config.health_auth_bearer else {
        return Ok(());
    };
    match bearer_token(headers) {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(token) if token.trim() == expected => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
    }
}

async fn health_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    verify_health_auth(&state, &headers)?;

    let now = Utc::now();
    let uptime_seconds = (now - state.started_at).num_seconds().max(0);

    let (status_label, payments_summary) = match payment_repo::get_payments_summary(&state.pool).await
    {
        Ok(summary) => (
            "ok",
            serde_json::json!({
                "total_payments": summary.total_payments,
                "authorized_payments": summary.authorized_payments,
                "total_amount_minor": summary.total_amount_minor,
                "total_amount_currency": summary.total_amount_currency,
                "last_payment_at": summary.last_payment_at,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health metrics probe failed");
            (
                "degraded",
                serde_json::json!({
                    "total_payments": 0,
                    "authorized_payments": 0,
                    "total_amount_minor": 0,
                    "total_amount_currency": null,
                    "last_payment_at": null,
                }),
            )
        }
    };

    Ok(Json(serde_json::json!({
        "status": status_label,
        "timestamp": now.to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "default_provider": state.config.reconcile_polling_providers.first(),
            "environment": state.config.app_environment,
            "version": state.config.app_version,
            "host": state.host,
            "pid": std::process::id(),
        },
        "payments": payments_summary,
    })))
}
