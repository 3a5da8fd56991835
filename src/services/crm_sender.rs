use {
    crate::adapters::crm_client::CrmClient,
    crate::config::Config,
    crate::domain::crm::CrmOperation,
    crate::domain::error::ReconcileError,
    crate::domain::events::{NewCrmEventLog, NewServiceRuntimeLog, ServiceRuntimeEventType},
    crate::infra::postgres::{crm_repo, payment_repo},
    crate::services::crm_payloads,
    chrono::{Duration, Utc},
    sqlx::PgPool,
    std::sync::Arc,
    tokio::sync::watch,
};

/// Runs forever with period `reconcile_interval_seconds`; gated by
/// `crm_enabled` — §4.6.
pub async fn run(
    pool: PgPool,
    config: Arc<Config>,
    client: Arc<CrmClient>,
    host: String,
    instance_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("crm sender started");
    let mut last_heartbeat = Utc::now() - Duration::seconds(config.heartbeat_interval_seconds);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("crm sender shutting down");
                return;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(config.reconcile_interval_seconds)) => {}
        }

        if !config.crm_enabled {
            continue;
        }

        match process_once(&pool, &config, &client, &host, &instance_id, &mut last_heartbeat).await
        {
            Ok(summary) => {
                if summary.sent > 0 || summary.failed > 0 || summary.reactivated > 0 {
                    tracing::info!(
                        sent = summary.sent,
                        failed = summary.failed,
                        reactivated = summary.reactivated,
                        self_healed = summary.self_healed,
                        "sender cycle complete"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "sender cycle error"),
        }
    }
}

#[derive(Default, Debug)]
pub struct CycleSummary {
    pub self_healed: usize,
    pub reactivated: u64,
    pub sent: usize,
    pub failed: usize,
}

pub async fn process_once(
    pool: &PgPool,
    config: &Config,
    client: &CrmClient,
    host: &str,
    instance_id: &str,
    last_heartbeat: &mut chrono::DateTime<Utc>,
) -> Result<CycleSummary, ReconcileError> {
    let mut tx = pool.begin().await?;
    let mut summary = CycleSummary::default();

    let unheralded =
        payment_repo::find_authorized_payments_without_crm(&mut tx, config.reconcile_batch_size)
            .await?;
    for payment in &unheralded {
        let payload = crm_payloads::build(payment, CrmOperation::PaymentApproved);
        crm_repo::enqueue_crm_operation(&mut tx, payment.id, CrmOperation::PaymentApproved, &payload)
            .await?;
        summary.self_healed += 1;
    }

    summary.reactivated =
        crm_repo::reactivate_failed_items(&mut tx, config.reconcile_batch_size).await?;

    let pending = crm_repo::fetch_pending_crm_items(&mut tx, config.reconcile_batch_size).await?;
    for item in pending {
        let (response, call_log) = client.send(&item.payload).await?;

        crm_repo::record_crm_event(
            &mut tx,
            &NewCrmEventLog {
                crm_queue_item_id: item.id,
                url: client.endpoint(),
                masked_headers: call_log.masked_request_headers,
                body: call_log.request_body,
                response_status: Some(response.status_code),
                response_headers: Some(call_log.masked_response_headers),
                response_body: Some(call_log.response_body),
                error_message: call_log.error_message.clone(),
                latency_ms: response.latency_ms,
            },
        )
        .await?;

        let ok = call_log.error_message.is_none() && (200..300).contains(&response.status_code);
        if ok {
            crm_repo::update_crm_item_success(
                &mut tx,
                item.id,
                response.status_code,
                response.crm_id.as_deref(),
            )
            .await?;
            summary.sent += 1;
        } else {
            let attempts = item.attempts + 1;
            let next_attempt_at =
                Utc::now() + Duration::seconds(config.crm_backoff_for_attempt(attempts));
            let error_message = call_log
                .error_message
                .clone()
                .unwrap_or_else(|| format!("crm responded with status {}", response.status_code));
            crm_repo::update_crm_item_failure(
                &mut tx,
                item.id,
                attempts,
                next_attempt_at,
                Some(response.status_code),
                &error_message,
            )
            .await?;
            summary.failed += 1;
        }
    }

    let now = Utc::now();
    if (now - *last_heartbeat).num_seconds() >= config.heartbeat_interval_seconds {
        payment_repo::log_service_runtime_event(
            &mut tx,
            &NewServiceRuntimeLog {
                instance_id: instance_id.to_string(),
                host: host.to_string(),
                pid: std::process::id() as i32,
                event_type: ServiceRuntimeEventType::Heartbeat,
                payload: serde_json::json!({
                    "loop": "crm_sender",
                    "self_healed": summary.self_healed,
                    "reactivated": summary.reactivated,
                    "sent": summary.sent,
                    "failed": summary.failed,
                }),
            },
        )
        .await?;
        *last_heartbeat = now;
    }

    tx.commit().await?;
    Ok(summary)
}
