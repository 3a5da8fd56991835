use {
    crate::adapters::psp::PspAdapter,
    crate::config::Config,
    crate::domain::crm::CrmOperation,
    crate::domain::error::ReconcileError,
    crate::domain::events::{
        NewProviderEventLog, NewServiceRuntimeLog, NewStatusCheck, ServiceRuntimeEventType,
    },
    crate::domain::payment::{Payment, PaymentStatus},
    crate::domain::provider_status::MappedStatus,
    crate::infra::postgres::{crm_repo, payment_repo},
    crate::services::crm_payloads,
    chrono::{Duration, Utc},
    sqlx::PgPool,
    std::collections::HashMap,
    std::sync::Arc,
    tokio::sync::watch,
};

fn mapped_to_payment_status(mapped: MappedStatus) -> PaymentStatus {
    match mapped {
        MappedStatus::Authorized => PaymentStatus::Authorized,
        MappedStatus::ToConfirm => PaymentStatus::ToConfirm,
        MappedStatus::Pending => PaymentStatus::Pending,
        MappedStatus::Failed => PaymentStatus::Failed,
        MappedStatus::Canceled => PaymentStatus::Canceled,
    }
}

/// Runs forever with period `reconcile_interval_seconds`. Sleeps and skips
/// the cycle while `reconcile_enabled=false` — §4.5.
pub async fn run(
    pool: PgPool,
    config: Arc<Config>,
    adapters: Arc<HashMap<String, Arc<dyn PspAdapter>>>,
    host: String,
    instance_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("psp poller started");
    let mut last_heartbeat = Utc::now() - Duration::seconds(config.heartbeat_interval_seconds);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("psp poller shutting down");
                return;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(config.reconcile_interval_seconds)) => {}
        }

        if !config.reconcile_enabled {
            continue;
        }

        match process_once(&pool, &config, &adapters, &host, &instance_id, &mut last_heartbeat).await
        {
            Ok(summary) => {
                if summary.processed > 0 || summary.abandoned_by_timeout > 0 {
                    tracing::info!(
                        processed = summary.processed,
                        abandoned = summary.abandoned,
                        abandoned_by_timeout = summary.abandoned_by_timeout,
                        "poller cycle complete"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "poller cycle error"),
        }
    }
}

#[derive(Default, Debug)]
pub struct CycleSummary {
    pub processed: usize,
    pub abandoned: usize,
    pub abandoned_by_timeout: usize,
}

pub async fn process_once(
    pool: &PgPool,
    config: &Config,
    adapters: &HashMap<String, Arc<dyn PspAdapter>>,
    host: &str,
    instance_id: &str,
    last_heartbeat: &mut chrono::DateTime<Utc>,
) -> Result<CycleSummary, ReconcileError> {
    let mut tx = pool.begin().await?;
    let mut summary = CycleSummary::default();

    let candidates = payment_repo::select_payments_for_reconciliation(
        &mut tx,
        &config.reconcile_polling_providers,
        config.reconcile_batch_size,
    )
    .await?;

    for payment in candidates {
        process_candidate(&mut tx, config, adapters, &payment, &mut summary).await?;
    }

    let cutoff = Utc::now() - Duration::minutes(config.abandoned_timeout_minutes);
    let timed_out =
        payment_repo::find_abandoned_payments(&mut tx, cutoff, config.reconcile_batch_size)
            .await?;
    for payment in &timed_out {
        payment_repo::update_payment_status(
            &mut tx,
            payment.id,
            &PaymentStatus::Abandoned,
            Some("abandoned timeout"),
        )
        .await?;
        let payload = crm_payloads::build(payment, CrmOperation::AbandonedCart);
        crm_repo::enqueue_crm_operation(&mut tx, payment.id, CrmOperation::AbandonedCart, &payload)
            .await?;
        summary.abandoned_by_timeout += 1;
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
                    "loop": "psp_poller",
                    "processed": summary.processed,
                    "abandoned": summary.abandoned,
                    "abandoned_by_timeout": summary.abandoned_by_timeout,
                }),
            },
        )
        .await?;
        *last_heartbeat = now;
    }

    tx.commit().await?;
    Ok(summary)
}

async fn process_candidate(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    config: &Config,
    adapters: &HashMap<String, Arc<dyn PspAdapter>>,
    payment: &Payment,
    summary: &mut CycleSummary,
) -> Result<(), ReconcileError> {
    let Some(adapter) = adapters.get(payment.provider.as_str()) else {
        tracing::warn!(payment_id = payment.id, provider = %payment.provider, "no adapter configured, skipping");
        return Ok(());
    };

    let offsets = &config.reconcile_attempt_offsets;
    let k = payment.attempts;

    if k >= offsets.len() as i64 {
        abandon(tx, payment, summary).await?;
        return Ok(());
    }

    let due_at = payment.created_at + Duration::seconds(offsets[k as usize]);
    if Utc::now() < due_at {
        return Ok(());
    }

    // Candidate selection filters `token IS NOT NULL`.
    let token = payment.token.as_deref().expect("reconciliation candidate without token");
    let (result, call_log) = adapter.status(token).await?;
    summary.processed += 1;

    payment_repo::record_provider_event(
        tx,
        &NewProviderEventLog {
            payment_id: payment.id,
            provider: payment.provider.as_str(),
            url: call_log.url,
            masked_headers: call_log.masked_headers,
            body: call_log.body,
            response_status: call_log.response_status,
            response_headers: call_log.response_headers,
            response_body: call_log.response_body,
            error_message: call_log.error_message.clone(),
            latency_ms: call_log.latency_ms,
        },
    )
    .await?;

    let success = result.success();
    payment_repo::record_status_check(
        tx,
        &NewStatusCheck {
            payment_id: payment.id,
            provider: payment.provider.as_str(),
            success,
            provider_status: result.provider_status_raw.clone(),
            mapped_status: result.mapped_status.map(|m| m.as_str()),
            response_code: result.response_code,
            raw_payload: result.payload.clone(),
            error: result.error_message.clone(),
            requested_at: Utc::now(),
        },
    )
    .await?;

    let Some(mapped) = result.mapped_status else {
        if k + 1 >= offsets.len() as i64 {
            abandon(tx, payment, summary).await?;
        }
        return Ok(());
    };

    let new_status = mapped_to_payment_status(mapped);
    if new_status == payment.status {
        return Ok(());
    }

    if !payment.status.can_transition_to(&new_status) {
        tracing::warn!(
            payment_id = payment.id,
            from = payment.status.as_str(),
            to = new_status.as_str(),
            "provider reported a status outside the allowed transition graph, skipping"
        );
        return Ok(());
    }

    let reason = match new_status {
        PaymentStatus::Authorized
        | PaymentStatus::Failed
        | PaymentStatus::Canceled
        | PaymentStatus::Refunded => Some("provider reconciliation update"),
        _ => None,
    };
    payment_repo::update_payment_status(tx, payment.id, &new_status, reason).await?;

    if new_status == PaymentStatus::Authorized {
        let payload = crm_payloads::build(payment, CrmOperation::PaymentApproved);
        crm_repo::enqueue_crm_operation(tx, payment.id, CrmOperation::PaymentApproved, &payload)
            .await?;
    }

    Ok(())
}

async fn abandon(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment: &Payment,
    summary: &mut CycleSummary,
) -> Result<(), ReconcileError> {
    payment_repo::mark_attempts_exhausted(tx, payment.id).await?;
    let payload = crm_payloads::build(payment, CrmOperation::AbandonedCart);
    crm_repo::enqueue_crm_operation(tx, payment.id, CrmOperation::AbandonedCart, &payload).await?;
    summary.abandoned += 1;
    Ok(())
}
