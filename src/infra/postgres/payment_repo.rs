use {
    crate::domain::error::ReconcileError,
    crate::domain::events::{NewProviderEventLog, NewServiceRuntimeLog, NewStatusCheck},
    crate::domain::money::{Currency, MoneyAmount},
    crate::domain::payment::{Payment, PaymentStatus, PaymentType, Provider},
    chrono::{DateTime, Utc},
};

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    status: String,
    provider: String,
    token: Option<String>,
    created_at: DateTime<Utc>,
    amount_minor: i64,
    currency: String,
    aux_amount_minor: Option<i64>,
    payment_order_id: Option<String>,
    order_customer_rut: Option<String>,
    authorization_code: Option<String>,
    contract_number: Option<String>,
    quota_numbers: Option<Vec<i32>>,
    payment_type: Option<String>,
    should_notify_crm: bool,
    deposit_name: Option<String>,
    deposit_rut: Option<String>,
    context: serde_json::Value,
    provider_metadata: serde_json::Value,
    first_authorized_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    status_reason: Option<String>,
    updated_at: DateTime<Utc>,
    attempts: Option<i64>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, ReconcileError> {
        Ok(Payment {
            id: self.id,
            status: PaymentStatus::try_from(self.status.as_str())?,
            provider: Provider::try_from(self.provider.as_str())?,
            token: self.token,
            created_at: self.created_at,
            amount_minor: MoneyAmount::new(self.amount_minor)?,
            currency: Currency::try_from(self.currency.as_str())?,
            aux_amount_minor: self.aux_amount_minor.map(MoneyAmount::new).transpose()?,
            payment_order_id: self.payment_order_id,
            order_customer_rut: self.order_customer_rut,
            authorization_code: self.authorization_code,
            contract_number: self.contract_number,
            quota_numbers: self.quota_numbers.unwrap_or_default(),
            payment_type: self
                .payment_type
                .map(|t| PaymentType::try_from(t.as_str()))
                .transpose()?,
            should_notify_crm: self.should_notify_crm,
            deposit_name: self.deposit_name,
            deposit_rut: self.deposit_rut,
            context: self.context,
            provider_metadata: self.provider_metadata,
            first_authorized_at: self.first_authorized_at,
            failed_at: self.failed_at,
            canceled_at: self.canceled_at,
            refunded_at: self.refunded_at,
            status_reason: self.status_reason,
            updated_at: self.updated_at,
            attempts: self.attempts.unwrap_or(0),
        })
    }
}

const PAYMENT_SELECT_COLUMNS: &str = r#"
    p.id, p.status, p.provider, p.token, p.created_at, p.amount_minor, p.currency,
    aux.aux_amount_minor,
    p.payment_order_id, po.customer_rut AS order_customer_rut,
    p.authorization_code, p.contract_number,
    pc.quota_numbers,
    p.payment_type, p.should_notify_crm,
    dep.deposit_name, dep.deposit_rut,
    p.context, p.provider_metadata,
    p.first_authorized_at, p.failed_at, p.canceled_at, p.refunded_at,
    p.status_reason, p.updated_at,
    sc.attempts
"#;

/// Candidates for reconciliation: PENDING/TO_CONFIRM payments with a token,
/// restricted to the configured provider allow-list, row-locked so
/// concurrent instances don't double-process the same payment.
pub async fn select_payments_for_reconciliation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    providers: &[String],
    batch_size: i64,
) -> Result<Vec<Payment>, ReconcileError> {
    let query = format!(
        r#"
        SELECT {PAYMENT_SELECT_COLUMNS}
        FROM payments.payment p
        JOIN (
            SELECT id FROM payments.payment
            WHERE status IN ('pending', 'to_confirm')
              AND token IS NOT NULL
              AND provider = ANY($1)
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        ) locked ON locked.id = p.id
        LEFT JOIN payments.payment_order po ON po.id = p.payment_order_id
        LEFT JOIN payments.payment_contract pc ON pc.payment_id = p.id
        LEFT JOIN payments.payment_deposit_info dep ON dep.payment_id = p.id
        LEFT JOIN payments.payment_aux_amount aux ON aux.payment_id = p.id
        LEFT JOIN (
            SELECT payment_id, COUNT(*) AS attempts
            FROM payments.status_check
            GROUP BY payment_id
        ) sc ON sc.payment_id = p.id
        ORDER BY p.created_at ASC
        "#
    );

    let rows: Vec<PaymentRow> = sqlx::query_as(&query)
        .bind(providers)
        .bind(batch_size)
        .fetch_all(&mut **tx)
        .await?;

    rows.into_iter().map(PaymentRow::into_payment).collect()
}

/// PENDING payments whose `created_at` is older than `cutoff` — candidates
/// for abandoned-by-timeout.
pub async fn find_abandoned_payments(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Payment>, ReconcileError> {
    let query = format!(
        r#"
        SELECT {PAYMENT_SELECT_COLUMNS}
        FROM payments.payment p
        JOIN (
            SELECT id FROM payments.payment
            WHERE status = 'pending' AND created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        ) locked ON locked.id = p.id
        LEFT JOIN payments.payment_order po ON po.id = p.payment_order_id
        LEFT JOIN payments.payment_contract pc ON pc.payment_id = p.id
        LEFT JOIN payments.payment_deposit_info dep ON dep.payment_id = p.id
        LEFT JOIN payments.payment_aux_amount aux ON aux.payment_id = p.id
        LEFT JOIN (
            SELECT payment_id, COUNT(*) AS attempts
            FROM payments.status_check
            GROUP BY payment_id
        ) sc ON sc.payment_id = p.id
        ORDER BY p.created_at ASC
        "#
    );

    let rows: Vec<PaymentRow> = sqlx::query_as(&query)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

    rows.into_iter().map(PaymentRow::into_payment).collect()
}

/// AUTHORIZED payments with no `payment_approved` queue row — used by the
/// Sender's self-heal sweep.
pub async fn find_authorized_payments_without_crm(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
) -> Result<Vec<Payment>, ReconcileError> {
    let query = format!(
        r#"
        SELECT {PAYMENT_SELECT_COLUMNS}
        FROM payments.payment p
        JOIN (
            SELECT p.id FROM payments.payment p
            WHERE p.status = 'authorized'
              AND NOT EXISTS (
                  SELECT 1 FROM payments.crm_push_queue q
                  WHERE q.payment_id = p.id AND q.operation = 'payment_approved'
              )
            ORDER BY p.created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        ) locked ON locked.id = p.id
        LEFT JOIN payments.payment_order po ON po.id = p.payment_order_id
        LEFT JOIN payments.payment_contract pc ON pc.payment_id = p.id
        LEFT JOIN payments.payment_deposit_info dep ON dep.payment_id = p.id
        LEFT JOIN payments.payment_aux_amount aux ON aux.payment_id = p.id
        LEFT JOIN (
            SELECT payment_id, COUNT(*) AS attempts
            FROM payments.status_check
            GROUP BY payment_id
        ) sc ON sc.payment_id = p.id
        ORDER BY p.created_at ASC
        "#
    );

    let rows: Vec<PaymentRow> = sqlx::query_as(&query)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

    rows.into_iter().map(PaymentRow::into_payment).collect()
}

fn timestamp_column(new_status: &PaymentStatus) -> Option<&'static str> {
    match new_status {
        PaymentStatus::Authorized => Some("first_authorized_at"),
        PaymentStatus::Failed => Some("failed_at"),
        PaymentStatus::Canceled => Some("canceled_at"),
        PaymentStatus::Refunded => Some("refunded_at"),
        PaymentStatus::Abandoned => Some("abandoned_at"),
        PaymentStatus::Pending | PaymentStatus::ToConfirm => None,
    }
}

/// Sets `status`, optionally `status_reason`, `updated_at = now()`, and the
/// first-transition timestamp for the new state (I2: set only if currently
/// null, via `COALESCE`).
pub async fn update_payment_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
    new_status: &PaymentStatus,
    status_reason: Option<&str>,
) -> Result<(), ReconcileError> {
    let mut set_clauses = vec!["status = $1".to_string(), "updated_at = now()".to_string()];
    if status_reason.is_some() {
        set_clauses.push("status_reason = $2".to_string());
    }
    if let Some(column) = timestamp_column(new_status) {
        set_clauses.push(format!("{column} = COALESCE({column}, now())"));
    }

    let query = format!(
        "UPDATE payments.payment SET {} WHERE id = {}",
        set_clauses.join(", "),
        if status_reason.is_some() { "$3" } else { "$2" }
    );

    let mut q = sqlx::query(&query).bind(new_status.as_str());
    if let Some(reason) = status_reason {
        q = q.bind(reason);
    }
    q = q.bind(id);
    q.execute(&mut **tx).await?;
    Ok(())
}

/// `update_payment_status(id, ABANDONED, "reconcile attempts exhausted")`.
pub async fn mark_attempts_exhausted(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
) -> Result<(), ReconcileError> {
    update_payment_status(
        tx,
        id,
        &PaymentStatus::Abandoned,
        Some("reconcile attempts exhausted"),
    )
    .await
}

pub async fn record_status_check(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewStatusCheck,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        INSERT INTO payments.status_check
            (payment_id, provider, success, provider_status, mapped_status,
             response_code, raw_payload, error_message, requested_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
        entry.payment_id,
        entry.provider,
        entry.success,
        entry.provider_status,
        entry.mapped_status,
        entry.response_code,
        entry.raw_payload,
        entry.error,
        entry.requested_at,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn record_provider_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewProviderEventLog,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        INSERT INTO payments.provider_event_log
            (payment_id, provider, request_url, request_headers, request_body,
             response_status, response_headers, response_body, error_message, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
        entry.payment_id,
        entry.provider,
        entry.url,
        entry.masked_headers,
        entry.body,
        entry.response_status,
        entry.response_headers,
        entry.response_body,
        entry.error_message,
        entry.latency_ms,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn log_service_runtime_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewServiceRuntimeLog,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        INSERT INTO payments.service_runtime_log (instance_id, host, pid, event_type, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
        entry.instance_id,
        entry.host,
        entry.pid,
        entry.event_type.as_str(),
        entry.payload,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Point-in-time counters for the admin health-metrics endpoint. Not part
/// of any reconciliation cycle, so it reads straight off the pool.
pub struct PaymentsSummary {
    pub total_payments: i64,
    pub authorized_payments: i64,
    pub total_amount_minor: i64,
    pub total_amount_currency: Option<String>,
    pub last_payment_at: Option<DateTime<Utc>>,
}

pub async fn get_payments_summary(
    pool: &sqlx::PgPool,
) -> Result<PaymentsSummary, ReconcileError> {
    let row = sqlx::query!(
        r#"
        SELECT
            COUNT(*) AS "total_payments!",
            COUNT(*) FILTER (WHERE status = 'authorized') AS "authorized_payments!",
            COALESCE(SUM(amount_minor) FILTER (WHERE status = 'authorized'), 0) AS "total_amount_minor!",
            (ARRAY_AGG(currency ORDER BY created_at DESC))[1] AS total_amount_currency,
            MAX(created_at) AS last_payment_at
        FROM payments.payment
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(PaymentsSummary {
        total_payments: row.total_payments,
        authorized_payments: row.authorized_payments,
        total_amount_minor: row.total_amount_minor,
        total_amount_currency: row.total_amount_currency,
        last_payment_at: row.last_payment_at,
    })
}
