use {
    crate::domain::crm::{CrmOperation, CrmQueueItem, CrmQueueStatus},
    crate::domain::error::ReconcileError,
    crate::domain::events::NewCrmEventLog,
    chrono::{DateTime, Utc},
};

#[derive(sqlx::FromRow)]
struct CrmQueueRow {
    id: i64,
    payment_id: i64,
    operation: String,
    status: String,
    attempts: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    response_code: Option<i32>,
    crm_id: Option<String>,
    last_error: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CrmQueueRow {
    fn into_item(self) -> Result<CrmQueueItem, ReconcileError> {
        Ok(CrmQueueItem {
            id: self.id,
            payment_id: self.payment_id,
            operation: CrmOperation::try_from(self.operation.as_str())?,
            status: CrmQueueStatus::try_from(self.status.as_str())?,
            attempts: self.attempts,
            next_attempt_at: self.next_attempt_at,
            last_attempt_at: self.last_attempt_at,
            response_code: self.response_code,
            crm_id: self.crm_id,
            last_error: self.last_error,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Upsert on unique `(payment_id, operation)` — I3. On conflict, resets the
/// row to PENDING/attempts=0, clears attempt/response bookkeeping and
/// replaces the payload. This is both the idempotent-enqueue primitive
/// (P6) and the reset-for-retry primitive.
pub async fn enqueue_crm_operation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: i64,
    operation: CrmOperation,
    payload: &serde_json::Value,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        INSERT INTO payments.crm_push_queue (payment_id, operation, status, attempts, payload)
        VALUES ($1, $2, 'pending', 0, $3)
        ON CONFLICT (payment_id, operation) DO UPDATE SET
            status = 'pending',
            attempts = 0,
            next_attempt_at = NULL,
            last_attempt_at = NULL,
            response_code = NULL,
            crm_id = NULL,
            last_error = NULL,
            payload = EXCLUDED.payload,
            updated_at = now()
        "#,
        payment_id,
        operation.as_str(),
        payload,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Pending and due items, row-locked with skip-locked, oldest first.
pub async fn fetch_pending_crm_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
) -> Result<Vec<CrmQueueItem>, ReconcileError> {
    let rows: Vec<CrmQueueRow> = sqlx::query_as(
        r#"
        SELECT id, payment_id, operation, status, attempts, next_attempt_at,
               last_attempt_at, response_code, crm_id, last_error, payload,
               created_at, updated_at
        FROM payments.crm_push_queue
        WHERE status = 'pending'
          AND (next_attempt_at IS NULL OR next_attempt_at <= now())
        ORDER BY created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(CrmQueueRow::into_item).collect()
}

pub async fn update_crm_item_success(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
    response_code: i32,
    crm_id: Option<&str>,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        UPDATE payments.crm_push_queue
        SET status = 'sent', response_code = $1, crm_id = $2, last_error = NULL,
            last_attempt_at = now(), updated_at = now()
        WHERE id = $3
        "#,
        response_code,
        crm_id,
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_crm_item_failure(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
    attempts: i32,
    next_attempt_at: DateTime<Utc>,
    response_code: Option<i32>,
    error_message: &str,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        UPDATE payments.crm_push_queue
        SET status = 'failed', attempts = $1, next_attempt_at = $2,
            last_attempt_at = now(), response_code = $3, last_error = $4, updated_at = now()
        WHERE id = $5
        "#,
        attempts,
        next_attempt_at,
        response_code,
        error_message,
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Flips up to `limit` due FAILED rows back to PENDING, nulls-first by
/// `next_attempt_at`. Returns the count flipped.
pub async fn reactivate_failed_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
) -> Result<u64, ReconcileError> {
    let result = sqlx::query!(
        r#"
        WITH moved AS (
            SELECT id
            FROM payments.crm_push_queue
            WHERE status = 'failed'
              AND (next_attempt_at IS NULL OR next_attempt_at <= now())
            ORDER BY next_attempt_at ASC NULLS FIRST
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE payments.crm_push_queue AS q
        SET status = 'pending', updated_at = now()
        FROM moved
        WHERE q.id = moved.id
        "#,
        limit,
    )
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

pub async fn record_crm_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewCrmEventLog,
) -> Result<(), ReconcileError> {
    sqlx::query!(
        r#"
        INSERT INTO payments.crm_event_log
            (crm_queue_item_id, request_url, request_headers, request_body,
             response_status, response_headers, response_body, error_message, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
        entry.crm_queue_item_id,
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
