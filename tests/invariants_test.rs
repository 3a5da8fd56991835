mod common;

use {
    chrono::Utc,
    common::*,
    payment_reconciler::domain::crm::CrmOperation,
    payment_reconciler::domain::payment::PaymentStatus,
    payment_reconciler::infra::postgres::{crm_repo, payment_repo},
};

/// P1: the `attempts` field read back by the poller query equals the count
/// of status_check rows for that payment.
#[tokio::test]
async fn attempts_matches_status_check_count() {
    let pool = setup_pool("payment_reconciler_test_invariant_p1").await;
    let id = insert_payment(&pool, &NewPayment::default()).await;

    for _ in 0..3 {
        sqlx::query!(
            r#"
            INSERT INTO payments.status_check
                (payment_id, provider, success, provider_status, mapped_status,
                 response_code, raw_payload, requested_at)
            VALUES ($1, 'webpay', true, 'PENDING', 'pending', 200, '{}'::jsonb, now())
            "#,
            id,
        )
        .execute(&pool)
        .await
        .unwrap();
    }

    let mut tx = pool.begin().await.unwrap();
    let candidates = payment_repo::select_payments_for_reconciliation(
        &mut tx,
        &["webpay".to_string()],
        100,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let payment = candidates.into_iter().find(|p| p.id == id).expect("candidate present");
    assert_eq!(payment.attempts, 3);
}

/// P2: at most one queue row exists per (payment_id, operation) across repeated enqueues.
#[tokio::test]
async fn at_most_one_queue_row_per_operation() {
    let pool = setup_pool("payment_reconciler_test_invariant_p2").await;
    let id = insert_payment(&pool, &NewPayment::default()).await;

    for _ in 0..5 {
        let mut tx = pool.begin().await.unwrap();
        crm_repo::enqueue_crm_operation(
            &mut tx,
            id,
            CrmOperation::PaymentApproved,
            &serde_json::json!({ "n": 1 }),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    assert_eq!(count_crm_queue_rows(&pool, id, "payment_approved").await, 1);
}

/// P3: `first_authorized_at` is set on first AUTHORIZED transition and never
/// changes afterwards, even if the payment is (re)written to AUTHORIZED again
/// within the allowed graph.
#[tokio::test]
async fn first_authorized_at_is_monotonic() {
    let pool = setup_pool("payment_reconciler_test_invariant_p3").await;
    let id = insert_payment(
        &pool,
        &NewPayment {
            status: "to_confirm",
            ..Default::default()
        },
    )
    .await;

    let mut tx = pool.begin().await.unwrap();
    payment_repo::update_payment_status(&mut tx, id, &PaymentStatus::Authorized, None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let first_seen: chrono::DateTime<Utc> =
        sqlx::query_scalar!("SELECT first_authorized_at FROM payments.payment WHERE id = $1", id)
            .fetch_one(&pool)
            .await
            .unwrap()
            .expect("first_authorized_at set");

    // A later write to the same status must not move the timestamp (COALESCE).
    let mut tx = pool.begin().await.unwrap();
    payment_repo::update_payment_status(&mut tx, id, &PaymentStatus::Authorized, None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let second_seen: chrono::DateTime<Utc> =
        sqlx::query_scalar!("SELECT first_authorized_at FROM payments.payment WHERE id = $1", id)
            .fetch_one(&pool)
            .await
            .unwrap()
            .expect("first_authorized_at still set");

    assert_eq!(first_seen, second_seen);
}

/// P6: idempotent enqueue — N calls with identical args leave exactly one
/// row with status=PENDING, attempts=0, next_attempt_at=null, latest payload.
#[tokio::test]
async fn enqueue_is_idempotent() {
    let pool = setup_pool("payment_reconciler_test_invariant_p6").await;
    let id = insert_payment(&pool, &NewPayment::default()).await;

    for payload in [
        serde_json::json!({ "v": 1 }),
        serde_json::json!({ "v": 2 }),
        serde_json::json!({ "v": 3 }),
    ] {
        let mut tx = pool.begin().await.unwrap();
        crm_repo::enqueue_crm_operation(&mut tx, id, CrmOperation::AbandonedCart, &payload)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let row = get_crm_queue_row(&pool, id).await.expect("queue row");
    assert_eq!(row.status, "pending");
    assert_eq!(row.attempts, 0);
    assert!(row.next_attempt_at.is_none());
    assert_eq!(count_crm_queue_rows(&pool, id, "abandoned_cart").await, 1);

    let payload: serde_json::Value = sqlx::query_scalar!(
        "SELECT payload FROM payments.crm_push_queue WHERE payment_id = $1",
        id
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(payload, serde_json::json!({ "v": 3 }));
}
