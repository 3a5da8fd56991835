mod common;

use {
    axum::{Json, Router, extract::State, routing::post},
    chrono::{Duration, Utc},
    common::*,
    payment_reconciler::{
        adapters::crm_client::CrmClient, config::Config, services::crm_sender::process_once,
    },
    std::sync::{
        Arc,
        atomic::{AtomicI32, AtomicUsize, Ordering},
    },
};

#[derive(Clone)]
struct MockCrmState {
    status_sequence: Arc<Vec<u16>>,
    call_count: Arc<AtomicUsize>,
    crm_id_counter: Arc<AtomicI32>,
}

async fn mock_pagar(State(state): State<MockCrmState>) -> (axum::http::StatusCode, Json<serde_json::Value>) {
    let call = state.call_count.fetch_add(1, Ordering::SeqCst);
    let status = state
        .status_sequence
        .get(call)
        .copied()
        .unwrap_or(*state.status_sequence.last().unwrap());
    let crm_id = state.crm_id_counter.fetch_add(1, Ordering::SeqCst);
    let body = if (200..300).contains(&status) {
        serde_json::json!({ "id": format!("crm-{crm_id}") })
    } else {
        serde_json::json!({ "error": "unavailable" })
    };
    (axum::http::StatusCode::from_u16(status).unwrap(), Json(body))
}

/// Starts a one-route mock CRM server returning successive statuses from
/// `status_sequence` (repeating the last entry once exhausted). Returns the
/// bound base URL.
async fn spawn_mock_crm(status_sequence: Vec<u16>) -> String {
    let state = MockCrmState {
        status_sequence: Arc::new(status_sequence),
        call_count: Arc::new(AtomicUsize::new(0)),
        crm_id_counter: Arc::new(AtomicI32::new(1)),
    };
    let app = Router::new()
        .route("/pagar", post(mock_pagar))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn test_config(base_url: String) -> Config {
    Config {
        app_name: "payment_reconciler_test".into(),
        app_environment: "test".into(),
        app_version: "0.0.0".into(),
        database_dsn: String::new(),
        reconcile_enabled: true,
        crm_enabled: true,
        reconcile_interval_seconds: 15,
        reconcile_batch_size: 100,
        reconcile_attempt_offsets: vec![60, 180, 900, 1800],
        reconcile_polling_providers: vec!["webpay".into()],
        abandoned_timeout_minutes: 60,
        crm_base_url: base_url,
        crm_pagar_path: "/pagar".into(),
        crm_auth_bearer: None,
        crm_timeout_seconds: 5,
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

#[tokio::test]
async fn happy_path_drain_marks_sent() {
    let pool = setup_pool("payment_reconciler_test_sender_happy").await;
    let base_url = spawn_mock_crm(vec![201]).await;
    let config = test_config(base_url.clone());
    let client = CrmClient::new(
        config.crm_base_url.clone(),
        config.crm_pagar_path.clone(),
        config.crm_auth_bearer.clone(),
        config.crm_timeout_seconds,
    );

    let id = insert_payment(
        &pool,
        &NewPayment {
            status: "authorized",
            ..Default::default()
        },
    )
    .await;
    sqlx::query!(
        r#"
        INSERT INTO payments.crm_push_queue (payment_id, operation, status, attempts, payload)
        VALUES ($1, 'payment_approved', 'pending', 0, '{"paymentId": 1}'::jsonb)
        "#,
        id,
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut last_heartbeat = Utc::now() - Duration::seconds(120);
    process_once(&pool, &config, &client, "host", "instance", &mut last_heartbeat)
        .await
        .unwrap();

    let row = get_crm_queue_row(&pool, id).await.expect("queue row");
    assert_eq!(row.status, "sent");
    assert_eq!(row.response_code, Some(201));
    assert_eq!(row.crm_id.as_deref(), Some("crm-1"));
}

#[tokio::test]
async fn crm_backoff_then_recovers() {
    let pool = setup_pool("payment_reconciler_test_sender_backoff").await;
    let base_url = spawn_mock_crm(vec![503, 200]).await;
    let config = test_config(base_url.clone());
    let client = CrmClient::new(
        config.crm_base_url.clone(),
        config.crm_pagar_path.clone(),
        config.crm_auth_bearer.clone(),
        config.crm_timeout_seconds,
    );

    let id = insert_payment(
        &pool,
        &NewPayment {
            status: "authorized",
            ..Default::default()
        },
    )
    .await;
    sqlx::query!(
        r#"
        INSERT INTO payments.crm_push_queue (payment_id, operation, status, attempts, payload)
        VALUES ($1, 'payment_approved', 'pending', 0, '{"paymentId": 1}'::jsonb)
        "#,
        id,
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut last_heartbeat = Utc::now() - Duration::seconds(120);
    process_once(&pool, &config, &client, "host", "instance", &mut last_heartbeat)
        .await
        .unwrap();

    let row = get_crm_queue_row(&pool, id).await.expect("queue row");
    assert_eq!(row.status, "failed");
    assert_eq!(row.attempts, 1);
    assert!(row.next_attempt_at.unwrap() > Utc::now() + Duration::seconds(55));

    // Force the backoff window open and reactivate.
    sqlx::query!(
        "UPDATE payments.crm_push_queue SET next_attempt_at = now() - interval '1 second' WHERE payment_id = $1",
        id,
    )
    .execute(&pool)
    .await
    .unwrap();

    process_once(&pool, &config, &client, "host", "instance", &mut last_heartbeat)
        .await
        .unwrap();

    let row = get_crm_queue_row(&pool, id).await.expect("queue row");
    assert_eq!(row.status, "sent");
    assert_eq!(row.attempts, 1);
}

#[tokio::test]
async fn self_heal_enqueues_missing_payment_approved() {
    let pool = setup_pool("payment_reconciler_test_sender_selfheal").await;
    let base_url = spawn_mock_crm(vec![201]).await;
    let config = test_config(base_url.clone());
    let client = CrmClient::new(
        config.crm_base_url.clone(),
        config.crm_pagar_path.clone(),
        config.crm_auth_bearer.clone(),
        config.crm_timeout_seconds,
    );

    let id = insert_payment(
        &pool,
        &NewPayment {
            status: "authorized",
            ..Default::default()
        },
    )
    .await;

    let mut last_heartbeat = Utc::now() - Duration::seconds(120);
    process_once(&pool, &config, &client, "host", "instance", &mut last_heartbeat)
        .await
        .unwrap();

    let row = get_crm_queue_row(&pool, id).await.expect("self-healed queue row");
    assert_eq!(row.operation, "payment_approved");
    assert_eq!(row.status, "sent");
}

#[tokio::test]
async fn reenqueue_after_failure_resets_idempotently() {
    let pool = setup_pool("payment_reconciler_test_sender_reenqueue").await;
    let id = insert_payment(
        &pool,
        &NewPayment {
            status: "authorized",
            ..Default::default()
        },
    )
    .await;
    sqlx::query!(
        r#"
        INSERT INTO payments.crm_push_queue
            (payment_id, operation, status, attempts, last_error, payload)
        VALUES ($1, 'payment_approved', 'failed', 3, 'boom', '{"old": true}'::jsonb)
        "#,
        id,
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    payment_reconciler::infra::postgres::crm_repo::enqueue_crm_operation(
        &mut tx,
        id,
        payment_reconciler::domain::crm::CrmOperation::PaymentApproved,
        &serde_json::json!({"new": true}),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let row = get_crm_queue_row(&pool, id).await.expect("queue row");
    assert_eq!(row.status, "pending");
    assert_eq!(row.attempts, 0);
    assert!(row.next_attempt_at.is_none());
    assert!(row.last_error.is_none());
    assert_eq!(count_crm_queue_rows(&pool, id, "payment_approved").await, 1);
}
