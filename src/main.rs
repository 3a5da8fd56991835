use {
    payment_reconciler::{
        AppState,
        adapters::crm_client::CrmClient,
        adapters::psp::PspAdapter,
        adapters::psp::{paypal::PaypalAdapter, stripe::StripeAdapter, webpay::WebpayAdapter},
        config::Config,
        domain::events::{NewServiceRuntimeLog, ServiceRuntimeEventType},
        infra::postgres::payment_repo,
        services::{crm_sender, psp_poller},
        transport::http,
    },
    std::{collections::HashMap, sync::Arc},
    tokio::sync::watch,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(app = %config.app_name, env = %config.app_environment, "starting up");

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        .connect(&config.database_dsn)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    let host = hostname();
    let instance_id = format!("{host}:{}", std::process::id());

    let all_adapters: Vec<Arc<dyn PspAdapter>> = vec![
        Arc::new(WebpayAdapter::new(
            config.webpay_status_url_template.clone(),
            config.webpay_api_key_id.clone(),
            config.webpay_api_key_secret.clone(),
            config.webpay_commerce_code.clone(),
        )),
        Arc::new(StripeAdapter::new(
            config.stripe_api_key.clone(),
            config.stripe_api_base.clone(),
        )),
        Arc::new(PaypalAdapter::new(
            config.paypal_client_id.clone(),
            config.paypal_client_secret.clone(),
            config.paypal_base_url.clone(),
        )),
    ];
    let mut adapter_map: HashMap<String, Arc<dyn PspAdapter>> = HashMap::new();
    for adapter in all_adapters {
        adapter_map.insert(adapter.name().to_string(), adapter);
    }
    adapter_map.retain(|name, _| config.reconcile_polling_providers.contains(name));
    let adapters = Arc::new(adapter_map);
    tracing::info!(providers = ?adapters.keys().collect::<Vec<_>>(), "configured providers");

    let crm_client = Arc::new(CrmClient::new(
        config.crm_base_url.clone(),
        config.crm_pagar_path.clone(),
        config.crm_auth_bearer.clone(),
        config.crm_timeout_seconds,
    ));

    {
        let mut tx = pool.begin().await?;
        payment_repo::log_service_runtime_event(
            &mut tx,
            &NewServiceRuntimeLog {
                instance_id: instance_id.clone(),
                host: host.clone(),
                pid: std::process::id() as i32,
                event_type: ServiceRuntimeEventType::Startup,
                payload: serde_json::json!({ "app": config.app_name }),
            },
        )
        .await?;
        tx.commit().await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = tokio::spawn(psp_poller::run(
        pool.clone(),
        config.clone(),
        adapters.clone(),
        host.clone(),
        instance_id.clone(),
        shutdown_rx.clone(),
    ));
    let sender_handle = tokio::spawn(crm_sender::run(
        pool.clone(),
        config.clone(),
        crm_client,
        host.clone(),
        instance_id.clone(),
        shutdown_rx.clone(),
    ));

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        started_at: chrono::Utc::now(),
        host: host.clone(),
    };
    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;

    tracing::info!("admin http server listening on 0.0.0.0:3000");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin http server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;
    let _ = sender_handle.await;

    let mut tx = pool.begin().await?;
    payment_repo::log_service_runtime_event(
        &mut tx,
        &NewServiceRuntimeLog {
            instance_id,
            host,
            pid: std::process::id() as i32,
            event_type: ServiceRuntimeEventType::Shutdown,
            payload: serde_json::json!({ "app": config.app_name }),
        },
    )
    .await?;
    tx.commit().await?;

    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
