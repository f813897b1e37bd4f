// Entry point: wires the job subsystem (C1-C6) to the HTTP front-end
// (C7) and runs both until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use server_core::kernel::jobs::{
    JobTaskStore, LeaseReaper, Metrics, PgJobTaskStore, RateLimiter, ReaperConfig, Router,
    RouterConfig, Worker, WorkerConfig,
};
use server_core::kernel::AppDeps;
use server_core::server::rate_limit::ClientRateLimiter;
use server_core::server::{build_app, AppState};
use server_core::{Config, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_logging(&config);

    tracing::info!("starting account-automation orchestrator");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.db_dsn)
        .await
        .context("failed to connect to database")?;

    tracing::info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let metrics = Arc::new(Metrics::default());
    let config = Arc::new(config);

    let store: Arc<dyn JobTaskStore> = Arc::new(PgJobTaskStore::new(pool.clone()));
    let router_config = RouterConfig {
        max_inflight_per_account: config.max_inflight_per_account,
        lease_ttl: Duration::from_secs(config.lease_ttl_default_s as u64),
    };
    let (router, router_handle) = Router::new(store.clone(), router_config, metrics.clone());

    let deps = AppDeps::new(pool.clone(), router_handle.clone(), metrics.clone(), config.clone())
        .context("failed to wire application dependencies")?;

    let accounts =
        server_core::kernel::jobs::load_accounts(&config.accounts_json, &deps.credential_codec)
            .context("failed to load ACCOUNTS_JSON")?;
    if accounts.is_empty() {
        tracing::warn!("ACCOUNTS_JSON has no accounts; no workers will register with the router");
    }

    let shutdown = CancellationToken::new();

    let router_task = tokio::spawn(router.run(shutdown.child_token()));

    let reaper = LeaseReaper::new(
        store.clone(),
        ReaperConfig {
            interval: config.lease_cleanup_interval(),
            max_n: config.lease_cleanup_max_per_run,
        },
        metrics.clone(),
    );
    let reaper_task = tokio::spawn(reaper.run(shutdown.child_token()));

    let mut worker_tasks = Vec::with_capacity(accounts.len());
    let mut worker_handles = Vec::with_capacity(accounts.len());
    for account in &accounts {
        let rate_limiter = Arc::new(RateLimiter::new(deps.rate_limiter_config.clone()));
        let worker = Worker::new(
            WorkerConfig {
                worker_id: format!("worker-{}", account.id),
                account: account.id.clone(),
                supported_kinds: account.supported_kinds.clone(),
                channel_capacity: config.worker_channel_capacity,
            },
            router_handle.clone(),
            deps.dispatcher.clone(),
            rate_limiter,
            deps.browser.clone(),
        );
        worker_handles.push(worker.handle());
        worker_tasks.push(tokio::spawn(worker.run(shutdown.child_token())));
    }

    let state = AppState {
        db_pool: pool,
        store: store.clone(),
        router_handle: router_handle.clone(),
        worker_handles,
        clients: deps.client_store.clone(),
        jwt_service: deps.jwt_service.clone(),
        credential_codec: deps.credential_codec.clone(),
        metrics: metrics.clone(),
        rate_limiter: Arc::new(ClientRateLimiter::in_memory(60, 1)),
        default_lease_ttl_s: config.lease_ttl_default_s,
        default_max_attempts: 3,
    };

    let app = build_app(state, config.max_body_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind server address")?;

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    );

    tokio::select! {
        result = serve => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    shutdown.cancel();
    router_task.await.ok();
    reaper_task.await.ok();
    for task in worker_tasks {
        task.await.ok();
    }

    tracing::info!("orchestrator stopped");
    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into());

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
