//! Dependency container wiring the job subsystem, HTTP layer, and
//! background tasks together (the teacher's `ServerKernel` pattern,
//! generalized: this orchestrator's dependency graph is much smaller, so
//! one struct covers what the teacher split across `ServerKernel` +
//! `ServerDeps`).

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::domains::automation::use_cases::register_all;
use crate::domains::automation::{TemplateComposer, TextComposer};
use crate::domains::clients::{ClientStore, JwtService};
use crate::kernel::jobs::{
    BrowserPort, CredentialCodec, Metrics, NullBrowserPort, PgJobTaskStore, RateLimiterConfig,
    RouterConfig, RouterHandle, TaskDispatcher,
};

/// Everything the HTTP layer and the background workers share.
#[derive(Clone)]
pub struct AppDeps {
    pub pool: PgPool,
    pub store: Arc<PgJobTaskStore>,
    pub router_handle: RouterHandle,
    pub metrics: Arc<Metrics>,
    pub client_store: Arc<ClientStore>,
    pub jwt_service: Arc<JwtService>,
    pub credential_codec: Arc<CredentialCodec>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub browser: Arc<dyn BrowserPort>,
    pub composer: Arc<dyn TextComposer>,
    pub rate_limiter_config: RateLimiterConfig,
    pub router_config: RouterConfig,
    pub config: Arc<Config>,
}

impl AppDeps {
    /// Wires the dependency graph for a given pool/router handle pair.
    /// The caller (main.rs) is responsible for spawning the router,
    /// reaper, and worker tasks; this only builds the shared, clonable
    /// handles those tasks and the HTTP layer both need.
    pub fn new(pool: PgPool, router_handle: RouterHandle, metrics: Arc<Metrics>, config: Arc<Config>) -> anyhow::Result<Self> {
        let store = Arc::new(PgJobTaskStore::new(pool.clone()));
        let client_store = Arc::new(ClientStore::new(pool.clone()));
        let jwt_service = Arc::new(JwtService::new(
            &config.jwt_secret,
            "account-automation-orchestrator".to_string(),
            config.access_token_ttl_minutes,
        ));
        let credential_codec = Arc::new(CredentialCodec::new(config.encryption_master_key.clone())?);
        let browser: Arc<dyn BrowserPort> = Arc::new(NullBrowserPort);
        let composer: Arc<dyn TextComposer> = Arc::new(TemplateComposer);

        let mut dispatcher = TaskDispatcher::new();
        register_all(&mut dispatcher, browser.clone(), composer.clone());

        let rate_limiter_config = RateLimiterConfig {
            hourly: crate::kernel::jobs::WindowConfig::new(
                config.rate_hourly_window_s,
                config.rate_hourly_max_events,
            ),
            daily: crate::kernel::jobs::WindowConfig::new(
                config.rate_daily_window_s,
                config.rate_daily_max_events,
            ),
            per_target: crate::kernel::jobs::WindowConfig::new(
                config.per_target_rate_window_s,
                config.per_target_rate_max_events,
            ),
            cooldown_range: config.rate_cooldown_range_s,
            max_wait: config.rate_max_wait(),
        };

        let router_config = RouterConfig {
            max_inflight_per_account: config.max_inflight_per_account,
            lease_ttl: std::time::Duration::from_secs(config.lease_ttl_default_s as u64),
        };

        Ok(Self {
            pool,
            store,
            router_handle,
            metrics,
            client_store,
            jwt_service,
            credential_codec,
            dispatcher: Arc::new(dispatcher),
            browser,
            composer,
            rate_limiter_config,
            router_config,
            config,
        })
    }
}
