use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Format `tracing-subscriber` writes log lines in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(LogFormat::Json),
            "console" => Ok(LogFormat::Console),
            other => anyhow::bail!("LOG_FORMAT must be 'json' or 'console', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables, carrying
/// every field spec.md §6's "Configuration (enumerated)" list names.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_dsn: String,
    pub redis_url: Option<String>,

    pub lease_ttl_default_s: i64,
    pub lease_cleanup_interval_s: u64,
    pub lease_cleanup_max_per_run: i64,

    pub max_inflight_per_account: usize,
    pub worker_channel_capacity: usize,

    pub rate_hourly_window_s: i64,
    pub rate_hourly_max_events: usize,
    pub rate_daily_window_s: i64,
    pub rate_daily_max_events: usize,
    pub rate_cooldown_range_s: (i64, i64),
    pub per_target_rate_window_s: i64,
    pub per_target_rate_max_events: usize,
    pub rate_max_wait_s: u64,

    pub require_https: bool,
    pub max_body_bytes: usize,
    pub access_token_ttl_minutes: i64,
    pub encryption_master_key: String,
    pub jwt_secret: String,
    pub log_format: LogFormat,
    /// JSON array of `{id, supported_kinds, credential}` platform
    /// accounts (see `kernel::jobs::accounts::load_accounts`). The
    /// roster is static configuration: onboarding a new account means
    /// editing this and restarting the process.
    pub accounts_json: String,
}

impl Config {
    /// Load configuration from environment variables, loading a `.env`
    /// file first when present (development convenience).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            port: env_parse_or("PORT", 8080)?,
            db_dsn: env::var("DATABASE_URL")
                .or_else(|_| env::var("DB_DSN"))
                .context("DATABASE_URL (or DB_DSN) must be set")?,
            redis_url: env::var("REDIS_URL").ok(),

            lease_ttl_default_s: env_parse_or("LEASE_TTL_DEFAULT_S", 300)?,
            lease_cleanup_interval_s: env_parse_or("LEASE_CLEANUP_INTERVAL_S", 60)?,
            lease_cleanup_max_per_run: env_parse_or("LEASE_CLEANUP_MAX_PER_RUN", 100)?,

            max_inflight_per_account: env_parse_or("MAX_INFLIGHT_PER_ACCOUNT", 1)?,
            worker_channel_capacity: env_parse_or("WORKER_CHANNEL_CAPACITY", 1)?,

            rate_hourly_window_s: env_parse_or("RATE_HOURLY_WINDOW_S", 3600)?,
            rate_hourly_max_events: env_parse_or("RATE_HOURLY_MAX_EVENTS", 30)?,
            rate_daily_window_s: env_parse_or("RATE_DAILY_WINDOW_S", 86_400)?,
            rate_daily_max_events: env_parse_or("RATE_DAILY_MAX_EVENTS", 200)?,
            rate_cooldown_range_s: (
                env_parse_or("RATE_COOLDOWN_MIN_S", 600)?,
                env_parse_or("RATE_COOLDOWN_MAX_S", 2400)?,
            ),
            per_target_rate_window_s: env_parse_or("PER_TARGET_RATE_WINDOW_S", 3600)?,
            per_target_rate_max_events: env_parse_or("PER_TARGET_RATE_MAX_EVENTS", 1)?,
            rate_max_wait_s: env_parse_or("RATE_MAX_WAIT_S", 120)?,

            require_https: env_parse_or("REQUIRE_HTTPS", false)?,
            max_body_bytes: env_parse_or("MAX_BODY_BYTES", 1_048_576usize)?,
            access_token_ttl_minutes: env_parse_or("ACCESS_TOKEN_TTL_MINUTES", 60)?,
            encryption_master_key: env::var("ENCRYPTION_MASTER_KEY")
                .context("ENCRYPTION_MASTER_KEY must be set (>= 32 chars)")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "console".to_string())
                .parse()?,
            accounts_json: env::var("ACCOUNTS_JSON")
                .context("ACCOUNTS_JSON must be set")?,
        })
    }

    pub fn lease_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.lease_cleanup_interval_s)
    }

    pub fn rate_max_wait(&self) -> Duration {
        Duration::from_secs(self.rate_max_wait_s)
    }
}

fn env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}
