use std::env;
use std::time::Duration;

/// Destination code used when a user never picked a pickup point (Moscow).
pub const DEFAULT_DEST: i32 = -1257786;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub telegram_bot_token: String,
    /// Interval between tracking cycles; also the cycle deadline.
    pub poll_interval: Duration,
    /// Worker pool size, the sole throttle against the marketplace API.
    pub fetch_concurrency: usize,
    /// Immediate in-cycle retries on transient fetch errors.
    pub fetch_retries: u32,
    /// Base for the exponential backoff between those retries.
    pub retry_backoff: Duration,
    pub default_dest: i32,
    pub default_max_free_links: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")?;

        let poll_interval_secs: u64 = env::var("POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()?;
        if poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECONDS must be positive".into());
        }

        let fetch_concurrency: usize = env::var("FETCH_CONCURRENCY")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        if fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be positive".into());
        }

        let fetch_retries: u32 = env::var("FETCH_RETRIES")
            .unwrap_or_else(|_| "2".to_string())
            .parse()?;

        let retry_backoff_ms: u64 = env::var("RETRY_BACKOFF_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()?;

        let default_dest: i32 = env::var("DEFAULT_DEST")
            .unwrap_or_else(|_| DEFAULT_DEST.to_string())
            .parse()?;

        let default_max_free_links: i32 = env::var("DEFAULT_MAX_FREE_LINKS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        Ok(Config {
            database_url,
            telegram_bot_token,
            poll_interval: Duration::from_secs(poll_interval_secs),
            fetch_concurrency,
            fetch_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            default_dest,
            default_max_free_links,
        })
    }
}
