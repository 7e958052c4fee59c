use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thrift_core::locking::{
    DEFAULT_LOCK_MAX_RETRIES, DEFAULT_LOCK_RETRY_DELAY_MS, DEFAULT_LOCK_TTL_SECS,
    DEFAULT_MAINTENANCE_INTERVAL_SECS,
};
use thrift_core::retry::{RetryPolicy, DEFAULT_MAX_RETRY_DELAY};

/// Default request body limit for image uploads: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background jobs to stop after the server does
    /// (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL connection string. Unset means the in-memory store.
    pub database_url: Option<String>,
    /// Interval of the lock and staging cleanup job (default: `60`).
    pub maintenance_interval_secs: u64,
    pub storage: StorageConfig,
    pub lock: LockConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                    |
    /// | `DATABASE_URL`              | unset                   |
    /// | `MAINTENANCE_INTERVAL_SECS` | `60`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            database_url,
            maintenance_interval_secs: env_or(
                "MAINTENANCE_INTERVAL_SECS",
                DEFAULT_MAINTENANCE_INTERVAL_SECS,
            ),
            storage: StorageConfig::from_env(),
            lock: LockConfig::from_env(),
        }
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

/// Where draft images live on disk and how they are served.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of canonical images (`UPLOAD_DIR`, default `storage/uploads`).
    pub upload_dir: PathBuf,
    /// Staging area for incoming bytes (`STAGING_DIR`, default `storage/staging`).
    pub staging_dir: PathBuf,
    /// URL prefix the upload root is served under (`PUBLIC_UPLOAD_PREFIX`,
    /// default `/uploads`).
    pub public_prefix: String,
    /// Request body limit for uploads (`MAX_UPLOAD_BYTES`, default 25 MiB).
    pub max_upload_bytes: usize,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let public_prefix = public_prefix(
            &std::env::var("PUBLIC_UPLOAD_PREFIX").unwrap_or_else(|_| "/uploads".into()),
        );

        Self {
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "storage/uploads".into())
                .into(),
            staging_dir: std::env::var("STAGING_DIR")
                .unwrap_or_else(|_| "storage/staging".into())
                .into(),
            public_prefix,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

/// Normalize `PUBLIC_UPLOAD_PREFIX` to `/segment[/...]` without a trailing
/// slash.
///
/// Panics on a prefix that resolves to the root, which would shadow the API.
fn public_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        panic!("PUBLIC_UPLOAD_PREFIX must name a path below the root (e.g. /uploads), got '{raw}'");
    }
    format!("/{trimmed}")
}

/// Lock lease duration and contention retry settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// `LOCK_TTL_SECS` (default `30`).
    pub ttl_secs: u64,
    /// `LOCK_MAX_RETRIES` (default `10`).
    pub max_retries: u32,
    /// `LOCK_RETRY_DELAY_MS` (default `1000`).
    pub retry_delay_ms: u64,
    /// `LOCK_RETRY_MULTIPLIER` (default `1.0`, a fixed delay).
    pub retry_multiplier: f64,
    /// `LOCK_RETRY_JITTER` (default `false`).
    pub retry_jitter: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
            max_retries: DEFAULT_LOCK_MAX_RETRIES,
            retry_delay_ms: DEFAULT_LOCK_RETRY_DELAY_MS,
            retry_multiplier: 1.0,
            retry_jitter: false,
        }
    }
}

impl LockConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl_secs: env_or("LOCK_TTL_SECS", defaults.ttl_secs),
            max_retries: env_or("LOCK_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("LOCK_RETRY_DELAY_MS", defaults.retry_delay_ms),
            retry_multiplier: env_or("LOCK_RETRY_MULTIPLIER", defaults.retry_multiplier),
            retry_jitter: env_or("LOCK_RETRY_JITTER", defaults.retry_jitter),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            multiplier: self.retry_multiplier.max(1.0),
            max_delay: DEFAULT_MAX_RETRY_DELAY.max(Duration::from_millis(self.retry_delay_ms)),
            jitter: self.retry_jitter,
        }
    }
}

/// Parse `name` from the environment, falling back to `default` when unset.
///
/// Panics on unparsable values so misconfiguration fails at startup.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lock_config_is_fixed_one_second_ten_retries() {
        let policy = LockConfig::default().retry_policy();

        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), 11);
        assert_eq!(policy.delay_for(5), Duration::from_secs(1));
    }

    #[test]
    fn public_prefix_is_normalized() {
        assert_eq!(public_prefix("/uploads"), "/uploads");
        assert_eq!(public_prefix("uploads/"), "/uploads");
        assert_eq!(public_prefix(" /media/drafts/ "), "/media/drafts");
    }

    #[test]
    #[should_panic(expected = "PUBLIC_UPLOAD_PREFIX must name a path below the root")]
    fn root_public_prefix_is_rejected() {
        public_prefix("/");
    }

    #[test]
    fn multiplier_below_one_is_clamped() {
        let config = LockConfig {
            retry_multiplier: 0.5,
            ..LockConfig::default()
        };

        assert_eq!(config.retry_policy().multiplier, 1.0);
    }

    #[test]
    fn long_retry_delay_raises_the_cap() {
        let config = LockConfig {
            retry_delay_ms: 20_000,
            ..LockConfig::default()
        };

        assert_eq!(config.retry_policy().max_delay, Duration::from_secs(20));
    }
}
