use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub sweeper: SweeperConfig,
    pub academic_year_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_count: usize,
    pub queue_size: usize,
    pub retry_max_elapsed_ms: u64,
}

impl WorkerConfig {
    pub fn retry_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.retry_max_elapsed_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: 4,
            queue_size: 256,
            retry_max_elapsed_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Pending structures older than this are re-queued by the sweeper.
    pub stale_after_secs: i64,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            stale_after_secs: 300,
        }
    }
}

impl FeeConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("mongo"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let mongodb_uri = match backend {
            StoreBackend::Mongo => Some(get_env("MONGODB_URI", None, is_prod)?),
            StoreBackend::Memory => env::var("MONGODB_URI").ok(),
        };

        let worker_defaults = WorkerConfig::default();
        let sweeper_defaults = SweeperConfig::default();

        Ok(FeeConfig {
            common: common_config,
            store: StoreConfig {
                backend,
                mongodb_uri,
                mongodb_database: get_env("MONGODB_DATABASE", Some("fee_db"), is_prod)?,
            },
            worker: WorkerConfig {
                enabled: parse_env("WORKER_ENABLED", worker_defaults.enabled)?,
                worker_count: parse_env("WORKER_COUNT", worker_defaults.worker_count)?,
                queue_size: parse_env("WORKER_QUEUE_SIZE", worker_defaults.queue_size)?,
                retry_max_elapsed_ms: parse_env(
                    "WORKER_RETRY_MAX_ELAPSED_MS",
                    worker_defaults.retry_max_elapsed_ms,
                )?,
            },
            sweeper: SweeperConfig {
                enabled: parse_env("SWEEPER_ENABLED", sweeper_defaults.enabled)?,
                interval_secs: parse_env("SWEEPER_INTERVAL_SECS", sweeper_defaults.interval_secs)?,
                stale_after_secs: parse_env(
                    "SWEEPER_STALE_AFTER_SECS",
                    sweeper_defaults.stale_after_secs,
                )?,
            },
            academic_year_cache_ttl_secs: parse_env("ACADEMIC_YEAR_CACHE_TTL_SECS", 300)?,
        })
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Optional tuning knobs: the default applies in every environment.
fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}
