use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub providers: ProviderConfig,

    pub search: SearchConfig,

    pub rate_limit: RateLimitConfig,

    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/pixelarr.db".to_string(),
            log_level: "info".to_string(),
            suppress_connection_errors: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Unsplash access key, sent as an `Authorization: Client-ID` header.
    pub unsplash_access_key: String,

    /// Pexels API key, sent as a raw `Authorization` header.
    pub pexels_api_key: String,

    /// Pixabay API key, sent as a `key` query parameter.
    pub pixabay_api_key: String,

    /// Socket-level timeout for the shared HTTP client (default: 30)
    pub request_timeout_seconds: u32,

    /// Per-provider budget within one search; a provider that blows it is
    /// treated as failed and contributes an empty partial result.
    pub provider_timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            unsplash_access_key: String::new(),
            pexels_api_key: String::new(),
            pixabay_api_key: String::new(),
            request_timeout_seconds: 30,
            provider_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_per_page: u32,

    pub max_per_page: u32,

    /// Cap on cached search entries; the evictor trims the oldest surplus.
    pub max_cache_entries: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 80,
            max_cache_entries: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub free_per_hour: u32,

    pub premium_per_hour: u32,

    pub pro_per_hour: u32,

    /// Static user → tier assignments ("premium" / "pro"); everyone else
    /// is on the free tier.
    #[serde(default)]
    pub tiers: HashMap<String, String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            free_per_hour: 100,
            premium_per_hour: 500,
            pro_per_hour: 1000,
            tiers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Optional six-field cron for the retention sweep; interval mode is
    /// used when unset.
    pub sweep_cron: Option<String>,

    pub sweep_interval_minutes: u32,

    pub evict_interval_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_cron: None,
            sweep_interval_minutes: 60,
            evict_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "pixelarr".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// Keys in the environment win over the config file, so deployments can
    /// keep secrets out of `config.toml`.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("UNSPLASH_ACCESS_KEY") {
            self.providers.unsplash_access_key = key;
        }
        if let Ok(key) = std::env::var("PEXELS_API_KEY") {
            self.providers.pexels_api_key = key;
        }
        if let Ok(key) = std::env::var("PIXABAY_API_KEY") {
            self.providers.pixabay_api_key = key;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pixelarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".pixelarr").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.default_per_page == 0
            || self.search.default_per_page > self.search.max_per_page
        {
            anyhow::bail!(
                "default_per_page must be between 1 and {}",
                self.search.max_per_page
            );
        }

        if self.scheduler.enabled
            && self.scheduler.sweep_interval_minutes == 0
            && self.scheduler.sweep_cron.is_none()
        {
            anyhow::bail!("Sweep interval must be > 0 or a cron expression must be set");
        }

        if self.providers.unsplash_access_key.is_empty()
            && self.providers.pexels_api_key.is_empty()
            && self.providers.pixabay_api_key.is_empty()
        {
            warn!("No provider API keys configured; searches will return empty results");
        }

        Ok(())
    }
}
