use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the VIN lookup service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Record store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// VIN decode provider (vPIC)
    #[serde(default = "default_decode_provider")]
    pub decode_provider: ProviderConfig,
    /// Photo provider (CarImagery)
    #[serde(default = "default_photo_provider")]
    pub photo_provider: ProviderConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Install the Prometheus exporter
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// Empty the record store before serving
    #[serde(default = "default_true")]
    pub reset_on_startup: bool,
}

/// Outbound provider configuration, shared by the decode and photo clients
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider root URL
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures (transport, 5xx, 429)
    #[serde(default)]
    pub max_retries: u32,
    /// First retry delay in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single retry delay in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "vin-lookup-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_database_url() -> String {
    "sqlite://vin_cache.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_decode_provider() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://vpic.nhtsa.dot.gov".to_string(),
        timeout_secs: 10,
        max_retries: 2,
        retry_base_delay_ms: default_retry_base_delay_ms(),
        retry_max_delay_ms: default_retry_max_delay_ms(),
    }
}

fn default_photo_provider() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://www.carimagery.com".to_string(),
        timeout_secs: 3,
        max_retries: 0,
        retry_base_delay_ms: default_retry_base_delay_ms(),
        retry_max_delay_ms: default_retry_max_delay_ms(),
    }
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::builder_with_defaults()?
            .add_source(config::File::with_name("config/vin-lookup").required(false))
            .add_source(config::File::with_name("/etc/vin-lookup/vin-lookup").required(false))
            // VIN_LOOKUP__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("VIN_LOOKUP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Builder seeded with per-key defaults, so a partial section override
    /// (e.g. `VIN_LOOKUP__DECODE_PROVIDER__TIMEOUT_SECS`) keeps the other keys
    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .set_default("service.metrics_port", default_metrics_port())?;

        for (section, provider) in [
            ("decode_provider", default_decode_provider()),
            ("photo_provider", default_photo_provider()),
        ] {
            builder = builder
                .set_default(format!("{section}.base_url"), provider.base_url)?
                .set_default(format!("{section}.timeout_secs"), provider.timeout_secs)?
                .set_default(format!("{section}.max_retries"), u64::from(provider.max_retries))?
                .set_default(
                    format!("{section}.retry_base_delay_ms"),
                    provider.retry_base_delay_ms,
                )?
                .set_default(
                    format!("{section}.retry_max_delay_ms"),
                    provider.retry_max_delay_ms,
                )?;
        }

        Ok(builder)
    }
}

impl DatabaseConfig {
    /// Whether the URL points at a private in-memory SQLite database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: true,
            reset_on_startup: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_database_url(), "sqlite://vin_cache.db");
        assert_eq!(default_decode_provider().max_retries, 2);
        assert_eq!(default_photo_provider().timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_deserialize_without_sections() {
        let config: Config = config::Config::builder()
            .set_default("api.port", 9000)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.service.name, "vin-lookup-service");
        assert!(config.database.reset_on_startup);
        assert_eq!(config.decode_provider.base_url, "https://vpic.nhtsa.dot.gov");
        assert_eq!(config.photo_provider.base_url, "https://www.carimagery.com");
    }

    #[test]
    fn test_partial_provider_override_keeps_defaults() {
        let config: Config = Config::builder_with_defaults()
            .unwrap()
            .set_override("decode_provider.timeout_secs", 5)
            .unwrap()
            .set_override("photo_provider.base_url", "http://localhost:9999")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.decode_provider.timeout(), Duration::from_secs(5));
        assert_eq!(config.decode_provider.base_url, "https://vpic.nhtsa.dot.gov");
        assert_eq!(config.decode_provider.max_retries, 2);
        assert_eq!(config.decode_provider.retry_max_delay_ms, 2000);

        assert_eq!(config.photo_provider.base_url, "http://localhost:9999");
        assert_eq!(config.photo_provider.timeout_secs, 3);
        assert_eq!(config.photo_provider.max_retries, 0);
    }

    #[test]
    fn test_in_memory_detection() {
        let mut database = DatabaseConfig::default();
        assert!(!database.is_in_memory());

        database.url = "sqlite::memory:".to_string();
        assert!(database.is_in_memory());
    }
}
