//! Configuration for Wavecast

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Channel gateway configuration
    pub gateway: GatewayConfig,

    /// Dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Channel gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API base URL
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Sender phone number id at the gateway
    pub phone_number_id: String,

    /// Business account id, used for template lookups
    pub business_account_id: String,

    /// Bearer token for the gateway API
    pub access_token: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_ms: u64,

    /// Token expected on webhook subscription verification
    pub webhook_verify_token: Option<String>,

    /// App secret for webhook payload signature verification
    pub app_secret: Option<String>,
}

fn default_gateway_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_gateway_timeout() -> u64 {
    10000
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Global send rate across all executing campaigns (messages/second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,

    /// Maximum concurrent send workers
    #[serde(default = "default_concurrency")]
    pub send_concurrency: usize,

    /// Maximum send attempts per recipient (including the first)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay in seconds, doubled per attempt
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: default_rate_limit(),
            send_concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_base_secs: default_retry_base(),
        }
    }
}

fn default_rate_limit() -> u32 {
    80
}

fn default_concurrency() -> usize {
    16
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base() -> u64 {
    1
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long a dispatched campaign may wait for delivery events before
    /// being force-closed (seconds)
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            settle_timeout_secs: default_settle_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_settle_timeout() -> u64 {
    3600
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter, `EnvFilter` syntax
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info,wavecast=debug".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./wavecast.toml"),
            std::path::PathBuf::from("/etc/wavecast/wavecast.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_sections() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.rate_limit_per_second, 80);
        assert_eq!(dispatch.max_attempts, 5);

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.poll_interval_secs, 30);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9090

[database]
url = "postgres://localhost/wavecast"

[gateway]
phone_number_id = "123456"
business_account_id = "654321"
access_token = "secret"

[dispatch]
rate_limit_per_second = 40
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "postgres://localhost/wavecast");
        assert_eq!(config.gateway.phone_number_id, "123456");
        assert_eq!(config.dispatch.rate_limit_per_second, 40);
        // Unspecified fields fall back to defaults
        assert_eq!(config.dispatch.send_concurrency, 16);
        assert_eq!(config.scheduler.settle_timeout_secs, 3600);
    }
}
