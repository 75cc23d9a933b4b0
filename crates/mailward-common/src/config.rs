//! Configuration for Mailward

use crate::types::FailurePolicy;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// SMTP limits handed to the session engine
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Reputation blacklist configuration
    #[serde(default)]
    pub rbl: RblConfig,

    /// Policy service configuration (recipient directory + greylist)
    pub policy: PolicyConfig,

    /// Database configuration (job queue)
    pub database: DatabaseConfig,

    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in the SMTP banner
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address for the SMTP listener
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:25".to_string()
}

/// SMTP limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Maximum message size in bytes (the entire mail: headers, body,
    /// attachments)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

fn default_max_message_size() -> usize {
    50 * 1024 * 1024 // 50 MiB
}

/// Reputation blacklist configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RblConfig {
    /// DNS zone queried with the reversed client octets
    #[serde(default = "default_rbl_zone")]
    pub zone: String,

    /// Behavior when the zone cannot be queried at all (as opposed to a
    /// clean NXDOMAIN answer)
    #[serde(default = "default_accept_open")]
    pub on_unavailable: FailurePolicy,
}

impl Default for RblConfig {
    fn default() -> Self {
        Self {
            zone: default_rbl_zone(),
            on_unavailable: default_accept_open(),
        }
    }
}

fn default_rbl_zone() -> String {
    "zen.spamhaus.org".to_string()
}

fn default_accept_open() -> FailurePolicy {
    FailurePolicy::AcceptOpen
}

/// Policy service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Recipient directory check endpoint
    pub recipient_url: String,

    /// Greylist check endpoint
    pub greylist_url: String,

    /// Shared secret sent in the `X-remoteSecret` header
    pub remote_secret: String,

    /// Request timeout in seconds for both services
    #[serde(default = "default_policy_timeout")]
    pub timeout_secs: u64,

    /// Behavior when the recipient service is unreachable
    #[serde(default = "default_accept_open")]
    pub recipient_on_unavailable: FailurePolicy,

    /// Behavior when the greylist service is unreachable
    #[serde(default = "default_accept_open")]
    pub greylist_on_unavailable: FailurePolicy,
}

fn default_policy_timeout() -> u64 {
    5
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name jobs are published under
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Delivery attempts granted to downstream processing
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_queue_name() -> String {
    "inbound".to_string()
}

fn default_max_attempts() -> i32 {
    5
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
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

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailward/config.toml"),
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
