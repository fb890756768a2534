//! Service configuration
//!
//! Configuration is loaded from a TOML file when one is provided (or found at
//! a default location), otherwise assembled from environment variables so the
//! service can run in container deployments without a config file. Every
//! field has a default except the database URL.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub nats: NatsSection,
    pub database: DatabaseSection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub contracts: ContractsSection,
}

/// MQTT transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with protocol and port
    #[serde(default = "default_mqtt_url")]
    pub url: String,
    /// Subscription topic pattern; the `+` segment carries the patient id
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    /// Client identity presented to the broker
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    /// Fixed delay between reconnection attempts in seconds
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    /// Timeout waiting for the initial ConnAck in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// NATS JetStream settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NatsSection {
    #[serde(default = "default_nats_url")]
    pub url: String,
    /// Durable stream name provisioned on connect
    #[serde(default = "default_nats_stream")]
    pub stream: String,
    /// Subject events are published under
    #[serde(default = "default_nats_subject")]
    pub subject: String,
    /// Timeout for the initial connection in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// PostgreSQL settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSection {
    /// Connection string; the only setting without a default
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_db_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// HTTP health surface and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    #[serde(default = "default_service_port")]
    pub port: u16,
    /// Grace period per shutdown stage in seconds
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Contract schema location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractsSection {
    /// Directory holding `domain/vitals.json` and `events/vitals-recorded.json`
    #[serde(default = "default_contracts_path")]
    pub path: String,
    #[serde(default = "default_contracts_version")]
    pub version: String,
}

fn default_mqtt_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_topic() -> String {
    "home/+/vitals".to_string()
}

fn default_mqtt_client_id() -> String {
    "ingestion-service".to_string()
}

fn default_reconnect_interval_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "vitals-events".to_string()
}

fn default_nats_subject() -> String {
    "vitals.recorded".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_db_connect_timeout_ms() -> u64 {
    5_000
}

fn default_service_port() -> u16 {
    8091
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_contracts_path() -> String {
    "./contracts/schemas".to_string()
}

fn default_contracts_version() -> String {
    "latest".to_string()
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            url: default_mqtt_url(),
            topic: default_mqtt_topic(),
            client_id: default_mqtt_client_id(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for NatsSection {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            stream: default_nats_stream(),
            subject: default_nats_subject(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            port: default_service_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for ContractsSection {
    fn default() -> Self {
        Self {
            path: default_contracts_path(),
            version: default_contracts_version(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Missing required environment variable: {0}")]
    EnvVarNotFound(String),
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from environment variables alone
    ///
    /// `DATABASE_URL` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::EnvVarNotFound("DATABASE_URL".to_string()))?;

        let mut config = Config {
            mqtt: MqttSection::default(),
            nats: NatsSection::default(),
            database: DatabaseSection {
                url: database_url,
                max_connections: default_max_connections(),
                idle_timeout_ms: default_idle_timeout_ms(),
                connect_timeout_ms: default_db_connect_timeout_ms(),
            },
            service: ServiceSection::default(),
            contracts: ContractsSection::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Deployment-environment overrides for the externally addressable knobs
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MQTT_URL") {
            self.mqtt.url = url;
        }
        if let Ok(topic) = std::env::var("MQTT_TOPIC") {
            self.mqtt.topic = topic;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Ok(url) = std::env::var("NATS_URL") {
            self.nats.url = url;
        }
        if let Ok(stream) = std::env::var("NATS_STREAM") {
            self.nats.stream = stream;
        }
        if let Ok(subject) = std::env::var("NATS_SUBJECT") {
            self.nats.subject = subject;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(port) = std::env::var("SERVICE_PORT") {
            if let Ok(port) = port.parse() {
                self.service.port = port;
            }
        }
        if let Ok(path) = std::env::var("CONTRACTS_PATH") {
            self.contracts.path = path;
        }
        if let Ok(version) = std::env::var("CONTRACTS_VERSION") {
            self.contracts.version = version;
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[database]
url = "postgres://localhost/vitals_test"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
