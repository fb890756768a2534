//! Top-level error type for startup and shutdown paths
//!
//! Per-message failures stay inside the pipeline and are logged there;
//! this type only aggregates the errors that can take the service down.

use thiserror::Error;

/// Fatal service errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Contract validation error: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    #[error("Database error: {0}")]
    Persistence(#[from] crate::db::PersistenceError),

    #[error("Event log error: {0}")]
    Publish(#[from] crate::events::PublishError),

    #[error("MQTT transport error: {0}")]
    Mqtt(#[from] crate::transport::MqttError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_error_display_includes_source_message() {
        let error = IngestError::from(ConfigError::EnvVarNotFound("DATABASE_URL".to_string()));
        assert!(error.to_string().contains("DATABASE_URL"));
    }
}
