//! Pure connection state and option handling for the MQTT subscriber
//!
//! Everything here is testable without a broker: URL parsing, option
//! construction and the connection state machine the receive loop reports
//! through.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state reported by the receive loop
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state, waiting for ConnAck
    Connecting,
    /// ConnAck received, subscription active
    Connected,
    /// Lost with reason; the loop keeps retrying
    Disconnected(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Build rumqttc options from the config section
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let url =
        Url::parse(&config.url).map_err(|_| MqttError::InvalidBrokerUrl(config.url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if !url.username().is_empty() {
        let password = url.password().unwrap_or_default();
        mqtt_options.set_credentials(url.username(), password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}
