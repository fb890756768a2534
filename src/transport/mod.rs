//! Inbound transport

pub mod mqtt;

pub use mqtt::{MqttError, MqttSubscriber};
