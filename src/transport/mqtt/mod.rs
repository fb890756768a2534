//! MQTT subscription transport
//!
//! `connection` holds the pure option-building and state types;
//! `subscriber` owns the session and the receive loop.

pub mod connection;
pub mod subscriber;

pub use connection::{ConnectionState, MqttError};
pub use subscriber::{MqttSubscriber, SubscriberMonitor};
