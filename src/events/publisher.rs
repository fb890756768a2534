//! NATS JetStream publisher with idempotent stream provisioning
//!
//! On connect the publisher ensures the durable stream exists: file-backed
//! storage, limits-based retention with a 7 day age cap and a one million
//! message ceiling, bound to the publish subject and its dotted
//! sub-hierarchy. Re-running connect against a provisioned stream is a
//! no-op.

use crate::config::NatsSection;
use crate::health::HealthProbe;
use crate::protocol::VitalsRecordedEvent;
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, Context};
use async_nats::{connection::State, Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const STREAM_MAX_MESSAGES: i64 = 1_000_000;

/// Event log errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Event log connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Stream provisioning failed: {0}")]
    Provision(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Publish failed: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Seam for appending events to the durable log
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append a serialized event; returns the acknowledged sequence number
    async fn publish(&self, event: &VitalsRecordedEvent) -> Result<u64, PublishError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn publish(&self, event: &VitalsRecordedEvent) -> Result<u64, PublishError> {
        (**self).publish(event).await
    }
}

/// JetStream-backed event publisher
///
/// Cheap to clone; the underlying connection is shared between clones.
#[derive(Clone)]
pub struct NatsPublisher {
    client: Client,
    jetstream: Context,
    stream: String,
    subject: String,
}

impl NatsPublisher {
    /// Connect and provision the stream
    pub async fn connect(config: &NatsSection) -> Result<Self, PublishError> {
        let client = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| PublishError::Connection(Box::new(e)))?;
        let jetstream = jetstream::new(client.clone());

        info!(url = %config.url, "NATS connected");

        let publisher = Self {
            client,
            jetstream,
            stream: config.stream.clone(),
            subject: config.subject.clone(),
        };
        publisher.ensure_stream().await?;
        Ok(publisher)
    }

    /// Idempotent stream provisioning
    async fn ensure_stream(&self) -> Result<(), PublishError> {
        let stream_config = StreamConfig {
            name: self.stream.clone(),
            subjects: vec![format!("{}.*", self.subject), self.subject.clone()],
            storage: StorageType::File,
            retention: RetentionPolicy::Limits,
            max_age: STREAM_MAX_AGE,
            max_messages: STREAM_MAX_MESSAGES,
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| {
                error!(stream = %self.stream, error = %e, "Failed to provision JetStream stream");
                PublishError::Provision(Box::new(e))
            })?;

        info!(stream = %self.stream, "JetStream stream ready");
        Ok(())
    }

    /// Cheap local connection-state read
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    pub async fn close(&self) {
        if let Err(e) = self.client.drain().await {
            error!(error = %e, "Error draining NATS connection");
        }
        info!("NATS connection closed");
    }
}

#[async_trait]
impl EventSink for NatsPublisher {
    async fn publish(&self, event: &VitalsRecordedEvent) -> Result<u64, PublishError> {
        let payload = serde_json::to_vec(event)?;

        let ack = self
            .jetstream
            .publish(self.subject.clone(), Bytes::from(payload))
            .await
            .map_err(|e| PublishError::Publish(Box::new(e)))?
            .await
            .map_err(|e| PublishError::Publish(Box::new(e)))?;

        debug!(
            subject = %self.subject,
            event_id = %event.event_id,
            stream = %ack.stream,
            seq = ack.sequence,
            "Event published"
        );
        Ok(ack.sequence)
    }
}

#[async_trait]
impl HealthProbe for NatsPublisher {
    async fn is_healthy(&self) -> bool {
        // The client exposes no cheap functional round trip; connection
        // state is the health signal for the event log.
        self.is_connected()
    }

    fn is_connected(&self) -> bool {
        NatsPublisher::is_connected(self)
    }
}
