//! Impure I/O side of the MQTT transport
//!
//! Owns the rumqttc session and the receive loop. The loop subscribes on
//! every ConnAck (so a broker-side session loss re-establishes the
//! subscription), spawns one pipeline task per inbound publish and retries
//! the connection at a fixed interval after poll errors.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError};
use crate::config::MqttSection;
use crate::db::RecordStore;
use crate::events::EventSink;
use crate::health::HealthProbe;
use crate::pipeline::IngestPipeline;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// MQTT subscriber feeding the ingestion pipeline
pub struct MqttSubscriber {
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    config: MqttSection,
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<watch::Sender<bool>>,
    loop_handle: Option<JoinHandle<()>>,
}

/// Cheap connection-state handle for the health surface
#[derive(Clone)]
pub struct SubscriberMonitor {
    connected: Arc<AtomicBool>,
}

impl MqttSubscriber {
    pub fn new(config: MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        Ok(Self {
            client,
            event_loop: Some(event_loop),
            config,
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            loop_handle: None,
        })
    }

    /// Start the receive loop and wait for the broker's ConnAck
    ///
    /// Returns an error if the first connection attempt fails or the
    /// ConnAck does not arrive within the configured timeout. After a
    /// successful start the loop reconnects on its own.
    pub async fn connect<S, P>(
        &mut self,
        pipeline: Arc<IngestPipeline<S, P>>,
    ) -> Result<(), MqttError>
    where
        S: RecordStore + 'static,
        P: EventSink + 'static,
    {
        let mut event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| MqttError::ConnectionFailed("Receive loop already started".into()))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let client = self.client.clone();
        let topic = self.config.topic.clone();
        let connected = self.connected.clone();
        let reconnect_interval = Duration::from_secs(self.config.reconnect_interval_secs);

        let handle = tokio::spawn(async move {
            info!(topic = %topic, "Starting MQTT receive loop");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping MQTT receive loop");
                            break;
                        }
                    }

                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected.store(true, Ordering::SeqCst);
                            let _ = state_tx.send(ConnectionState::Connected);
                            info!(topic = %topic, "Connected to MQTT broker, subscribing");
                            if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                                error!(topic = %topic, error = %e, "Failed to subscribe");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let publish_topic =
                                String::from_utf8_lossy(&publish.topic).into_owned();
                            let payload = publish.payload.clone();
                            let pipeline = pipeline.clone();
                            tokio::spawn(async move {
                                pipeline.run(&publish_topic, &payload).await;
                            });
                        }
                        Ok(Event::Incoming(Packet::Disconnect(_))) => {
                            connected.store(false, Ordering::SeqCst);
                            let _ = state_tx
                                .send(ConnectionState::Disconnected("Broker disconnect".into()));
                            warn!("Broker sent DISCONNECT");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            connected.store(false, Ordering::SeqCst);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            warn!(error = %e, delay_secs = reconnect_interval.as_secs(),
                                "MQTT connection error, retrying");
                            // poll() re-dials on the next iteration; shutdown
                            // must not wait out the backoff
                            tokio::select! {
                                _ = sleep(reconnect_interval) => {}
                                _ = shutdown_rx.changed() => {
                                    if *shutdown_rx.borrow() {
                                        info!("Shutdown signal received, stopping MQTT receive loop");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            info!("MQTT receive loop stopped");
        });
        self.loop_handle = Some(handle);

        Self::wait_for_connack(
            state_rx,
            Duration::from_secs(self.config.connect_timeout_secs),
        )
        .await
    }

    /// Block until the loop reports Connected, or fail on the first
    /// Disconnected or on timeout
    async fn wait_for_connack(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let wait = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed("State channel closed".into()));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match wait {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailed(
                "Timed out waiting for ConnAck".into(),
            )),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handle the health surface can hold without keeping the subscriber
    pub fn monitor(&self) -> SubscriberMonitor {
        SubscriberMonitor {
            connected: self.connected.clone(),
        }
    }

    /// Send DISCONNECT, stop the receive loop and wait for it to finish
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            // Already gone; nothing to tear down on the wire
            warn!(error = %e, "MQTT disconnect request failed");
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT connection closed");
    }
}

#[async_trait]
impl HealthProbe for SubscriberMonitor {
    /// No cheap broker roundtrip exists, so health is the connection flag
    async fn is_healthy(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RetryPolicy;
    use crate::testing::{FlakyEventSink, MemoryRecordStore};
    use crate::validation::SchemaValidator;

    fn test_config() -> MqttSection {
        MqttSection {
            url: "mqtt://localhost:1883".to_string(),
            topic: "home/+/vitals".to_string(),
            client_id: "vitals-ingest-test".to_string(),
            reconnect_interval_secs: 5,
            connect_timeout_secs: 10,
        }
    }

    #[test]
    fn test_new_subscriber_starts_disconnected() {
        let subscriber = MqttSubscriber::new(test_config()).unwrap();
        assert!(!subscriber.is_connected());
        assert!(!subscriber.monitor().is_connected());
    }

    #[tokio::test]
    async fn test_monitor_tracks_connection_flag() {
        let subscriber = MqttSubscriber::new(test_config()).unwrap();
        let monitor = subscriber.monitor();

        subscriber.connected.store(true, Ordering::SeqCst);
        assert!(monitor.is_connected());
        assert!(monitor.is_healthy().await);

        subscriber.connected.store(false, Ordering::SeqCst);
        assert!(!monitor.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_interrupts_reconnect_backoff() {
        // Port 1 refuses immediately, so the receive loop lands in its
        // reconnect backoff. With an hour-long interval, disconnect must
        // still return promptly.
        let mut config = test_config();
        config.url = "mqtt://127.0.0.1:1".to_string();
        config.reconnect_interval_secs = 3600;
        config.connect_timeout_secs = 2;

        let mut subscriber = MqttSubscriber::new(config).unwrap();
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::new(SchemaValidator::new()),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(FlakyEventSink::new()),
            RetryPolicy::default(),
        ));

        let result = subscriber.connect(pipeline).await;
        assert!(result.is_err());

        tokio::time::timeout(Duration::from_secs(5), subscriber.disconnect())
            .await
            .expect("disconnect must not wait out the reconnect backoff");
    }

    #[tokio::test]
    async fn test_wait_for_connack_times_out() {
        let (_tx, rx) = watch::channel(ConnectionState::Connecting);
        let result = MqttSubscriber::wait_for_connack(rx, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(MqttError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_wait_for_connack_fails_fast_on_disconnect() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        tx.send(ConnectionState::Disconnected("refused".into()))
            .unwrap();
        let result = MqttSubscriber::wait_for_connack(rx, Duration::from_secs(5)).await;
        match result {
            Err(MqttError::ConnectionFailed(reason)) => assert_eq!(reason, "refused"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
