//! Per-message ingestion pipeline
//!
//! Drives one inbound message through decode, record contract validation,
//! idempotent persistence, event construction, event contract validation
//! and publish-with-retry. Every failure is isolated to the message being
//! processed; nothing here may take the service down or block other
//! in-flight messages.
//!
//! The ordering encodes a deliberate asymmetry: the record is stored before
//! the event is validated or published, so a late failure leaves a durable
//! record and a lost event, never the reverse.

use crate::db::{PersistenceError, RecordStore};
use crate::events::{EventSink, PublishOutcome, RetryPolicy};
use crate::protocol::{patient_id_segment, VitalsRecord, VitalsRecordedEvent};
use crate::validation::{SchemaValidator, ValidationError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-message failure kinds, in pipeline order
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Record rejected by contract: {0}")]
    RecordRejected(String),
    #[error("Event rejected by contract after persistence: {0}")]
    EventRejected(String),
    #[error(transparent)]
    Validator(ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// What happened to a fully processed message
#[derive(Debug)]
pub struct ProcessOutcome {
    pub record_id: Uuid,
    pub patient_id: Uuid,
    pub publish: PublishOutcome,
}

/// The ingestion pipeline over explicit collaborator handles
pub struct IngestPipeline<S, P> {
    validator: Arc<SchemaValidator>,
    store: S,
    sink: P,
    retry: RetryPolicy,
}

impl<S, P> IngestPipeline<S, P>
where
    S: RecordStore,
    P: EventSink,
{
    pub fn new(validator: Arc<SchemaValidator>, store: S, sink: P, retry: RetryPolicy) -> Self {
        Self {
            validator,
            store,
            sink,
            retry,
        }
    }

    /// Process one message and log the outcome; never propagates
    pub async fn run(&self, topic: &str, payload: &[u8]) {
        let started = Instant::now();
        match self.process_message(topic, payload).await {
            Ok(outcome) => {
                info!(
                    topic,
                    patient_id = %outcome.patient_id,
                    vitals_id = %outcome.record_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    delivered = matches!(outcome.publish, PublishOutcome::Delivered { .. }),
                    "Vitals processed"
                );
            }
            Err(PipelineError::Decode(e)) => {
                error!(topic, error = %e, "Invalid JSON payload");
            }
            Err(PipelineError::RecordRejected(message)) => {
                warn!(topic, errors = %message, "Vitals validation failed");
            }
            Err(PipelineError::EventRejected(message)) => {
                error!(
                    topic,
                    errors = %message,
                    "Event validation failed, not publishing; record remains stored"
                );
            }
            Err(e) => {
                error!(topic, error = %e, "Failed to process message");
            }
        }
    }

    /// The pipeline proper; returns the outcome for callers that assert on it
    pub async fn process_message(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<ProcessOutcome, PipelineError> {
        // Stage one: bytes to an untyped tree. Failures here are transport
        // garbage, not contract violations.
        let value: Value = serde_json::from_slice(payload).map_err(PipelineError::Decode)?;

        self.validator.validate_record(&value).map_err(|e| match e {
            ValidationError::Rejected(message) => PipelineError::RecordRejected(message),
            other => PipelineError::Validator(other),
        })?;

        // Stage two: the validated tree into the typed record.
        let record: VitalsRecord = serde_json::from_value(value)
            .map_err(|e| PipelineError::RecordRejected(e.to_string()))?;

        // The identity token in the topic should agree with the payload.
        // Mismatch is logged, not rejected.
        match patient_id_segment(topic) {
            Some(token) if token != record.patient_id.to_string() => {
                warn!(
                    topic,
                    topic_patient_id = token,
                    payload_patient_id = %record.patient_id,
                    "Patient id mismatch between topic and payload"
                );
            }
            Some(_) => {}
            None => {
                debug!(topic, "Topic does not carry a patient id segment");
            }
        }

        self.store.insert(&record).await?;

        let event = VitalsRecordedEvent::for_record(&record);
        let event_value = serde_json::to_value(&event)
            .map_err(|e| PipelineError::EventRejected(e.to_string()))?;
        self.validator.validate_event(&event_value).map_err(|e| match e {
            ValidationError::Rejected(message) => PipelineError::EventRejected(message),
            other => PipelineError::Validator(other),
        })?;

        let publish = self.retry.publish_with_retry(&self.sink, &event).await;

        Ok(ProcessOutcome {
            record_id: record.id,
            patient_id: record.patient_id,
            publish,
        })
    }
}
