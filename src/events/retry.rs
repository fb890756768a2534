//! Bounded publish retry
//!
//! Wraps a single publish call with a fixed attempt bound and exponential
//! backoff. Exhaustion is not fatal: the record is already durably stored,
//! so the event is reported as permanently lost and the pipeline moves on.
//! Unbounded retry would let a log outage stall the pipeline and grow an
//! unbounded backlog.

use crate::events::publisher::EventSink;
use crate::protocol::VitalsRecordedEvent;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Attempt bound and backoff base for a publish sequence
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Terminal outcome of a publish sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Acknowledged by the log at the given sequence number
    Delivered { sequence: u64, attempts: u32 },
    /// All attempts exhausted; the event is gone, the record is not
    Lost { attempts: u32 },
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt_index` (0-based): 100ms, 200ms, ...
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt_index)
    }

    /// Drive `sink.publish` to success or exhaustion
    pub async fn publish_with_retry(
        &self,
        sink: &dyn EventSink,
        event: &VitalsRecordedEvent,
    ) -> PublishOutcome {
        for attempt in 0..self.max_attempts {
            match sink.publish(event).await {
                Ok(sequence) => {
                    if attempt > 0 {
                        info!(
                            event_id = %event.event_id,
                            attempt = attempt + 1,
                            "Event published after retry"
                        );
                    }
                    return PublishOutcome::Delivered {
                        sequence,
                        attempts: attempt + 1,
                    };
                }
                Err(e) => {
                    warn!(
                        event_id = %event.event_id,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Event publish failed"
                    );
                    if attempt + 1 < self.max_attempts {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        // The record is queryable in the database even though the event
        // never reached the log.
        error!(
            event_id = %event.event_id,
            patient_id = %event.payload.patient_id,
            attempts = self.max_attempts,
            "Failed to publish event after all retries; record persisted, event lost"
        );
        PublishOutcome::Lost {
            attempts: self.max_attempts,
        }
    }
}
