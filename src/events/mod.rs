//! Durable event log publishing

pub mod publisher;
pub mod retry;

pub use publisher::{EventSink, NatsPublisher, PublishError};
pub use retry::{PublishOutcome, RetryPolicy};
