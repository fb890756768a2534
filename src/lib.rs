//! Vitals ingestion service
//!
//! Subscribes to patient vitals over MQTT, validates each payload against
//! versioned JSON Schema contracts, persists records idempotently to
//! PostgreSQL and appends `vitals.recorded` events to a durable NATS
//! JetStream log. A small HTTP surface reports health and readiness.
//!
//! # Pipeline
//!
//! For every message on `home/{patient_id}/vitals`:
//!
//! 1. Decode the payload as JSON
//! 2. Validate against the vitals record contract
//! 3. Insert into PostgreSQL (`ON CONFLICT DO NOTHING` on the record id)
//! 4. Construct a `vitals.recorded` event and validate it against the
//!    event contract
//! 5. Publish to JetStream with bounded retry; exhaustion loses the event
//!    but keeps the record
//!
//! Failures are isolated per message; a malformed payload never affects
//! its neighbours.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod health;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod validation;

pub use error::IngestError;
pub use pipeline::IngestPipeline;
