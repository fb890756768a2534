//! Testing utilities and mock implementations
//!
//! In-memory stand-ins for the database, the event log and the health
//! probes so the pipeline can be exercised without Postgres, NATS or a
//! broker.

pub mod mocks;

pub use mocks::*;
