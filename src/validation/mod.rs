//! Contract validation for inbound records and outbound events

pub mod schema;

pub use schema::{SchemaValidator, ValidationError};
