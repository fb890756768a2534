//! Observability
//!
//! Structured logging setup; the HTTP health surface lives in
//! [`crate::health`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
