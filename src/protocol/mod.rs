//! Wire types and topic conventions for the ingestion pipeline

pub mod messages;
pub mod topics;

pub use messages::{
    BloodPressure, EventPayload, VitalsRecord, VitalsRecordedEvent, EVENT_NAME, EVENT_VERSION,
};
pub use topics::patient_id_segment;
