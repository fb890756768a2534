//! Telemetry record and domain event types
//!
//! `VitalsRecord` is the unit of persistence, keyed and deduplicated by `id`.
//! `VitalsRecordedEvent` wraps a stored record for publication onto the event
//! log; it is never persisted locally and carries a freshly generated
//! `event_id` distinct from the record's id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name identifying the event kind on the log
pub const EVENT_NAME: &str = "vitals.recorded";
/// Semantic version of the event envelope
pub const EVENT_VERSION: &str = "1.0.0";

/// A single vitals telemetry record as received from a home device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsRecord {
    /// Globally unique record id; the deduplication key
    pub id: Uuid,
    /// The patient this record belongs to
    pub patient_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Systolic/diastolic pair measured together
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
}

/// Domain event published after a record is durably stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsRecordedEvent {
    pub event_name: String,
    pub event_version: String,
    /// Fresh per construction; not the wrapped record's id
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    pub patient_id: Uuid,
    pub vitals: VitalsRecord,
}

impl VitalsRecordedEvent {
    /// Build the event for a just-persisted record
    pub fn for_record(record: &VitalsRecord) -> Self {
        Self {
            event_name: EVENT_NAME.to_string(),
            event_version: EVENT_VERSION.to_string(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload: EventPayload {
                patient_id: record.patient_id,
                vitals: record.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> VitalsRecord {
        VitalsRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            heart_rate: Some(72),
            blood_pressure: Some(BloodPressure {
                systolic: 120,
                diastolic: 80,
            }),
            temperature: Some(37.0),
            oxygen_saturation: Some(98),
            device_id: Some("device-001".to_string()),
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: VitalsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_with_only_required_fields() {
        let value = json!({
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "patient_id": "123e4567-e89b-12d3-a456-426614174001",
            "recorded_at": "2024-01-01T12:00:00Z"
        });

        let record: VitalsRecord = serde_json::from_value(value).unwrap();
        assert!(record.heart_rate.is_none());
        assert!(record.blood_pressure.is_none());
        assert!(record.temperature.is_none());
        assert!(record.oxygen_saturation.is_none());
        assert!(record.device_id.is_none());
    }

    #[test]
    fn test_absent_optionals_not_serialized() {
        let mut record = sample_record();
        record.heart_rate = None;
        record.device_id = None;

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("heart_rate").is_none());
        assert!(value.get("device_id").is_none());
        assert!(value.get("temperature").is_some());
    }

    #[test]
    fn test_non_uuid_id_is_rejected() {
        let value = json!({
            "id": "not-a-uuid",
            "patient_id": "123e4567-e89b-12d3-a456-426614174001",
            "recorded_at": "2024-01-01T12:00:00Z"
        });

        assert!(serde_json::from_value::<VitalsRecord>(value).is_err());
    }

    #[test]
    fn test_event_construction() {
        let record = sample_record();
        let event = VitalsRecordedEvent::for_record(&record);

        assert_eq!(event.event_name, EVENT_NAME);
        assert_eq!(event.event_version, EVENT_VERSION);
        assert_ne!(event.event_id, record.id);
        assert_eq!(event.payload.patient_id, record.patient_id);
        assert_eq!(event.payload.vitals, record);
    }

    #[test]
    fn test_each_event_gets_a_fresh_id() {
        let record = sample_record();
        let first = VitalsRecordedEvent::for_record(&record);
        let second = VitalsRecordedEvent::for_record(&record);
        assert_ne!(first.event_id, second.event_id);
    }
}
