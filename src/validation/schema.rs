//! Two-stage contract validation
//!
//! Holds two precompiled JSON Schema checkers: the vitals-record contract
//! applied to decoded inbound payloads, and the vitals-recorded event
//! contract applied to constructed events just before publish. Both are
//! compiled during an explicit `initialize()` step from schema documents
//! under the configured contracts directory; calling either check before
//! initialization is an error.

use crate::config::ContractsSection;
use jsonschema::Validator;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Contract validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Schema validator not initialized")]
    NotInitialized,
    #[error("Failed to load schema from {path}: {message}")]
    SchemaLoad { path: PathBuf, message: String },
    #[error("Schema compilation failed for {path}: {message}")]
    SchemaCompile { path: PathBuf, message: String },
    #[error("Contract violation: {0}")]
    Rejected(String),
}

/// Precompiled checkers for the record and event contracts
pub struct SchemaValidator {
    record_validator: Option<Validator>,
    event_validator: Option<Validator>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            record_validator: None,
            event_validator: None,
        }
    }

    /// Load and compile both contracts from the configured directory
    pub fn initialize(&mut self, contracts: &ContractsSection) -> Result<(), ValidationError> {
        let base = Path::new(&contracts.path);

        let record_path = base.join("domain/vitals.json");
        self.record_validator = Some(Self::compile_schema(&record_path)?);

        let event_path = base.join("events/vitals-recorded.json");
        self.event_validator = Some(Self::compile_schema(&event_path)?);

        info!(
            contracts_path = %base.display(),
            contracts_version = %contracts.version,
            "Schema validator initialized"
        );
        Ok(())
    }

    fn compile_schema(path: &Path) -> Result<Validator, ValidationError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ValidationError::SchemaLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let schema: Value =
            serde_json::from_str(&content).map_err(|e| ValidationError::SchemaLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        jsonschema::validator_for(&schema).map_err(|e| ValidationError::SchemaCompile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Check a decoded inbound payload against the vitals-record contract
    pub fn validate_record(&self, data: &Value) -> Result<(), ValidationError> {
        let validator = self
            .record_validator
            .as_ref()
            .ok_or(ValidationError::NotInitialized)?;
        Self::run(validator, data)
    }

    /// Check a constructed event against the vitals-recorded event contract
    pub fn validate_event(&self, data: &Value) -> Result<(), ValidationError> {
        let validator = self
            .event_validator
            .as_ref()
            .ok_or(ValidationError::NotInitialized)?;
        Self::run(validator, data)
    }

    fn run(validator: &Validator, data: &Value) -> Result<(), ValidationError> {
        validator.validate(data).map_err(|errors| {
            let messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ValidationError::Rejected(messages.join("; "))
        })
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo_contracts() -> ContractsSection {
        ContractsSection {
            path: format!("{}/contracts/schemas", env!("CARGO_MANIFEST_DIR")),
            version: "latest".to_string(),
        }
    }

    fn initialized() -> SchemaValidator {
        let mut validator = SchemaValidator::new();
        validator.initialize(&repo_contracts()).unwrap();
        validator
    }

    fn valid_record_value() -> Value {
        json!({
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "patient_id": "123e4567-e89b-12d3-a456-426614174001",
            "recorded_at": "2024-01-01T12:00:00Z",
            "heart_rate": 72,
            "blood_pressure": { "systolic": 120, "diastolic": 80 },
            "temperature": 37.0,
            "oxygen_saturation": 98,
            "device_id": "device-001"
        })
    }

    #[test]
    fn test_not_initialized() {
        let validator = SchemaValidator::new();
        assert!(matches!(
            validator.validate_record(&valid_record_value()),
            Err(ValidationError::NotInitialized)
        ));
        assert!(matches!(
            validator.validate_event(&json!({})),
            Err(ValidationError::NotInitialized)
        ));
    }

    #[test]
    fn test_valid_record_passes() {
        let validator = initialized();
        assert!(validator.validate_record(&valid_record_value()).is_ok());
    }

    #[test]
    fn test_minimal_record_passes() {
        let validator = initialized();
        let record = json!({
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "patient_id": "123e4567-e89b-12d3-a456-426614174001",
            "recorded_at": "2024-01-01T12:00:00Z"
        });
        assert!(validator.validate_record(&record).is_ok());
    }

    #[test]
    fn test_record_missing_required_fields() {
        let validator = initialized();
        let result = validator.validate_record(&json!({ "id": "123" }));

        match result {
            Err(ValidationError::Rejected(message)) => {
                assert!(message.contains("patient_id"), "got: {message}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_record_with_wrong_field_type() {
        let validator = initialized();
        let mut record = valid_record_value();
        record["heart_rate"] = json!("fast");
        assert!(validator.validate_record(&record).is_err());
    }

    #[test]
    fn test_valid_event_passes() {
        let validator = initialized();
        let event = json!({
            "event_name": "vitals.recorded",
            "event_version": "1.0.0",
            "event_id": "123e4567-e89b-12d3-a456-426614174002",
            "timestamp": "2024-01-01T12:00:00Z",
            "payload": {
                "patient_id": "123e4567-e89b-12d3-a456-426614174001",
                "vitals": valid_record_value()
            }
        });
        assert!(validator.validate_event(&event).is_ok());
    }

    #[test]
    fn test_event_missing_payload_is_rejected() {
        let validator = initialized();
        let event = json!({
            "event_name": "vitals.recorded",
            "event_version": "1.0.0",
            "event_id": "123e4567-e89b-12d3-a456-426614174002",
            "timestamp": "2024-01-01T12:00:00Z"
        });
        assert!(validator.validate_event(&event).is_err());
    }

    #[test]
    fn test_missing_schema_directory() {
        let mut validator = SchemaValidator::new();
        let contracts = ContractsSection {
            path: "/nonexistent/contracts".to_string(),
            version: "latest".to_string(),
        };
        assert!(matches!(
            validator.initialize(&contracts),
            Err(ValidationError::SchemaLoad { .. })
        ));
    }

    #[test]
    fn test_malformed_schema_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("domain")).unwrap();
        std::fs::write(dir.path().join("domain/vitals.json"), "{ not json").unwrap();

        let mut validator = SchemaValidator::new();
        let contracts = ContractsSection {
            path: dir.path().to_string_lossy().to_string(),
            version: "latest".to_string(),
        };
        assert!(matches!(
            validator.initialize(&contracts),
            Err(ValidationError::SchemaLoad { .. })
        ));
    }
}
