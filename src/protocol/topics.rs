//! Topic conventions for inbound vitals messages
//!
//! Inbound telemetry arrives on `home/{patient_id}/vitals`; the subscription
//! uses the single-level wildcard form `home/+/vitals`.

/// Extract the patient id segment from a concrete vitals topic
///
/// Returns `None` when the topic does not have the expected three-segment
/// shape. The caller compares the segment against the payload's declared
/// patient id; a mismatch is logged but does not reject the message.
pub fn patient_id_segment(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("home"), Some(patient_id), Some("vitals"), None) if !patient_id.is_empty() => {
            Some(patient_id)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_patient_segment() {
        assert_eq!(patient_id_segment("home/p1/vitals"), Some("p1"));
        assert_eq!(
            patient_id_segment("home/123e4567-e89b-12d3-a456-426614174001/vitals"),
            Some("123e4567-e89b-12d3-a456-426614174001")
        );
    }

    #[test]
    fn test_rejects_unexpected_shapes() {
        assert_eq!(patient_id_segment("home/p1/vitals/extra"), None);
        assert_eq!(patient_id_segment("home//vitals"), None);
        assert_eq!(patient_id_segment("other/p1/vitals"), None);
        assert_eq!(patient_id_segment("home/p1"), None);
        assert_eq!(patient_id_segment(""), None);
    }
}
