//! Confirmation gate: decides when a detection is good enough to ask a human.

use crate::detect::Detection;
use crate::form::ConfirmationRecord;

#[derive(Clone, Copy, Debug)]
pub struct ConfirmationGate {
    threshold: f64,
}

impl ConfirmationGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the pre-filled record when both required fields are non-empty
    /// and confidence strictly exceeds the threshold.
    pub fn evaluate(&self, detection: &Detection) -> Option<ConfirmationRecord> {
        if detection.confidence <= self.threshold {
            return None;
        }
        let fields = detection.fields.as_ref().filter(|f| f.is_complete())?;
        Some(ConfirmationRecord::prefilled(
            fields.nim().unwrap_or_default(),
            fields.name().unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::IdentityFields;

    fn detection(nim: Option<&str>, name: Option<&str>, confidence: f64) -> Detection {
        Detection {
            bbox: None,
            fields: Some(IdentityFields {
                nim: nim.map(str::to_string),
                name: name.map(str::to_string),
            }),
            confidence,
        }
    }

    #[test]
    fn fires_above_threshold_with_both_fields() {
        let gate = ConfirmationGate::new(85.0);
        let record = gate
            .evaluate(&detection(Some("2201"), Some("Alice"), 90.0))
            .expect("gate fires");
        assert_eq!(record.nim, "2201");
        assert_eq!(record.name, "Alice");
        assert!(record.lab.is_empty());
        assert!(record.computer_no.is_empty());
    }

    #[test]
    fn never_fires_at_or_below_threshold() {
        let gate = ConfirmationGate::new(85.0);
        for confidence in [0.0, 70.0, 84.99, 85.0] {
            assert!(gate
                .evaluate(&detection(Some("2201"), Some("Alice"), confidence))
                .is_none());
        }
    }

    #[test]
    fn requires_both_fields() {
        let gate = ConfirmationGate::new(85.0);
        assert!(gate.evaluate(&detection(None, Some("Alice"), 99.0)).is_none());
        assert!(gate.evaluate(&detection(Some("2201"), Some(""), 99.0)).is_none());

        let no_fields = Detection {
            confidence: 99.0,
            ..Detection::default()
        };
        assert!(gate.evaluate(&no_fields).is_none());
    }
}
