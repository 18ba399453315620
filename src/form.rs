//! Confirmation record and the form that edits it.

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Rental record confirmed by the operator. Serializes as the submission body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationRecord {
    pub nim: String,
    pub name: String,
    pub lab: String,
    pub computer_no: String,
}

impl ConfirmationRecord {
    /// Record pre-filled from recognized fields; lab and station start empty.
    pub fn prefilled(nim: &str, name: &str) -> Self {
        Self {
            nim: nim.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    Nim,
    Name,
    Lab,
    ComputerNo,
}

impl FormField {
    pub fn label(&self) -> &'static str {
        match self {
            FormField::Nim => "NIM",
            FormField::Name => "Name",
            FormField::Lab => "Lab",
            FormField::ComputerNo => "PC",
        }
    }
}

/// The open confirmation surface. At most one exists per session.
#[derive(Debug)]
pub struct ConfirmationForm {
    record: ConfirmationRecord,
    submitting: bool,
}

impl ConfirmationForm {
    pub fn open(record: ConfirmationRecord) -> Self {
        Self {
            record,
            submitting: false,
        }
    }

    pub fn record(&self) -> &ConfirmationRecord {
        &self.record
    }

    pub fn set(&mut self, field: FormField, value: &str) {
        let value = value.trim().to_string();
        match field {
            FormField::Nim => self.record.nim = value,
            FormField::Name => self.record.name = value,
            FormField::Lab => self.record.lab = value,
            FormField::ComputerNo => self.record.computer_no = value,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub(crate) fn set_submitting(&mut self, submitting: bool) {
        self.submitting = submitting;
    }

    /// Clear every field, as the form does after a successful submission.
    pub fn reset(&mut self) {
        self.record = ConfirmationRecord::default();
        self.submitting = false;
    }

    /// Required-field checks before the record leaves the kiosk.
    ///
    /// An empty `stations` list accepts any lab.
    pub fn validate(&self, stations: &[String]) -> Result<()> {
        let record = &self.record;
        for (field, value) in [
            (FormField::Nim, &record.nim),
            (FormField::Name, &record.name),
            (FormField::Lab, &record.lab),
            (FormField::ComputerNo, &record.computer_no),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{} is required", field.label()));
            }
        }
        if !stations.is_empty() && !stations.iter().any(|s| s == &record.lab) {
            return Err(anyhow!(
                "unknown lab '{}'; choose one of: {}",
                record.lab,
                stations.join(", ")
            ));
        }
        Ok(())
    }
}
