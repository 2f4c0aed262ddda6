use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::Role;
use super::patient::PatientId;

/// Structured intake data collected during profile completion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntakeForm {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub dob: String,
    pub mob_no: String,
    pub occupation: String,
    pub height: String,
    pub weight: String,
    pub state: String,
    pub city: String,
    pub pincode: String,
    pub landmark: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_name: Option<String>,
}

impl IntakeForm {
    /// "First Last", trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Minimal profile written for patients; the medical data lives in the
/// patient record it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStub {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub patient_data_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: String,
    /// Intake form as submitted, stored under `profile`.
    #[serde(default, rename = "profile", skip_serializing_if = "Option::is_none")]
    pub intake: Option<IntakeForm>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assigned_patients: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathLabProfile {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "profile", skip_serializing_if = "Option::is_none")]
    pub intake: Option<IntakeForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_name: Option<String>,
}

/// Role record stored at `users/{uid}`, tagged by its `role` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Profile {
    #[serde(rename = "patient")]
    Patient(PatientStub),
    #[serde(rename = "doctor")]
    Doctor(DoctorProfile),
    #[serde(rename = "pathlab")]
    PathLab(PathLabProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Self::Patient(_) => Role::Patient,
            Self::Doctor(_) => Role::Doctor,
            Self::PathLab(_) => Role::PathLab,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            Self::Patient(p) => &p.uid,
            Self::Doctor(d) => &d.uid,
            Self::PathLab(l) => &l.uid,
        }
    }

    /// Patient record owned by this profile (patients only).
    pub fn patient_data_id(&self) -> Option<&PatientId> {
        match self {
            Self::Patient(p) => Some(&p.patient_data_id),
            Self::Doctor(_) | Self::PathLab(_) => None,
        }
    }
}

/// Outcome of interpreting a raw `users/{uid}` value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRecord {
    Known(Profile),
    /// Present but not usable: unknown role or malformed body.
    Unrecognized { role: Option<String> },
}

/// Interpret a stored profile value without trusting its shape.
pub fn classify_profile(value: Value) -> ProfileRecord {
    let role = value
        .get("role")
        .and_then(Value::as_str)
        .map(str::to_string);
    match serde_json::from_value::<Profile>(value) {
        Ok(profile) => ProfileRecord::Known(profile),
        Err(e) => {
            tracing::debug!(role = ?role, error = %e, "Stored profile not recognized");
            ProfileRecord::Unrecognized { role }
        }
    }
}
