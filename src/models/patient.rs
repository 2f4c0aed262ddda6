use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::report::Report;
use crate::error::PortalError;

/// Longest key accepted as a patient identifier.
const MAX_PATIENT_ID_LEN: usize = 64;

/// Storage key of a patient record.
///
/// Allocated identifiers are 8 upper-case alphanumerics. Keys read back
/// from the store or typed in by staff may be other lengths, so parsing
/// only guarantees a non-empty ASCII-alphanumeric key that is safe to embed
/// in a store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientId(String);

impl PatientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct from characters the allocator produced itself.
    pub(crate) fn from_allocated(raw: String) -> Self {
        Self(raw)
    }
}

impl FromStr for PatientId {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PortalError::InvalidInput("patient id is empty".into()));
        }
        if trimmed.len() > MAX_PATIENT_ID_LEN {
            return Err(PortalError::InvalidInput(format!(
                "patient id longer than {MAX_PATIENT_ID_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PortalError::InvalidInput(format!(
                "patient id '{trimmed}' contains non-alphanumeric characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for PatientId {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PatientId> for String {
    fn from(id: PatientId) -> Self {
        id.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Medical-data document stored at `patients/{id}`.
///
/// The id is the storage key and is not repeated in the body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_measure",
        skip_serializing_if = "Option::is_none"
    )]
    pub height_cm: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_measure",
        skip_serializing_if = "Option::is_none"
    )]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub previous_diseases: Vec<String>,
    /// Chronological upload order, append-only. Entries that do not read as
    /// a [`Report`] are skipped here; appends never rewrite them.
    #[serde(default, deserialize_with = "readable_reports")]
    pub reports: Vec<Report>,
}

/// A patient record together with its key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientEntry {
    pub id: PatientId,
    #[serde(flatten)]
    pub record: PatientRecord,
}

/// Parse a free-text measurement from an intake form ("172", " 64.5 ").
pub fn parse_measure(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Onboarding forms historically stored height/weight as strings.
fn lenient_measure<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => parse_measure(&s),
        None => None,
    })
}

fn readable_reports<'de, D>(deserializer: D) -> Result<Vec<Report>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(kind = %json_kind(&other), "Ignoring reports field that is not a list");
            return Ok(Vec::new());
        }
    };
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Report>(item) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping unreadable stored report");
                None
            }
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patient_id_accepts_allocated_shape() {
        let id: PatientId = "14FAD97B".parse().unwrap();
        assert_eq!(id.as_str(), "14FAD97B");
    }

    #[test]
    fn patient_id_rejects_path_characters() {
        assert!("../users".parse::<PatientId>().is_err());
        assert!("AB/CD".parse::<PatientId>().is_err());
        assert!("".parse::<PatientId>().is_err());
        assert!("   ".parse::<PatientId>().is_err());
    }

    #[test]
    fn patient_id_trims_whitespace() {
        let id: PatientId = " 14FAD97B\n".parse().unwrap();
        assert_eq!(id.to_string(), "14FAD97B");
    }

    #[test]
    fn record_reads_string_measurements() {
        let record: PatientRecord = serde_json::from_value(json!({
            "name": "Marie Dubois",
            "dob": "1990-04-02",
            "gender": "female",
            "height_cm": "168",
            "weight_kg": 61.5,
            "previous_diseases": [],
            "reports": []
        }))
        .unwrap();
        assert_eq!(record.height_cm, Some(168.0));
        assert_eq!(record.weight_kg, Some(61.5));
    }

    #[test]
    fn record_tolerates_missing_lists() {
        // Empty arrays are dropped by the hosted store.
        let record: PatientRecord = serde_json::from_value(json!({ "name": "A" })).unwrap();
        assert!(record.reports.is_empty());
        assert!(record.previous_diseases.is_empty());
        assert_eq!(record.height_cm, None);
    }

    #[test]
    fn unreadable_reports_are_skipped() {
        let record: PatientRecord = serde_json::from_value(json!({
            "name": "Asha",
            "reports": [
                { "date": "2024-02-01", "title": "Old scan", "summary": "", "filePath": "scans/a.pdf" },
                { "title": "CBC", "date": "2026-01-05", "pdfData": "JVBERi0=", "sizeBytes": 6.0 }
            ]
        }))
        .unwrap();
        assert_eq!(record.reports.len(), 1);
        assert_eq!(record.reports[0].title, "CBC");
        assert_eq!(record.reports[0].size_bytes, 6);
    }

    #[test]
    fn non_list_reports_read_as_empty() {
        let record: PatientRecord =
            serde_json::from_value(json!({ "name": "A", "reports": "none" })).unwrap();
        assert!(record.reports.is_empty());
    }

    #[test]
    fn unparsable_measurement_is_none() {
        let record: PatientRecord =
            serde_json::from_value(json!({ "name": "A", "height_cm": "tall" })).unwrap();
        assert_eq!(record.height_cm, None);
    }

    #[test]
    fn entry_serializes_flat() {
        let entry = PatientEntry {
            id: "14FAD97B".parse().unwrap(),
            record: PatientRecord {
                name: "A".into(),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], "14FAD97B");
        assert_eq!(value["name"], "A");
    }
}
