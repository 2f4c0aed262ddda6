use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One uploaded medical document inside a patient record.
///
/// Immutable once created. `size_bytes` is reconstructed from the encoded
/// payload length, not from a decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Upload date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Standard base64 of the compressed PDF.
    #[serde(rename = "pdfData")]
    pub encoded_payload: String,
    #[serde(rename = "sizeBytes", deserialize_with = "whole_bytes")]
    pub size_bytes: u64,
}

/// Byte counts written by the web client arrive as JSON floats (`6.0`).
fn whole_bytes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > u64::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "sizeBytes {raw} is not a whole byte count"
        )));
    }
    Ok(raw as u64)
}

/// Calendar date used to stamp new reports.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
