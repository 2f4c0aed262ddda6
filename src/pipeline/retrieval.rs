//! Stored report → downloadable artifact.

use serde::Serialize;

use super::encode::decode_payload;
use super::format::download_filename;
use super::PDF_MIME;
use crate::error::PortalError;
use crate::models::Report;

/// Exact bytes and suggested filename for a stored report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    pub filename: String,
    pub mime_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Decode a report's payload. Saving the file is up to the host.
pub fn materialize(report: &Report) -> Result<ReportArtifact, PortalError> {
    let bytes = decode_payload(&report.encoded_payload).map_err(|e| {
        tracing::warn!(title = %report.title, error = %e, "Stored report payload is corrupt");
        PortalError::CorruptPayload(format!("Failed to download PDF: {e}"))
    })?;

    Ok(ReportArtifact {
        filename: download_filename(&report.title),
        mime_type: PDF_MIME,
        bytes,
    })
}
