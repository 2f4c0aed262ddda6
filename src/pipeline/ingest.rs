use std::sync::Arc;

use serde_json::Value;

use super::compress::compress_pdf_blocking;
use super::encode::{approx_decoded_size, encode_payload};
use super::format::{essence, is_pdf, sanitize_filename};
use super::PDF_MIME;
use crate::authorization::check_action;
use crate::error::PortalError;
use crate::models::{today, Action, PatientId, Report, Role};
use crate::store::{patient_path, patient_reports_path, ProfileStore, StoreError};

/// A file as selected by the uploader.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    /// Type declared by the client.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: PDF_MIME.to_string(),
            bytes,
        }
    }
}

pub struct ReportIngestionPipeline {
    store: Arc<dyn ProfileStore>,
    max_report_bytes: u64,
}

impl ReportIngestionPipeline {
    pub fn new(store: Arc<dyn ProfileStore>, max_report_bytes: u64) -> Self {
        Self {
            store,
            max_report_bytes,
        }
    }

    pub fn max_report_bytes(&self) -> u64 {
        self.max_report_bytes
    }

    /// Validate, compress, encode and append a report to a patient record.
    ///
    /// Nothing is written unless every check passes. The append is a plain
    /// read-modify-write of `patients/{id}/reports`: two concurrent uploads
    /// to the same patient can lose one of the appends.
    pub async fn ingest(
        &self,
        patient_id: &PatientId,
        file: Option<UploadedFile>,
        title: &str,
        summary: &str,
        caller_role: Role,
    ) -> Result<Report, PortalError> {
        // Step 1: Role gate (no I/O before this)
        check_action(caller_role, Action::UploadReport)
            .require(caller_role, Action::UploadReport)?;

        // Step 2: Input validation
        let file = file.ok_or_else(|| PortalError::InvalidInput("Please select a file".into()))?;
        if title.trim().is_empty() {
            return Err(PortalError::InvalidInput("Report title is required".into()));
        }
        let declared = essence(&file.mime_type);
        if declared != PDF_MIME {
            return Err(PortalError::InvalidInput(format!(
                "Only PDF files are accepted (got '{declared}')"
            )));
        }
        if !is_pdf(&file.bytes) {
            return Err(PortalError::InvalidInput(
                "File content is not a PDF document".into(),
            ));
        }

        let filename = sanitize_filename(&file.name);
        tracing::info!(
            patient_id = %patient_id,
            file = %filename,
            role = %caller_role,
            upload_bytes = file.bytes.len(),
            "Starting report ingestion"
        );

        // Step 3: Re-serialize
        let compressed = compress_pdf_blocking(file.bytes).await?;

        // Step 4: Encode and size
        let encoded_payload = encode_payload(&compressed);
        let size_bytes = approx_decoded_size(&encoded_payload);

        // Step 5: Size policy
        if size_bytes > self.max_report_bytes {
            tracing::info!(
                patient_id = %patient_id,
                size_bytes,
                limit = self.max_report_bytes,
                "Report rejected, too large after compression"
            );
            return Err(PortalError::PayloadTooLarge {
                size_bytes,
                limit: self.max_report_bytes,
            });
        }

        // Step 6: Append (read, append, write back)
        let record = self
            .store
            .get(&patient_path(patient_id))
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("patient {patient_id}")))?;
        let mut reports = existing_reports(&record, patient_id)?;

        let report = Report {
            title: title.to_string(),
            summary: summary.to_string(),
            date: today(),
            encoded_payload,
            size_bytes,
        };
        reports.push(serde_json::to_value(&report).map_err(StoreError::from)?);
        let report_count = reports.len();
        self.store
            .set(&patient_reports_path(patient_id), Value::Array(reports))
            .await?;

        tracing::info!(
            patient_id = %patient_id,
            size_bytes,
            report_count,
            "Report appended"
        );
        Ok(report)
    }
}

/// Stored report list exactly as found. Entries are carried over untyped,
/// so an append never drops or rewrites an earlier report.
fn existing_reports(record: &Value, patient_id: &PatientId) -> Result<Vec<Value>, PortalError> {
    match record.get("reports") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => {
            tracing::warn!(patient_id = %patient_id, "Stored reports field is not a list");
            Err(PortalError::CorruptPayload(format!(
                "reports of patient {patient_id} are not a list"
            )))
        }
    }
}
