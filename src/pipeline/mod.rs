//! Report ingestion and retrieval.
//!
//! Upload path: format check → PDF re-serialization → base64 → size policy
//! → append to the patient's report list. Retrieval reverses the encoding.

pub mod compress;
pub mod encode;
pub mod format;
pub mod ingest;
pub mod retrieval;

pub use compress::{compress_pdf, compress_pdf_blocking};
pub use encode::{approx_decoded_size, decode_payload, encode_payload};
pub use format::{download_filename, is_pdf, sanitize_filename};
pub use ingest::{ReportIngestionPipeline, UploadedFile};
pub use retrieval::{materialize, ReportArtifact};

use thiserror::Error;

use crate::error::PortalError;

pub const PDF_MIME: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("PDF is password-protected, please decrypt it first")]
    EncryptedPdf,

    #[error("Could not parse PDF: {0}")]
    MalformedPdf(String),

    #[error("Could not write PDF: {0}")]
    Io(std::io::Error),

    #[error("PDF processing task failed: {0}")]
    Task(String),
}

impl From<PipelineError> for PortalError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::EncryptedPdf | PipelineError::MalformedPdf(_) => {
                PortalError::InvalidInput(e.to_string())
            }
            PipelineError::Io(_) | PipelineError::Task(_) => {
                PortalError::CorruptPayload(e.to_string())
            }
        }
    }
}
