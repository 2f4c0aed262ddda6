//! PDF re-serialization before storage.
//!
//! The document is parsed with lopdf, streams are flate-compressed where that
//! helps, unreferenced objects are pruned, and the file is written with a
//! classic cross-reference table: no xref streams, no object streams. Output
//! is usually a little smaller than the upload but not byte-identical to it.

use lopdf::xref::XrefType;
use lopdf::Document;

use super::PipelineError;

/// Trailer keys that only make sense on a cross-reference stream.
const XREF_STREAM_KEYS: [&str; 8] = [
    "Type", "W", "Index", "Filter", "DecodeParms", "Length", "Prev", "XRefStm",
];

/// Parse and re-save a PDF. CPU-bound; see [`compress_pdf_blocking`].
pub fn compress_pdf(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut doc =
        Document::load_mem(bytes).map_err(|e| PipelineError::MalformedPdf(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(PipelineError::EncryptedPdf);
    }

    doc.compress();
    let pruned = doc.prune_objects();

    doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
    for key in XREF_STREAM_KEYS {
        doc.trailer.remove(key.as_bytes());
    }

    let mut out = Vec::with_capacity(bytes.len());
    doc.save_to(&mut out)
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;

    tracing::debug!(
        input_bytes = bytes.len(),
        output_bytes = out.len(),
        pruned_objects = pruned.len(),
        "PDF re-serialized"
    );
    Ok(out)
}

/// [`compress_pdf`] on the blocking pool.
pub async fn compress_pdf_blocking(bytes: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
    tokio::task::spawn_blocking(move || compress_pdf(&bytes))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
}

#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::{dictionary, Document, Object, Stream};
    use rand::{RngCore, SeedableRng};

    /// One-page PDF carrying `payload_len` random bytes as an image XObject.
    ///
    /// The image stream is marked DCT-encoded so it is never recompressed,
    /// which keeps the stored size close to `payload_len`.
    pub fn make_pdf(payload_len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; payload_len];
        rand::rngs::StdRng::seed_from_u64(payload_len as u64).fill_bytes(&mut payload);

        let mut doc = Document::with_version("1.4");

        let mut img_stream = Stream::new(
            dictionary! {
                "Type" => Object::Name(b"XObject".to_vec()),
                "Subtype" => Object::Name(b"Image".to_vec()),
                "Width" => Object::Integer(1),
                "Height" => Object::Integer(1),
                "ColorSpace" => Object::Name(b"DeviceRGB".to_vec()),
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => Object::Name(b"DCTDecode".to_vec()),
                "Length" => Object::Integer(payload.len() as i64),
            },
            payload,
        );
        img_stream.allows_compression = false;
        let img_id = doc.add_object(Object::Stream(img_stream));

        let content = b"BT /F1 18 Tf 72 720 Td (Haemoglobin 13.5 g/dL) Tj ET q 100 0 0 100 72 500 cm /Img1 Do Q"
            .to_vec();
        let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content)));

        let font_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type1".to_vec()),
            "BaseFont" => Object::Name(b"Helvetica".to_vec()),
        });

        let page_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                "XObject" => dictionary! { "Img1" => Object::Reference(img_id) },
            },
        });

        let pages_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        });

        if let Ok(Object::Dictionary(ref mut dict)) = doc.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
