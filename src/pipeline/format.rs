use std::path::Path;

/// Offset within which a PDF header may start (readers tolerate leading junk).
const PDF_HEADER_WINDOW: usize = 1024;

/// `%PDF-` header within the first kilobyte.
pub fn is_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Declared MIME type, lower-cased and without parameters.
pub fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

/// Suggested download name: each run of whitespace becomes one `_`, path
/// separators are dropped, `.pdf` is appended.
pub fn download_filename(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    let mut in_space = false;
    for c in title.chars().filter(|c| !matches!(c, '/' | '\\' | '\0')) {
        if c.is_whitespace() {
            if !in_space {
                stem.push('_');
            }
            in_space = true;
        } else {
            stem.push(c);
            in_space = false;
        }
    }
    let stem: String = stem.chars().take(251).collect();
    if stem.is_empty() {
        return "report.pdf".to_string();
    }
    format!("{stem}.pdf")
}
