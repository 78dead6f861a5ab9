//! Plain-text extraction for knowledge documents.
//!
//! The knowledge base is built from a fixed list of local files; this module
//! turns one file into UTF-8 text. PDFs go through `pdf-extract`, markdown
//! and plain text are read as-is.

use std::path::Path;

/// Extraction error; the build pipeline skips the offending file.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(ext) => {
                write!(f, "unsupported document format: .{}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Reads a knowledge document and returns its plain text.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        "md" | "txt" => std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string())),
        _ => Err(ExtractError::UnsupportedFormat(ext)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_file(Path::new("belge.docx")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_file_returns_io_error() {
        let err = extract_file(Path::new("/nonexistent/notlar.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bozuk.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = extract_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn text_file_read_verbatim() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notlar.txt");
        std::fs::write(&path, "Nefes egzersizi.\n").unwrap();
        assert_eq!(extract_file(&path).unwrap(), "Nefes egzersizi.\n");
    }
}
