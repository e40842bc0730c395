
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{RagError, Result};

const DOCUMENT_EXTENSION: &str = "pdf";

/// Text of a single document page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub text: String,
    /// File name of the document the page belongs to
    pub source: String,
}

/// Check that `path` names an existing PDF file
#[inline]
pub fn validate_document_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(RagError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(RagError::InvalidInput(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    let is_pdf = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION));
    if !is_pdf {
        return Err(RagError::InvalidInput(format!(
            "File is not a PDF: {} (extension: {})",
            path.display(),
            path.extension()
                .map_or_else(|| "none".into(), OsStr::to_string_lossy)
        )));
    }

    let size_kb = path.metadata().map(|m| m.len() as f64 / 1024.0).unwrap_or(0.0);
    info!("Validated document {} ({:.2} KB)", path.display(), size_kb);

    Ok(path.to_path_buf())
}

/// Extract the text of every page of a PDF, in page order.
///
/// A page whose text cannot be extracted is kept with empty text so page
/// numbering stays aligned with the document.
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<Page>> {
    let source = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());

    let document = lopdf::Document::load(path).map_err(|e| {
        RagError::InvalidInput(format!("Failed to parse PDF {}: {}", path.display(), e))
    })?;

    if document.is_encrypted() {
        return Err(RagError::InvalidInput(format!(
            "PDF is encrypted: {}",
            path.display()
        )));
    }

    let mut pages = Vec::new();
    for number in document.get_pages().into_keys() {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not extract text from page {} of {}: {}", number, source, e);
                String::new()
            }
        };

        pages.push(Page {
            number,
            text,
            source: source.clone(),
        });
    }

    if let Some(first) = pages.first() {
        let preview: String = first.text.chars().take(200).collect();
        debug!("Page 1 preview: {}", preview.replace('\n', " "));
    }

    info!("Loaded {} page(s) from {}", pages.len(), source);
    Ok(pages)
}
