use std::path::Path;

use super::AnalysisError;

/// Text extraction collaborator. Blocking; callers run it off the async threads.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, AnalysisError>;
}

#[derive(Debug, Default, Clone)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, AnalysisError> {
        let _span = tracing::info_span!("extract.pdf", path = %path.display()).entered();

        // pdf-extract panics on some malformed font tables instead of returning Err.
        let raw = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
            .map_err(|_| {
                AnalysisError::input(format!(
                    "Failed to parse PDF {}: parser crashed",
                    path.display()
                ))
            })?
            .map_err(|e| {
                AnalysisError::input(format!("Failed to parse PDF {}: {e}", path.display()))
            })?;

        let text = normalize_extracted_text(&raw);
        if text.is_empty() {
            return Err(AnalysisError::input(format!(
                "No text extracted from PDF {}",
                path.display()
            )));
        }
        Ok(text)
    }
}

/// Drops NULs, collapses runs of blank lines into single newlines, trims the ends.
pub fn normalize_extracted_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
