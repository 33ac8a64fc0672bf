use super::types::SourceTextExtractor;
use super::ExtractionError;

/// PDF text extractor using the pdf-extract crate.
/// Handles digital PDFs with embedded text layers; scanned PDFs yield `NoTextLayer`.
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Per-page text in page order. Line breaks are kept; runs of spaces
    /// and tabs within a line are collapsed.
    pub fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        Ok(page_texts.iter().map(|text| normalize_page(text)).collect())
    }
}

fn normalize_page(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

impl SourceTextExtractor for PdfTextExtractor {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
        let pages = self.extract_pages(pdf_bytes)?;
        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(ExtractionError::NoTextLayer);
        }

        tracing::debug!(pages = pages.len(), "PDF source text extracted");
        Ok(pages.join("\n"))
    }
}
