use super::detector::{TableDetector, TableRegion};
use super::parse_row;
use crate::error::{AppError, AppResult};
use crate::models::Table;
use bytes::Bytes;
use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};

/// Pulls text out of the PDF with `pdf-extract`, falling back to `lopdf`
/// page by page when that fails.
pub fn extract_text(pdf_bytes: &[u8]) -> AppResult<String> {
    let primary = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(pdf_bytes)));

    match primary {
        Ok(Ok(text)) if !text.trim().is_empty() => return Ok(text),
        Ok(Ok(_)) => tracing::warn!("pdf-extract returned no text, trying lopdf"),
        Ok(Err(e)) => tracing::warn!("pdf-extract failed, trying lopdf: {}", e),
        Err(_) => tracing::warn!("pdf-extract panicked, trying lopdf"),
    }

    extract_text_with_lopdf(pdf_bytes)
}

fn extract_text_with_lopdf(pdf_bytes: &[u8]) -> AppResult<String> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| AppError::FileProcessingError(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    let mut all_text = String::new();
    let mut last_error: Option<String> = None;

    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                all_text.push_str(&text);
                all_text.push('\n');
            }
            Err(e) => {
                tracing::warn!("Skipping page {}: {}", page_num, e);
                last_error = Some(e.to_string());
            }
        }
    }

    if all_text.trim().is_empty() {
        let detail = last_error.unwrap_or_else(|| "document has no extractable text".to_string());
        return Err(AppError::ExtractionFailed(format!("No text found in PDF: {}", detail)));
    }

    Ok(all_text)
}

fn region_to_table(index: usize, region: TableRegion, detector: &TableDetector) -> Table {
    let mut rows = region.rows;
    let header = match rows.first() {
        Some(first) if detector.is_likely_header(first) => Some(rows.remove(0)),
        _ => None,
    };

    Table {
        name: format!("Table {}", index + 1),
        header,
        rows: rows.iter().map(|row| parse_row(row)).collect(),
    }
}

/// Turns already-extracted text into tables.
pub fn tables_from_text(text: &str, detector: &TableDetector) -> Vec<Table> {
    detector
        .detect_tables(text)
        .into_iter()
        .enumerate()
        .map(|(idx, region)| region_to_table(idx, region, detector))
        .collect()
}

/// In-process extraction: PDF text plus whitespace-column table detection.
#[derive(Debug, Clone, Default)]
pub struct LocalExtractor {
    detector: TableDetector,
}

impl LocalExtractor {
    pub async fn extract_tables(&self, pdf_bytes: Bytes) -> AppResult<Vec<Table>> {
        let detector = self.detector.clone();
        let tables = tokio::task::spawn_blocking(move || -> AppResult<Vec<Table>> {
            let text = extract_text(&pdf_bytes)?;
            tracing::debug!("Extracted {} characters of text", text.len());
            Ok(tables_from_text(&text, &detector))
        })
        .await??;

        if tables.is_empty() {
            return Err(AppError::ExtractionFailed("No tables found in PDF".to_string()));
        }
        Ok(tables)
    }
}
