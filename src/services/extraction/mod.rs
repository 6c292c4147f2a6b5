pub mod detector;
pub mod document_ai;
pub mod local;
pub mod pdf_services;
pub mod poll;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Cell, Table};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub use document_ai::DocumentAiClient;
pub use local::LocalExtractor;
pub use pdf_services::PdfServicesClient;

/// Which backend pulls the tables out of a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    #[default]
    Local,
    DocumentAi,
    PdfServices,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Local => "local",
            ExtractionMode::DocumentAi => "document-ai",
            ExtractionMode::PdfServices => "pdf-services",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "" | "local" => Ok(ExtractionMode::Local),
            "document-ai" | "docai" => Ok(ExtractionMode::DocumentAi),
            "pdf-services" | "adobe" => Ok(ExtractionMode::PdfServices),
            other => Err(AppError::InvalidInput(format!(
                "Unknown extraction mode '{}', expected one of: local, document-ai, pdf-services",
                other
            ))),
        }
    }
}

/// Converts extracted cell text, keeping numbers as numbers.
pub(crate) fn parse_cell(text: &str) -> Cell {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Cell::Empty;
    }

    if detector::is_numeric(trimmed) && !trimmed.contains(['$', '€', '£', '%']) {
        if let Ok(value) = trimmed.replace(',', "").parse::<f64>() {
            return Cell::Number(value);
        }
    }

    Cell::Text(trimmed.to_string())
}

/// Converts one extracted row. The first column keeps its text as written,
/// since it is what the mapping table matches against: `00123` or `1.10`
/// must not turn into `123` or `1.1`.
pub(crate) fn parse_row<S: AsRef<str>>(cells: &[S]) -> Vec<Cell> {
    cells
        .iter()
        .enumerate()
        .map(|(idx, text)| {
            if idx == 0 {
                Cell::text(text.as_ref().trim())
            } else {
                parse_cell(text.as_ref())
            }
        })
        .collect()
}

/// Dispatches extraction requests to the configured backends.
pub struct Extractor {
    local: LocalExtractor,
    document_ai: Option<DocumentAiClient>,
    pdf_services: Option<PdfServicesClient>,
}

impl Extractor {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            local: LocalExtractor::default(),
            document_ai: config
                .document_ai
                .clone()
                .map(|c| DocumentAiClient::new(http.clone(), c, config.poll.clone())),
            pdf_services: config
                .pdf_services
                .clone()
                .map(|c| PdfServicesClient::new(http.clone(), c, config.poll.clone())),
        }
    }

    pub fn available_modes(&self) -> Vec<ExtractionMode> {
        let mut modes = vec![ExtractionMode::Local];
        if self.document_ai.is_some() {
            modes.push(ExtractionMode::DocumentAi);
        }
        if self.pdf_services.is_some() {
            modes.push(ExtractionMode::PdfServices);
        }
        modes
    }

    pub async fn extract(&self, mode: ExtractionMode, pdf_bytes: Bytes, file_name: &str) -> AppResult<Vec<Table>> {
        if !looks_like_pdf(&pdf_bytes) {
            return Err(AppError::InvalidInput(format!("'{}' is not a PDF file", file_name)));
        }

        let start = std::time::Instant::now();
        tracing::info!("Extracting tables from {} ({}KB) using {}", file_name, pdf_bytes.len() / 1024, mode);

        let tables = match mode {
            ExtractionMode::Local => self.local.extract_tables(pdf_bytes).await?,
            ExtractionMode::DocumentAi => {
                let client = self
                    .document_ai
                    .as_ref()
                    .ok_or_else(|| AppError::BackendNotConfigured(mode.to_string()))?;
                client.extract_tables(pdf_bytes, file_name).await?
            }
            ExtractionMode::PdfServices => {
                let client = self
                    .pdf_services
                    .as_ref()
                    .ok_or_else(|| AppError::BackendNotConfigured(mode.to_string()))?;
                client.extract_tables(pdf_bytes).await?
            }
        };

        tracing::info!("Extracted {} table(s) with {} in {:?}", tables.len(), mode, start.elapsed());
        Ok(tables)
    }
}

// The header must appear within the first KB
fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes
        .windows(5)
        .take(1024)
        .any(|window| window == b"%PDF-")
}

/// Maps a non-success response to [`AppError::RemoteService`], keeping the body for context.
pub(crate) async fn ensure_success(response: reqwest::Response, what: &str) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    tracing::error!("{} failed with {}: {}", what, status, body);
    Err(AppError::RemoteService(format!("{} failed with {}: {}", what, status, body)))
}
