//! Client for the hosted document-AI parsing API.
//!
//! The flow is upload, poll the job until it succeeds, then fetch the JSON
//! result and keep its `table` items.

use super::ensure_success;
use super::parse_cell;
use super::poll::{poll_until, PollStatus};
use crate::config::{DocumentAiConfig, PollConfig};
use crate::error::{AppError, AppResult};
use crate::models::{Cell, Table};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParseResult {
    #[serde(default)]
    pub pages: Vec<ParsedPage>,
}

#[derive(Debug, Deserialize)]
pub struct ParsedPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Deserialize)]
pub struct ParsedItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

pub struct DocumentAiClient {
    http: reqwest::Client,
    config: DocumentAiConfig,
    poll: PollConfig,
}

impl DocumentAiClient {
    pub fn new(http: reqwest::Client, config: DocumentAiConfig, poll: PollConfig) -> Self {
        Self { http, config, poll }
    }

    async fn upload(&self, pdf_bytes: Bytes, file_name: &str) -> AppResult<String> {
        let part = Part::bytes(pdf_bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/parsing/upload", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let job: JobResponse = ensure_success(response, "Document upload").await?.json().await?;

        tracing::info!("Document AI job {} created ({})", job.id, job.status);
        Ok(job.id)
    }

    async fn job_status(&self, job_id: &str) -> AppResult<PollStatus<()>> {
        let response = self
            .http
            .get(format!("{}/parsing/job/{}", self.config.base_url, job_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let job: JobResponse = ensure_success(response, "Job status").await?.json().await?;

        match job.status.to_uppercase().as_str() {
            "SUCCESS" => Ok(PollStatus::Ready(())),
            "ERROR" | "CANCELED" | "CANCELLED" => Err(AppError::ExtractionFailed(format!(
                "Document AI job {} ended with {}: {}",
                job_id,
                job.status,
                job.error_message.unwrap_or_else(|| "no details".to_string())
            ))),
            _ => Ok(PollStatus::Pending(job.status)),
        }
    }

    async fn fetch_result(&self, job_id: &str) -> AppResult<ParseResult> {
        let response = self
            .http
            .get(format!("{}/parsing/job/{}/result/json", self.config.base_url, job_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        Ok(ensure_success(response, "Result download").await?.json().await?)
    }

    pub async fn extract_tables(&self, pdf_bytes: Bytes, file_name: &str) -> AppResult<Vec<Table>> {
        let job_id = self.upload(pdf_bytes, file_name).await?;

        let what = format!("Document AI job {}", job_id);
        poll_until(&what, &self.poll, |_| self.job_status(&job_id)).await?;

        let result = self.fetch_result(&job_id).await?;
        let tables = tables_from_result(&result);
        if tables.is_empty() {
            return Err(AppError::ExtractionFailed("Document AI found no tables".to_string()));
        }
        Ok(tables)
    }
}

// First-column strings stay text for the mapping lookup
fn value_to_cell(column: usize, value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => n.as_f64().map_or(Cell::Empty, Cell::Number),
        Value::String(s) if column == 0 => Cell::text(s.trim()),
        Value::String(s) => parse_cell(s),
        other => Cell::Text(other.to_string()),
    }
}

/// Keeps the `table` items of a parse result, first row as header.
pub fn tables_from_result(result: &ParseResult) -> Vec<Table> {
    let mut tables = Vec::new();

    for page in &result.pages {
        let page_tables = page
            .items
            .iter()
            .filter(|item| item.kind.eq_ignore_ascii_case("table") && !item.rows.is_empty());

        for (idx, item) in page_tables.enumerate() {
            let rows = item
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(column, value)| value_to_cell(column, value))
                        .collect()
                })
                .collect();
            tables.push(Table::with_header_row(
                format!("Page {} Table {}", page.page, idx + 1),
                rows,
            ));
        }
    }

    tables
}
