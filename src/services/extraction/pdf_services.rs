//! Client for the cloud PDF extraction service.
//!
//! A run exchanges client credentials for a token, uploads the PDF as an
//! asset, starts an extract job, polls the job location and downloads the
//! structured JSON. Tables come back as loose elements whose `Path`
//! (`//Document/Table[2]/TR[3]/TD[2]/P`) says where each text fragment sits.

use super::ensure_success;
use super::parse_row;
use super::poll::{poll_until, PollStatus};
use crate::config::{PdfServicesConfig, PollConfig};
use crate::error::{AppError, AppResult};
use crate::models::Table;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(rename = "uploadUri")]
    upload_uri: String,
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct JobContent {
    #[serde(rename = "downloadUri")]
    download_uri: String,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    content: Option<JobContent>,
    #[serde(default)]
    error: Option<JobError>,
}

#[derive(Debug, Deserialize)]
pub struct StructuredData {
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
pub struct Element {
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
}

pub struct PdfServicesClient {
    http: reqwest::Client,
    config: PdfServicesConfig,
    poll: PollConfig,
}

impl PdfServicesClient {
    pub fn new(http: reqwest::Client, config: PdfServicesConfig, poll: PollConfig) -> Self {
        Self { http, config, poll }
    }

    fn authorized(&self, request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        request
            .bearer_auth(token)
            .header("x-api-key", &self.config.client_id)
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .http
            .post(format!("{}/token", self.config.base_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response, "Token request").await?.json().await?;
        Ok(token.access_token)
    }

    async fn upload_asset(&self, token: &str, pdf_bytes: Bytes) -> AppResult<String> {
        let request = self
            .http
            .post(format!("{}/assets", self.config.base_url))
            .json(&json!({ "mediaType": "application/pdf" }));
        let response = self.authorized(request, token).send().await?;
        let asset: AssetResponse = ensure_success(response, "Asset creation").await?.json().await?;

        let response = self
            .http
            .put(&asset.upload_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf_bytes)
            .send()
            .await?;
        ensure_success(response, "Asset upload").await?;

        tracing::info!("Uploaded PDF as asset {}", asset.asset_id);
        Ok(asset.asset_id)
    }

    async fn start_extract_job(&self, token: &str, asset_id: &str) -> AppResult<String> {
        let request = self
            .http
            .post(format!("{}/operation/extractpdf", self.config.base_url))
            .json(&json!({
                "assetID": asset_id,
                "elementsToExtract": ["text", "tables"],
            }));
        let response = ensure_success(self.authorized(request, token).send().await?, "Extract job").await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::RemoteService("Extract job response has no location header".to_string()))
    }

    async fn job_status(&self, token: &str, location: &str) -> AppResult<PollStatus<String>> {
        let response = self.authorized(self.http.get(location), token).send().await?;
        let job: JobStatus = ensure_success(response, "Job status").await?.json().await?;

        match job.status.to_lowercase().as_str() {
            "done" => job
                .content
                .map(|content| PollStatus::Ready(content.download_uri))
                .ok_or_else(|| AppError::RemoteService("Finished job has no download link".to_string())),
            "failed" => Err(AppError::ExtractionFailed(format!(
                "PDF extraction job failed: {}",
                job.error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "no details".to_string())
            ))),
            _ => Ok(PollStatus::Pending(job.status)),
        }
    }

    async fn download(&self, download_uri: &str) -> AppResult<StructuredData> {
        let response = self.http.get(download_uri).send().await?;
        Ok(ensure_success(response, "Result download").await?.json().await?)
    }

    pub async fn extract_tables(&self, pdf_bytes: Bytes) -> AppResult<Vec<Table>> {
        let token = self.access_token().await?;
        let asset_id = self.upload_asset(&token, pdf_bytes).await?;
        let location = self.start_extract_job(&token, &asset_id).await?;

        let what = format!("PDF extraction for asset {}", asset_id);
        let download_uri = poll_until(&what, &self.poll, |_| self.job_status(&token, &location)).await?;

        let data = self.download(&download_uri).await?;
        let tables = tables_from_elements(&data.elements);
        if tables.is_empty() {
            return Err(AppError::ExtractionFailed("PDF extraction found no tables".to_string()));
        }
        Ok(tables)
    }
}

// Widest sheet Excel can hold
const MAX_COLUMNS: u32 = 16_384;

#[derive(Debug, PartialEq)]
struct CellPosition {
    table_key: String,
    row: u32,
    col: u32,
    is_header: bool,
}

// "TR[3]" -> ("TR", 3); a missing or zero index means 1
fn split_segment(segment: &str) -> (&str, u32) {
    match segment.find('[') {
        Some(open) => {
            let index = segment[open + 1..]
                .trim_end_matches(']')
                .parse::<u32>()
                .ok()
                .filter(|i| *i > 0)
                .unwrap_or(1);
            (&segment[..open], index)
        }
        None => (segment, 1),
    }
}

fn cell_position(path: &str) -> Option<CellPosition> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let table_at = segments.iter().position(|s| split_segment(s).0 == "Table")?;

    let mut row = None;
    let mut cell = None;
    for segment in &segments[table_at + 1..] {
        let (name, index) = split_segment(segment);
        match name {
            "TR" if row.is_none() => row = Some(index),
            "TD" | "TH" if row.is_some() && cell.is_none() => cell = Some((index, name == "TH")),
            _ => {}
        }
    }

    let (col, is_header) = cell?;
    if col > MAX_COLUMNS {
        tracing::warn!("Skipping table cell beyond column {}: {}", MAX_COLUMNS, path);
        return None;
    }

    Some(CellPosition {
        table_key: segments[..=table_at].join("/"),
        row: row?,
        col,
        is_header,
    })
}

#[derive(Default)]
struct TableCells {
    rows: BTreeMap<u32, BTreeMap<u32, String>>,
    header_rows: Vec<u32>,
}

/// Rebuilds tables from structured-data elements, in document order.
pub fn tables_from_elements(elements: &[Element]) -> Vec<Table> {
    let mut order: Vec<String> = Vec::new();
    let mut tables: HashMap<String, TableCells> = HashMap::new();

    for element in elements {
        let Some(position) = cell_position(&element.path) else {
            continue;
        };

        let table = tables.entry(position.table_key.clone()).or_insert_with(|| {
            order.push(position.table_key.clone());
            TableCells::default()
        });

        if position.is_header && !table.header_rows.contains(&position.row) {
            table.header_rows.push(position.row);
        }

        let text = element.text.as_deref().map(str::trim).unwrap_or_default();
        let slot = table
            .rows
            .entry(position.row)
            .or_default()
            .entry(position.col)
            .or_default();
        if !text.is_empty() {
            if !slot.is_empty() {
                slot.push(' ');
            }
            slot.push_str(text);
        }
    }

    order
        .iter()
        .enumerate()
        .filter_map(|(idx, key)| {
            let cells = tables.remove(key)?;
            Some(build_table(format!("Table {}", idx + 1), cells))
        })
        .collect()
}

fn build_table(name: String, cells: TableCells) -> Table {
    let width = cells
        .rows
        .values()
        .filter_map(|row| row.keys().next_back())
        .max()
        .copied()
        .unwrap_or(0) as usize;

    let first_row = cells.rows.keys().next().copied();
    let has_header = first_row.map_or(false, |row| cells.header_rows.contains(&row));

    let mut rows = cells.rows.into_values().map(|row| {
        let mut values = vec![String::new(); width];
        for (col, text) in row {
            values[(col - 1) as usize] = text;
        }
        values
    });

    let mut table = Table::new(name);
    if has_header {
        table.header = rows.next();
    }
    table.rows = rows.map(|row| parse_row(&row)).collect();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn element(path: &str, text: &str) -> Element {
        Element {
            path: path.to_string(),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn parses_element_paths() {
        let position = cell_position("//Document/Sect/Table[2]/TR[3]/TD[2]/P").unwrap();
        assert_eq!(
            position,
            CellPosition {
                table_key: "Document/Sect/Table[2]".to_string(),
                row: 3,
                col: 2,
                is_header: false,
            }
        );

        let header = cell_position("//Document/Table/TR/TH/P").unwrap();
        assert_eq!((header.row, header.col, header.is_header), (1, 1, true));

        assert!(cell_position("//Document/P[4]").is_none());
        assert!(cell_position("//Document/Table[1]").is_none());
    }

    #[test]
    fn skips_cells_beyond_the_last_excel_column() {
        let elements = vec![
            element("//Document/Table/TR/TD/P", "00123"),
            element("//Document/Table/TR/TD[4294967295]/P", "runaway"),
            element("//Document/Table/TR/TD[16385]/P", "too far"),
            element("//Document/Table/TR/TD[2]/P", "7"),
        ];

        let tables = tables_from_elements(&elements);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].width(), 2);
        assert_eq!(tables[0].rows, vec![vec![Cell::text("00123"), Cell::Number(7.0)]]);
    }

    #[test]
    fn rebuilds_tables_in_document_order() {
        let elements = vec![
            element("//Document/H1", "Invoice"),
            element("//Document/Table/TR/TH/P", "Item "),
            element("//Document/Table/TR/TH[2]/P", "Qty"),
            element("//Document/Table/TR[2]/TD/P", "Steel"),
            element("//Document/Table/TR[2]/TD/P[2]", "Bolt M8"),
            element("//Document/Table/TR[2]/TD[2]/P", "120"),
            element("//Document/Table/TR[3]/TD/P", "Hex Nut"),
            element("//Document/Table[2]/TR/TD/P", "a"),
            element("//Document/Table[2]/TR/TD[3]/P", "c"),
        ];

        let tables = tables_from_elements(&elements);
        assert_eq!(tables.len(), 2);

        let first = &tables[0];
        assert_eq!(first.name, "Table 1");
        assert_eq!(first.header, Some(vec!["Item".to_string(), "Qty".to_string()]));
        assert_eq!(first.rows[0], vec![Cell::text("Steel Bolt M8"), Cell::Number(120.0)]);
        assert_eq!(first.rows[1], vec![Cell::text("Hex Nut"), Cell::Empty]);

        let second = &tables[1];
        assert_eq!(second.header, None);
        assert_eq!(second.rows, vec![vec![Cell::text("a"), Cell::Empty, Cell::text("c")]]);
    }

    #[tokio::test]
    async fn runs_the_full_job_flow() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string("client_id=id&client_secret=shh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "expires_in": 86399})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/assets"))
            .and(header("authorization", "Bearer tok"))
            .and(header("x-api-key", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uploadUri": format!("{}/upload/asset-1", base),
                "assetID": "asset-1"
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/asset-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/operation/extractpdf"))
            .respond_with(
                ResponseTemplate::new(201).insert_header("location", format!("{}/jobs/job-9/status", base).as_str()),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jobs/job-9/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in progress"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jobs/job-9/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "done",
                "content": {"downloadUri": format!("{}/download/job-9.json", base)}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/download/job-9.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "elements": [
                    {"Path": "//Document/Table/TR/TH/P", "Text": "Item"},
                    {"Path": "//Document/Table/TR[2]/TD/P", "Text": "Washer"}
                ]
            })))
            .mount(&server)
            .await;

        let client = PdfServicesClient::new(
            reqwest::Client::new(),
            PdfServicesConfig {
                base_url: base.clone(),
                client_id: "id".to_string(),
                client_secret: "shh".to_string(),
            },
            PollConfig {
                attempts: 5,
                interval: Duration::from_millis(5),
            },
        );

        let tables = client.extract_tables(Bytes::from_static(b"%PDF-1.4")).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].header, Some(vec!["Item".to_string()]));
        assert_eq!(tables[0].rows, vec![vec![Cell::text("Washer")]]);
    }

    #[tokio::test]
    async fn failed_jobs_are_extraction_errors() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uploadUri": format!("{}/upload/a", base),
                "assetID": "a"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/a"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/operation/extractpdf"))
            .respond_with(ResponseTemplate::new(201).insert_header("location", format!("{}/jobs/a", base).as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": {"code": "BAD_PDF", "message": "File is corrupt"}
            })))
            .mount(&server)
            .await;

        let client = PdfServicesClient::new(
            reqwest::Client::new(),
            PdfServicesConfig {
                base_url: base,
                client_id: "id".to_string(),
                client_secret: "shh".to_string(),
            },
            PollConfig::default(),
        );

        let err = client.extract_tables(Bytes::from_static(b"%PDF-1.4")).await.unwrap_err();
        match err {
            AppError::ExtractionFailed(msg) => assert!(msg.contains("File is corrupt")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
