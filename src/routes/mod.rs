use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{error::AppError, AppState};

pub mod pdf;
pub mod sheets;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MAPPED_CELLS_HEADER: &str = "x-mapped-cells";

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION, header::HeaderName::from_static(MAPPED_CELLS_HEADER)])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/companies", get(list_companies))
        .merge(sheets::routes())
        .merge(pdf::routes())
        .layer(cors)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_companies(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "companies": state.mappings.companies() }))
}

// Going over the body limit is 413, anything else a bad request
fn multipart_error(context: &str, err: MultipartError) -> AppError {
    let message = format!("{}: {}", context, err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::InvalidInput(message)
    }
}

/// An uploaded file plus the plain text fields sent alongside it.
#[derive(Debug, Default)]
pub struct UploadForm {
    file: Option<(String, Bytes)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Malformed multipart body", e))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "file" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read upload", e))?;
                tracing::info!("Received {} ({}KB)", file_name, data.len() / 1024);
                form.file = Some((file_name, data));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&format!("Failed to read field {}", name), e))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Takes the uploaded file, rejecting empty or missing uploads.
    pub fn take_file(&mut self) -> Result<(String, Bytes), AppError> {
        match self.file.take() {
            Some((_, data)) if data.is_empty() => Err(AppError::InvalidInput("Uploaded file is empty".to_string())),
            Some(file) => Ok(file),
            None => Err(AppError::InvalidInput("No file provided".to_string())),
        }
    }

    /// A text field, trimmed; blank values count as absent.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// An xlsx download carrying the number of rewritten cells.
pub fn xlsx_attachment(file_name: &str, workbook: Vec<u8>, mapped_cells: usize) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file_name);
    let mut response = (StatusCode::OK, Body::from(workbook)).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(MAPPED_CELLS_HEADER, HeaderValue::from(mapped_cells));
    response
}
