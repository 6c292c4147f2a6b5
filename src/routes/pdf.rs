use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use super::{xlsx_attachment, UploadForm};
use crate::{
    error::AppError,
    services::excel::{tables_file_name, write_workbook},
    services::extraction::ExtractionMode,
    AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputFormat {
    #[default]
    Xlsx,
    Json,
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(OutputFormat::Xlsx),
            "json" => Ok(OutputFormat::Json),
            other => Err(AppError::InvalidInput(format!(
                "Unknown output format '{}', expected xlsx or json",
                other
            ))),
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/pdf/extract", post(extract_pdf))
}

async fn extract_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let (file_name, data) = form.take_file()?;

    let mode = form
        .field("mode")
        .map(|m| m.parse::<ExtractionMode>())
        .transpose()?
        .unwrap_or_default();
    let format = form
        .field("format")
        .map(|f| f.parse::<OutputFormat>())
        .transpose()?
        .unwrap_or_default();
    let company = form.field("company");

    let start = std::time::Instant::now();
    let mut tables = state.extractor.extract(mode, data, &file_name).await?;

    let replaced: usize = match company.as_deref() {
        Some(company) => tables
            .iter_mut()
            .map(|table| state.mappings.apply(company, table))
            .sum(),
        None => 0,
    };

    tracing::info!(
        "{}: {} table(s), {} mapped cell(s) in {:?}",
        file_name,
        tables.len(),
        replaced,
        start.elapsed()
    );

    match format {
        OutputFormat::Json => Ok(Json(json!({
            "mode": mode,
            "tables": tables,
            "replaced": replaced,
        }))
        .into_response()),
        OutputFormat::Xlsx => {
            let workbook = tokio::task::spawn_blocking(move || write_workbook(&tables)).await??;
            Ok(xlsx_attachment(&tables_file_name(&file_name), workbook, replaced))
        }
    }
}
