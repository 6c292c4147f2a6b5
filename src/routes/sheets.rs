use axum::{
    extract::{Multipart, State},
    response::Response,
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use super::{xlsx_attachment, UploadForm};
use crate::{
    error::AppError,
    models::WorkbookPreview,
    services::excel::{preview_workbook, read_sheet, updated_file_name, write_workbook},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sheets/inspect", post(inspect_sheet))
        .route("/sheets/update", post(update_sheet))
}

async fn inspect_sheet(multipart: Multipart) -> Result<Json<WorkbookPreview>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let (file_name, data) = form.take_file()?;

    let start = std::time::Instant::now();
    let preview = tokio::task::spawn_blocking(move || preview_workbook(&data)).await??;
    tracing::info!(
        "Inspected {}: {} sheet(s) in {:?}",
        file_name,
        preview.sheet_names.len(),
        start.elapsed()
    );

    Ok(Json(preview))
}

async fn update_sheet(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let (file_name, data) = form.take_file()?;
    let sheet = form.field("sheet");
    let company = form.field("company");

    let start = std::time::Instant::now();
    tracing::info!(
        "Updating {} (sheet: {}, company: {})",
        file_name,
        sheet.as_deref().unwrap_or("<first>"),
        company.as_deref().unwrap_or("<none>")
    );

    let mappings = state.mappings.clone();
    let (sheet_name, replaced, workbook) = tokio::task::spawn_blocking(move || {
        let mut table = read_sheet(&data, sheet.as_deref())?;
        let replaced = company
            .as_deref()
            .map_or(0, |company| mappings.apply(company, &mut table));
        let workbook = write_workbook(std::slice::from_ref(&table))?;
        Ok::<_, AppError>((table.name, replaced, workbook))
    })
    .await??;

    tracing::info!(
        "Sheet {} updated with {} mapped cell(s) in {:?}",
        sheet_name,
        replaced,
        start.elapsed()
    );

    Ok(xlsx_attachment(&updated_file_name(&sheet_name), workbook, replaced))
}
