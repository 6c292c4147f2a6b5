use super::processor::read_workbook;
use bytes::Bytes;
use crate::error::AppError;
use crate::models::{SheetSummary, Table, WorkbookPreview};

const SAMPLE_ROWS: usize = 5;

fn summarize(table: &Table) -> SheetSummary {
    SheetSummary {
        name: table.name.clone(),
        row_count: table.rows.len(),
        column_count: table.width(),
        header: table.header.clone(),
        sample_data: table
            .rows
            .iter()
            .take(SAMPLE_ROWS)
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect(),
    }
}

/// Sheet names plus a short summary of each sheet, for picking what to update.
pub fn preview_workbook(file_data: &Bytes) -> Result<WorkbookPreview, AppError> {
    let tables = read_workbook(file_data)?;
    if tables.is_empty() {
        return Err(AppError::FileProcessingError("No sheets found in workbook".to_string()));
    }

    Ok(WorkbookPreview {
        sheet_names: tables.iter().map(|t| t.name.clone()).collect(),
        sheets: tables.iter().map(summarize).collect(),
    })
}

