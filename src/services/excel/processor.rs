use super::utils::data_to_cell;
use std::io::Cursor;
use bytes::Bytes;
use calamine::{Data, Xlsx, open_workbook_from_rs, Reader, Range};
use crate::error::AppError;
use crate::models::{Cell, Table};

fn open_workbook(file_data: &Bytes) -> Result<Xlsx<Cursor<Bytes>>, AppError> {
    open_workbook_from_rs(Cursor::new(file_data.clone()))
        .map_err(|e: calamine::XlsxError| {
            tracing::error!("Failed to open Excel file: {}", e);
            AppError::FileProcessingError(format!("Failed to open Excel file: {}", e))
        })
}

/// Turns a worksheet range into a table whose first non-empty row is the header.
///
/// calamine ranges begin at the first used cell, so rows are padded back to
/// column A and the first column of the table is always the sheet's column A.
pub fn range_to_table(name: &str, range: &Range<Data>) -> Table {
    let leading_columns = range.start().map_or(0, |(_, col)| col as usize);

    let mut rows: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| {
            std::iter::repeat(Cell::Empty)
                .take(leading_columns)
                .chain(row.iter().map(data_to_cell))
                .collect()
        })
        .skip_while(|row: &Vec<Cell>| row.iter().all(Cell::is_empty))
        .collect();

    while rows.last().map_or(false, |row| row.iter().all(Cell::is_empty)) {
        rows.pop();
    }

    Table::with_header_row(name, rows)
}

/// Reads every sheet of an xlsx upload.
pub fn read_workbook(file_data: &Bytes) -> Result<Vec<Table>, AppError> {
    let start = std::time::Instant::now();
    let mut workbook = open_workbook(file_data)?;
    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Reading {} sheets", sheet_names.len());

    let mut tables = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = workbook.worksheet_range(sheet_name)?;
        tracing::debug!("Sheet {} spans {:?}", sheet_name, range.get_size());
        tables.push(range_to_table(sheet_name, &range));
    }

    tracing::info!("Workbook read in {:?}", start.elapsed());
    Ok(tables)
}

/// Reads one sheet by name, or the first sheet when no name is given.
pub fn read_sheet(file_data: &Bytes, sheet: Option<&str>) -> Result<Table, AppError> {
    let mut workbook = open_workbook(file_data)?;
    let sheet_names = workbook.sheet_names().to_vec();

    let sheet_name = match sheet {
        Some(requested) => sheet_names
            .iter()
            .find(|name| name.as_str() == requested)
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Sheet '{}' not found, available sheets: {}",
                    requested,
                    sheet_names.join(", ")
                ))
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?,
    };

    tracing::info!("Reading sheet: {}", sheet_name);
    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(range_to_table(&sheet_name, &range))
}
