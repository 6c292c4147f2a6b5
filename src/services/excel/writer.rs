use super::utils::sanitize_sheet_name;
use crate::error::AppError;
use crate::models::{Cell, Table};
use chrono::{NaiveDateTime, Timelike};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::HashSet;

fn to_cell_index(row_idx: usize, col_idx: usize) -> Result<(u32, u16), AppError> {
    let row = u32::try_from(row_idx)
        .map_err(|_| AppError::FileProcessingError("Row index overflow".to_string()))?;
    let col = u16::try_from(col_idx)
        .map_err(|_| AppError::FileProcessingError("Column index overflow".to_string()))?;
    Ok((row, col))
}

// Days between Excel's 1899-12-30 epoch and the Unix epoch
const UNIX_EPOCH_SERIAL: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn excel_serial(value: &NaiveDateTime) -> f64 {
    UNIX_EPOCH_SERIAL + value.and_utc().timestamp_millis() as f64 / MILLIS_PER_DAY
}

struct Formats {
    header: Format,
    date: Format,
    datetime: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }
}

fn write_table(worksheet: &mut Worksheet, table: &Table, formats: &Formats) -> Result<(), AppError> {
    let mut row_offset = 0;
    if let Some(header) = &table.header {
        for (col_idx, title) in header.iter().enumerate() {
            // Untitled columns stay blank so the used range starts where the source did
            if title.is_empty() {
                continue;
            }
            let (row, col) = to_cell_index(0, col_idx)?;
            worksheet.write_string_with_format(row, col, title, &formats.header)?;
        }
        row_offset = 1;
    }

    for (row_idx, cells) in table.rows.iter().enumerate() {
        for (col_idx, cell) in cells.iter().enumerate() {
            let (row, col) = to_cell_index(row_idx + row_offset, col_idx)?;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                Cell::DateTime(dt) => {
                    let format = if dt.num_seconds_from_midnight() == 0 {
                        &formats.date
                    } else {
                        &formats.datetime
                    };
                    worksheet.write_number_with_format(row, col, excel_serial(dt), format)?;
                }
            }
        }
    }

    Ok(())
}

/// Writes each table to its own worksheet and returns the xlsx bytes.
pub fn write_workbook(tables: &[Table]) -> Result<Vec<u8>, AppError> {
    if tables.is_empty() {
        return Err(AppError::FileProcessingError("Nothing to write: no tables".to_string()));
    }

    let mut workbook = Workbook::new();
    let formats = Formats::new();
    let mut used_names = HashSet::new();

    for table in tables {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sanitize_sheet_name(&table.name, &mut used_names))?;
        write_table(worksheet, table, &formats)?;
    }

    let buffer = workbook.save_to_buffer()?;
    tracing::info!("Wrote {} worksheet(s), {}KB", tables.len(), buffer.len() / 1024);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::excel::processor::{read_sheet, read_workbook};
    use crate::services::mappings::MappingTable;
    use bytes::Bytes;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    fn sample_table(name: &str) -> Table {
        Table {
            name: name.to_string(),
            header: Some(vec!["Item".into(), "Qty".into(), "In stock".into()]),
            rows: vec![
                vec![Cell::text("Steel Bolt M8"), Cell::Number(12.0), Cell::Bool(true)],
                vec![Cell::text("Hex Nut"), Cell::Number(2.5), Cell::Empty],
            ],
        }
    }

    #[test]
    fn round_trips_through_calamine() {
        let bytes = Bytes::from(write_workbook(&[sample_table("Parts")]).unwrap());

        let tables = read_workbook(&bytes).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0], sample_table("Parts"));
    }

    #[test]
    fn writes_one_sheet_per_table_with_unique_names() {
        let bytes = Bytes::from(
            write_workbook(&[sample_table("Page 1: Table 1"), sample_table("page 1_ table 1")]).unwrap(),
        );

        let names: Vec<String> = read_workbook(&bytes).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Page 1_ Table 1", "page 1_ table 1 (1)"]);
        let second = read_sheet(&bytes, Some("page 1_ table 1 (1)")).unwrap();
        assert_eq!(second.rows.len(), 2);
    }

    #[test]
    fn read_sheet_rejects_unknown_names() {
        let bytes = Bytes::from(write_workbook(&[sample_table("Parts")]).unwrap());
        let err = read_sheet(&bytes, Some("Missing")).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(read_sheet(&bytes, None).unwrap().name, "Parts");
    }

    #[test]
    fn keeps_an_empty_column_a_in_place() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Parts").unwrap();
        worksheet.write_string(0, 1, "Item").unwrap();
        worksheet.write_string(0, 2, "Qty").unwrap();
        worksheet.write_string(1, 1, "Bolt").unwrap();
        worksheet.write_number(1, 2, 4.0).unwrap();
        let source = Bytes::from(workbook.save_to_buffer().unwrap());

        let mut table = read_sheet(&source, None).unwrap();
        assert_eq!(table.header, Some(vec![String::new(), "Item".to_string(), "Qty".to_string()]));
        assert_eq!(table.rows[0], vec![Cell::Empty, Cell::text("Bolt"), Cell::Number(4.0)]);

        let mut mappings = MappingTable::empty();
        mappings.insert("Acme", "Bolt", "BOLT-X");
        assert_eq!(mappings.apply("Acme", &mut table), 0);

        let written = Bytes::from(write_workbook(&[table]).unwrap());
        let mut reopened: Xlsx<_> = open_workbook_from_rs(Cursor::new(written.clone())).unwrap();
        let range = reopened.worksheet_range("Parts").unwrap();
        assert_eq!(range.start(), Some((0, 1)));
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Item".to_string())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Bolt".to_string())));
    }

    #[test]
    fn dates_survive_a_round_trip() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        worksheet.write_string(0, 0, "Delivered").unwrap();
        worksheet.write_number_with_format(1, 0, 45366.0, &date_format).unwrap();
        worksheet.write_number_with_format(2, 0, 45366.75, &date_format).unwrap();
        let source = Bytes::from(workbook.save_to_buffer().unwrap());

        let table = read_sheet(&source, None).unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(table.rows[0][0], Cell::DateTime(date.and_hms_opt(0, 0, 0).unwrap()));
        assert_eq!(table.rows[1][0], Cell::DateTime(date.and_hms_opt(18, 0, 0).unwrap()));

        let written = Bytes::from(write_workbook(std::slice::from_ref(&table)).unwrap());
        assert_eq!(read_sheet(&written, None).unwrap(), table);

        let mut reopened: Xlsx<_> = open_workbook_from_rs(Cursor::new(written)).unwrap();
        let range = reopened.worksheet_range("Sheet1").unwrap();
        match range.get_value((1, 0)) {
            Some(Data::DateTime(value)) => assert_eq!(value.as_f64(), 45366.0),
            other => panic!("expected a date cell, got {:?}", other),
        }
    }

    #[test]
    fn refuses_to_write_nothing() {
        assert!(write_workbook(&[]).is_err());
    }

    #[test]
    fn garbage_bytes_are_a_processing_error() {
        let err = read_workbook(&Bytes::from_static(b"not a spreadsheet")).unwrap_err();
        assert!(matches!(err, AppError::FileProcessingError(_)));
    }
}
