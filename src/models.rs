use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;

/// A single spreadsheet value, whatever backend produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Builds a text cell, treating blank strings as empty.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            // Integral floats are shown the way a spreadsheet shows them
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Cell::DateTime(dt) if dt.num_seconds_from_midnight() == 0 => write!(f, "{}", dt.format("%Y-%m-%d")),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// A named table: an optional header row followed by data rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: None,
            rows: Vec::new(),
        }
    }

    /// Builds a table from raw rows, promoting the first row to the header.
    pub fn with_header_row(name: impl Into<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let header = if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0).iter().map(|c| c.to_string()).collect())
        };
        Self {
            name: name.into(),
            header,
            rows,
        }
    }

    /// Number of columns: the widest of the header and any data row.
    pub fn width(&self) -> usize {
        let header_width = self.header.as_ref().map_or(0, |h| h.len());
        self.rows
            .iter()
            .map(|r| r.len())
            .max()
            .unwrap_or(0)
            .max(header_width)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.header.as_ref().map_or(true, |h| h.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub header: Option<Vec<String>>,
    pub sample_data: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookPreview {
    pub sheet_names: Vec<String>,
    pub sheets: Vec<SheetSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_cells_like_a_spreadsheet() {
        assert_eq!(Cell::Number(42.0).to_string(), "42");
        assert_eq!(Cell::Number(1.5).to_string(), "1.5");
        assert_eq!(Cell::Bool(true).to_string(), "TRUE");
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::text("   "), Cell::Empty);

        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(Cell::DateTime(date.and_hms_opt(0, 0, 0).unwrap()).to_string(), "2024-03-15");
        assert_eq!(
            Cell::DateTime(date.and_hms_opt(9, 30, 0).unwrap()).to_string(),
            "2024-03-15 09:30:00"
        );
    }

    #[test]
    fn promotes_first_row_to_header() {
        let table = Table::with_header_row(
            "Sheet1",
            vec![
                vec![Cell::text("Item"), Cell::text("Qty")],
                vec![Cell::text("Bolt"), Cell::Number(3.0), Cell::Number(1.0)],
            ],
        );
        assert_eq!(table.header, Some(vec!["Item".to_string(), "Qty".to_string()]));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.width(), 3);
        assert!(!table.is_empty());
        assert!(Table::new("blank").is_empty());
    }
}
