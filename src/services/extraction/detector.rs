//! Finds whitespace-aligned tables in plain text pulled out of a PDF.

use once_cell::sync::Lazy;
use regex::Regex;

// Two or more spaces, tabs or pipes separate columns
static COLUMN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s{2,}|\t+|\|)+").expect("valid separator regex"));
static HORIZONTAL_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-=_+|\s]{3,}$").expect("valid rule regex"));
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?[$€£]?\d[\d,]*(?:\.\d+)?%?$").expect("valid numeric regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    pub rows: Vec<Vec<String>>,
    pub end_line: usize,
}

#[derive(Debug, Clone)]
pub struct TableDetector {
    min_rows: usize,
    min_cols: usize,
}

impl Default for TableDetector {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_cols: 2,
        }
    }
}

impl TableDetector {
    pub fn detect_tables(&self, text: &str) -> Vec<TableRegion> {
        let lines: Vec<&str> = text.lines().collect();
        let mut tables = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if let Some(table) = self.extract_table_at(&lines, i) {
                i = table.end_line + 1;
                tables.push(table);
            } else {
                i += 1;
            }
        }

        tables
    }

    fn extract_table_at(&self, lines: &[&str], start: usize) -> Option<TableRegion> {
        let mut rows = Vec::new();
        let mut expected_columns = None;
        let mut end_line = start;

        for (idx, line) in lines.iter().enumerate().skip(start) {
            if line.trim().is_empty() {
                if rows.is_empty() {
                    continue;
                }
                break;
            }

            if HORIZONTAL_RULE.is_match(line.trim()) {
                continue;
            }

            let Some(columns) = self.parse_row(line) else {
                break;
            };

            match expected_columns {
                Some(expected) if columns.len() != expected => break,
                Some(_) => {}
                None => expected_columns = Some(columns.len()),
            }

            rows.push(columns);
            end_line = idx;
        }

        if rows.len() >= self.min_rows {
            Some(TableRegion {
                rows,
                end_line,
            })
        } else {
            None
        }
    }

    fn parse_row(&self, line: &str) -> Option<Vec<String>> {
        let parts: Vec<String> = COLUMN_SEPARATOR
            .split(line.trim())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if parts.len() >= self.min_cols {
            Some(parts)
        } else {
            None
        }
    }

    /// A header row has text in every cell and no numbers.
    pub fn is_likely_header(&self, row: &[String]) -> bool {
        !row.is_empty()
            && row.iter().all(|cell| {
                cell.chars().any(char::is_alphabetic) && !is_numeric(cell)
            })
    }
}

pub fn is_numeric(text: &str) -> bool {
    NUMERIC.is_match(text.trim())
}
