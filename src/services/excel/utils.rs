use std::collections::HashSet;
use calamine::Data;
use crate::models::Cell;
use crate::services::normalize::sanitize_text;

const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Makes `name` acceptable as an Excel worksheet name and unique among `used`.
///
/// Excel limits names to 31 characters, forbids `[]:*?/\` and compares names
/// case-insensitively.
pub fn sanitize_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim();

    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME_LEN).collect()
    };

    let mut candidate = base.clone();
    let mut counter = 1;
    while !used.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({})", counter);
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        counter += 1;
    }

    candidate
}

/// Name of the file offered for download after updating `sheet`.
pub fn updated_file_name(sheet: &str) -> String {
    format!("updated_{}.xlsx", clean_file_stem(sheet))
}

/// Name of the file offered for download after extracting tables from `upload`.
pub fn tables_file_name(upload: &str) -> String {
    let stem = upload
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(upload);
    let stem = stem
        .strip_suffix(".pdf")
        .or_else(|| stem.strip_suffix(".PDF"))
        .unwrap_or(stem);
    format!("{}_tables.xlsx", clean_file_stem(stem))
}

fn clean_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '_' || c == '.').to_string();

    if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned
    }
}

/// Converts a calamine value into a [`Cell`].
pub fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Bool(b) => Cell::Bool(*b),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::text(sanitize_text(s)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if dt.is_datetime() => Cell::DateTime(value),
            // Durations and out-of-range serials keep the raw serial value
            _ => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#ERROR: {:?}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    #[test]
    fn replaces_forbidden_characters_and_truncates() {
        let mut used = HashSet::new();
        assert_eq!(sanitize_sheet_name("Q1/Q2 [draft]", &mut used), "Q1_Q2 _draft_");
        let long = "A very long worksheet name that Excel rejects";
        let cleaned = sanitize_sheet_name(long, &mut used);
        assert_eq!(cleaned.chars().count(), 31);
        assert!(long.starts_with(&cleaned));
    }

    #[test]
    fn deduplicates_case_insensitively() {
        let mut used = HashSet::new();
        assert_eq!(sanitize_sheet_name("Table", &mut used), "Table");
        assert_eq!(sanitize_sheet_name("TABLE", &mut used), "TABLE (1)");
        assert_eq!(sanitize_sheet_name("table", &mut used), "table (2)");
        assert_eq!(sanitize_sheet_name("", &mut used), "Sheet");
    }

    #[test]
    fn builds_download_names() {
        assert_eq!(updated_file_name("Sheet1"), "updated_Sheet1.xlsx");
        assert_eq!(updated_file_name("Q1 / Costs"), "updated_Q1___Costs.xlsx");
        assert_eq!(tables_file_name("invoices/March.pdf"), "March_tables.xlsx");
        assert_eq!(tables_file_name(""), "sheet_tables.xlsx");
    }

    #[test]
    fn converts_calamine_values() {
        assert_eq!(data_to_cell(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(data_to_cell(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(data_to_cell(&Data::String("Bolt".into())), Cell::Text("Bolt".into()));
        assert_eq!(data_to_cell(&Data::Bool(false)), Cell::Bool(false));
    }

    #[test]
    fn converts_dates() {
        let serial = Data::DateTime(ExcelDateTime::new(45366.5, ExcelDateTimeType::DateTime, false));
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(data_to_cell(&serial), Cell::DateTime(expected));

        let duration = Data::DateTime(ExcelDateTime::new(1.5, ExcelDateTimeType::TimeDelta, false));
        assert_eq!(data_to_cell(&duration), Cell::Number(1.5));
    }
}
