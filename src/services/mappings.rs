use crate::error::AppError;
use crate::models::{Cell, Table};
use crate::services::normalize::{normalize_item, sanitize_text};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct MappingRecord {
    #[serde(rename = "Company")]
    company: String,
    #[serde(rename = "Original")]
    original: String,
    #[serde(rename = "Mapped")]
    mapped: String,
}

#[derive(Debug, Default)]
struct CompanyMappings {
    display_name: String,
    replacements: HashMap<String, String>,
}

/// Per-company replacement table for first-column values.
///
/// Companies are keyed case-insensitively and originals by their
/// [`normalize_item`] form. When the source lists the same normalized
/// original twice for one company, the later row wins.
#[derive(Debug, Default)]
pub struct MappingTable {
    companies: HashMap<String, CompanyMappings>,
}

fn company_key(company: &str) -> String {
    company.trim().to_lowercase()
}

impl MappingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads the mapping CSV at `path`. A missing file gives an empty table.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            warn!("Mapping file {} not found, continuing without mappings", path.display());
            return Ok(Self::empty());
        }

        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(
            "Loaded mappings for {} companies ({} entries) from {}",
            table.companies.len(),
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses `Company,Original,Mapped` rows. Bytes that are not valid UTF-8 are dropped.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, AppError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let text = sanitize_text(&String::from_utf8_lossy(&raw));

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut table = Self::empty();
        for (line, record) in csv_reader.deserialize::<MappingRecord>().enumerate() {
            let record = record.map_err(|e| {
                AppError::MappingError(format!("Invalid mapping row {}: {}", line + 2, e))
            })?;
            table.insert(&record.company, &record.original, &record.mapped);
        }

        Ok(table)
    }

    /// Adds one mapping. Blank companies and originals that normalize to nothing are ignored.
    pub fn insert(&mut self, company: &str, original: &str, mapped: &str) {
        let key = company_key(company);
        let normalized = normalize_item(original);
        if key.is_empty() || normalized.is_empty() {
            debug!("Skipping mapping row with empty key: {:?} / {:?}", company, original);
            return;
        }

        let entry = self.companies.entry(key).or_insert_with(|| CompanyMappings {
            display_name: company.trim().to_string(),
            replacements: HashMap::new(),
        });
        entry.replacements.insert(normalized, mapped.to_string());
    }

    /// Company names for selection, sorted.
    pub fn companies(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .companies
            .values()
            .map(|c| c.display_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_company(&self, company: &str) -> bool {
        self.companies.contains_key(&company_key(company))
    }

    /// Total number of mapping entries across companies.
    pub fn len(&self) -> usize {
        self.companies.values().map(|c| c.replacements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn lookup(&self, company: &str, raw: &str) -> Option<&str> {
        let mappings = self.companies.get(&company_key(company))?;
        let normalized = normalize_item(raw);
        if normalized.is_empty() {
            return None;
        }
        mappings.replacements.get(&normalized).map(String::as_str)
    }

    /// The mapped replacement for `raw`, or `raw` itself when nothing matches.
    pub fn map_value<'a>(&'a self, company: &str, raw: &'a str) -> Cow<'a, str> {
        match self.lookup(company, raw) {
            Some(mapped) => Cow::Borrowed(mapped),
            None => Cow::Borrowed(raw),
        }
    }

    /// Rewrites the first column of every data row; the header is left alone.
    /// Returns how many cells were replaced.
    pub fn apply(&self, company: &str, table: &mut Table) -> usize {
        let Some(mappings) = self.companies.get(&company_key(company)) else {
            warn!("No mappings found for company {:?}", company);
            return 0;
        };
        if table.rows.is_empty() || table.width() == 0 {
            return 0;
        }

        let mut replaced = 0;
        for row in table.rows.iter_mut() {
            let Some(cell) = row.first_mut() else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }

            let normalized = normalize_item(&cell.to_string());
            if let Some(mapped) = mappings.replacements.get(&normalized) {
                *cell = Cell::Text(mapped.clone());
                replaced += 1;
            }
        }

        info!(
            "Applied {} mapping(s) for {} to table {}",
            replaced, mappings.display_name, table.name
        );
        replaced
    }
}
