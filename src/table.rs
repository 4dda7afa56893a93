//! CSV input and output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{HarvestError, Record, Result};

/// Reads the non-empty cells of a named column.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let index = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| {
            HarvestError::Config(format!(
                "column '{}' not found in {}",
                column,
                path.display()
            ))
        })?;

    let mut cells = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(cell) = row.get(index).map(str::trim).filter(|c| !c.is_empty()) {
            cells.push(cell.to_string());
        }
    }
    debug!("Read {} cells of '{}' from {}", cells.len(), column, path.display());
    Ok(cells)
}

/// Decodes a cell holding a list of strings.
///
/// Accepts a JSON array or a list literal with single-quoted entries such as
/// `['https://a', 'https://b']`. Anything else is taken as one entry.
pub fn decode_list(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    if let Ok(entries) = serde_json::from_str::<Vec<String>>(cell) {
        return entries;
    }
    match cell.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
        Some(inner) => inner
            .split(',')
            .map(|entry| entry.trim().trim_matches(|c| c == '\'' || c == '"').trim())
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
        None if cell.is_empty() => Vec::new(),
        None => vec![cell.to_string()],
    }
}

/// Flattens cells of encoded lists into one list, keeping order.
pub fn flatten_encoded_lists(cells: &[String]) -> Vec<String> {
    cells.iter().flat_map(|cell| decode_list(cell)).collect()
}

/// Writes records as CSV, one row per record.
///
/// Columns follow `columns`; nested values are written as JSON and absent
/// values as empty cells. Parent directories are created.
pub fn write_rows(path: &Path, columns: &[String], records: &[Record]) -> Result<()> {
    let persist = |e: &dyn std::fmt::Display| {
        HarvestError::Persistence(format!("{}: {}", path.display(), e))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persist(&e))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| persist(&e))?;
    writer.write_record(columns).map_err(|e| persist(&e))?;
    for record in records {
        let row = columns
            .iter()
            .map(|c| record.get(c).map(|v| v.to_cell()).unwrap_or_default());
        writer.write_record(row).map_err(|e| persist(&e))?;
    }
    writer.flush().map_err(|e| persist(&e))?;
    Ok(())
}

/// Destination of a run's final snapshot.
pub trait Sink: Send + Sync {
    /// Persists the records.
    fn write(&self, columns: &[String], records: &[Record]) -> Result<()>;

    /// Where the records go, for log lines.
    fn describe(&self) -> String;
}

/// Writes the snapshot to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvSink {
    fn write(&self, columns: &[String], records: &[Record]) -> Result<()> {
        write_rows(&self.path, columns, records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
