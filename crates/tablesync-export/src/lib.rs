//! tablesync-export — turn the rows on screen into files and clipboard text.
//!
//! Rows are any `Serialize` type that serializes to a JSON object; columns
//! pick fields by key and give them a header.

mod error;

pub use error::{ExportError, ExportResult};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// One exported column: which field, under which header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportColumn {
    pub key: String,
    pub header: String,
}

impl ExportColumn {
    pub fn new(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    /// Tab-separated, for pasting into a spreadsheet.
    Tsv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Tsv => "tsv",
        }
    }

    pub fn render<T: Serialize>(&self, rows: &[T], columns: &[ExportColumn]) -> ExportResult<String> {
        match self {
            ExportFormat::Csv => to_csv(rows, columns),
            ExportFormat::Json => to_json(rows),
            ExportFormat::Tsv => to_tsv(rows, columns),
        }
    }
}

fn ensure_rows<T>(rows: &[T], what: &str) -> ExportResult<()> {
    if rows.is_empty() {
        warn!(format = what, "no rows to export");
        return Err(ExportError::Empty);
    }
    Ok(())
}

/// Cell text for one field. Missing and null are empty; strings are raw;
/// anything else is its JSON text.
fn cell(record: &Value, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn records<T: Serialize>(rows: &[T]) -> ExportResult<Vec<Value>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| match serde_json::to_value(row)? {
            record @ Value::Object(_) => Ok(record),
            _ => Err(ExportError::NotARecord(index)),
        })
        .collect()
}

/// CSV with a header row. Fields holding a comma, quote or line break are
/// quoted with embedded quotes doubled; lines end in `\n`.
pub fn to_csv<T: Serialize>(rows: &[T], columns: &[ExportColumn]) -> ExportResult<String> {
    ensure_rows(rows, "csv")?;
    let records = records(rows)?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.header.as_str()))?;
    for record in &records {
        writer.write_record(columns.iter().map(|c| cell(record, &c.key)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| ExportError::Io(e.to_string()))?;
    debug!(rows = records.len(), columns = columns.len(), "csv export rendered");
    Ok(text)
}

/// Pretty-printed JSON array of the rows as they serialize.
pub fn to_json<T: Serialize>(rows: &[T]) -> ExportResult<String> {
    ensure_rows(rows, "json")?;
    let text = serde_json::to_string_pretty(rows)?;
    debug!(rows = rows.len(), "json export rendered");
    Ok(text)
}

/// Tab-separated text with a header row, no quoting.
pub fn to_tsv<T: Serialize>(rows: &[T], columns: &[ExportColumn]) -> ExportResult<String> {
    ensure_rows(rows, "tsv")?;
    let records = records(rows)?;

    let header = columns
        .iter()
        .map(|c| c.header.as_str())
        .collect::<Vec<_>>()
        .join("\t");
    let mut lines = vec![header];
    for record in &records {
        let line = columns
            .iter()
            .map(|c| cell(record, &c.key))
            .collect::<Vec<_>>()
            .join("\t");
        lines.push(line);
    }
    debug!(rows = records.len(), columns = columns.len(), "tsv export rendered");
    Ok(lines.join("\n"))
}
