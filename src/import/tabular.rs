//! Tabular file parsing — spreadsheets via calamine, CSV via a small
//! RFC 4180 reader.
//!
//! Column headers come from row 1, data rows from row 2 onward. Fully
//! empty rows are dropped. Cells are coerced to strings: dates become
//! ISO 8601, floats lose a trailing `.0`, formula cells yield their
//! cached result.

use std::io::Cursor;

use calamine::{Data, Reader};

use crate::error::ImportError;
use crate::import::types::ImportFormat;

/// A parsed tabular file.
#[derive(Debug, Clone, Default)]
pub struct TabularFile {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularFile {
    /// Index of a column header, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value by row slice and column name; `None` when the
    /// column is absent or the cell blank.
    pub fn cell<'a>(&self, row: &'a [String], column: &str) -> Option<&'a str> {
        let idx = self.column_index(column)?;
        let value = row.get(idx)?.trim();
        if value.is_empty() { None } else { Some(value) }
    }
}

/// Parse an uploaded file.
pub fn parse_file(bytes: &[u8], format: ImportFormat) -> Result<TabularFile, ImportError> {
    match format {
        ImportFormat::Csv => parse_csv(bytes),
        ImportFormat::Xlsx | ImportFormat::Xls => parse_spreadsheet(bytes),
    }
}

// ── Spreadsheets ────────────────────────────────────────────────────

fn parse_spreadsheet(bytes: &[u8]) -> Result<TabularFile, ImportError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| ImportError::Parse(format!("Failed to open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::Parse("Workbook has no sheets".into()))?
        .map_err(|e| ImportError::Parse(format!("Failed to read first sheet: {e}")))?;

    let mut rows_iter = range.rows();
    let columns = match rows_iter.next() {
        Some(header) => header.iter().map(|c| coerce_cell(c).trim().to_string()).collect(),
        None => return Ok(TabularFile::default()),
    };

    let mut rows = Vec::new();
    for raw in rows_iter {
        let row: Vec<String> = raw.iter().map(coerce_cell).collect();
        if row.iter().any(|c| !c.trim().is_empty()) {
            rows.push(row);
        }
    }

    Ok(TabularFile { columns, rows })
}

/// Coerce one spreadsheet cell to a string.
fn coerce_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|ndt| {
                if ndt.time() == chrono::NaiveTime::MIN {
                    ndt.date().format("%Y-%m-%d").to_string()
                } else {
                    ndt.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            })
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

// ── CSV ─────────────────────────────────────────────────────────────

/// RFC 4180 reader with delimiter inference (comma or semicolon —
/// exports from French spreadsheets routinely use the latter).
fn parse_csv(bytes: &[u8]) -> Result<TabularFile, ImportError> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| ImportError::Parse(format!("CSV is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let delimiter = infer_delimiter(text);
    let mut records = read_records(text, delimiter);

    if records.is_empty() {
        return Ok(TabularFile::default());
    }

    let columns = records
        .remove(0)
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();

    let rows: Vec<Vec<String>> = records
        .into_iter()
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();

    Ok(TabularFile { columns, rows })
}

fn infer_delimiter(text: &str) -> char {
    let first_line = text.lines().next().unwrap_or_default();
    let commas = first_line.matches(',').count();
    let semicolons = first_line.matches(';').count();
    if semicolons > commas { ';' } else { ',' }
}

fn read_records(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                c if c == delimiter => {
                    record.push(std::mem::take(&mut field));
                }
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}
