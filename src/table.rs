//! Reading and writing `;`-delimited product tables.
//!
//! A table is loaded whole into memory. Row-level problems (an unreadable row, a
//! malformed number) are counted and skipped or coerced; table-level problems (file
//! missing, bad encoding) are errors. Writes go to a sibling temporary file that is
//! renamed into place, so a failed stage never leaves a half-written output.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::pipeline::price::coerce_price;
use crate::types::ProductRecord;

/// Text encoding of an input table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum InputEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl InputEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            InputEncoding::Utf8 => "UTF-8",
            InputEncoding::Latin1 => "Latin-1",
        }
    }

    fn decode(&self, bytes: Vec<u8>, path: &str) -> Result<String> {
        match self {
            InputEncoding::Utf8 => String::from_utf8(bytes).map_err(|_| PipelineError::Encoding {
                path: path.to_string(),
                encoding: self.label().to_string(),
            }),
            // every Latin-1 byte is the Unicode code point of the same value
            InputEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Counters gathered while loading a table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStats {
    pub rows: usize,
    /// Rows the CSV reader could not decode; they are skipped
    pub unreadable_rows: usize,
    /// Rows with more cells than the header; the surplus cells are dropped
    pub overlong_rows: usize,
    /// Non-empty numeric cells that could not be parsed, per column
    pub malformed: BTreeMap<String, usize>,
}

impl LoadStats {
    pub fn malformed_in(&self, column: &str) -> usize {
        self.malformed.get(column).copied().unwrap_or(0)
    }
}

/// An ordered header list plus ordered records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductTable {
    columns: Vec<String>,
    pub records: Vec<ProductRecord>,
}

impl ProductTable {
    pub fn new(columns: &[&str], records: Vec<ProductRecord>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Append a column to the header if it is not there yet.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn require_columns(&self, required: &[&str], source: &str) -> Result<()> {
        match required.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(PipelineError::MissingColumn {
                column: missing.to_string(),
                path: source.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Load a table from disk. A missing or undecodable file is an error.
    pub fn load(path: &Path, encoding: InputEncoding) -> Result<(Self, LoadStats)> {
        let label = path.display().to_string();
        let bytes = fs::read(path).map_err(|e| {
            PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", label, e),
            ))
        })?;
        let text = encoding.decode(bytes, &label)?;
        let (table, stats) = Self::parse(&text, &label)?;
        info!(
            path = %label,
            rows = stats.rows,
            unreadable = stats.unreadable_rows,
            overlong = stats.overlong_rows,
            "Loaded table"
        );
        Ok((table, stats))
    }

    /// Parse table text; `source` only labels log lines and errors.
    pub fn parse(text: &str, source: &str) -> Result<(Self, LoadStats)> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns = header_keys(reader.headers()?);

        let mut stats = LoadStats::default();
        let mut records = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            // header is line 1
            let line = idx + 2;
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(source, line, "Skipping unreadable row: {}", e);
                    stats.unreadable_rows += 1;
                    continue;
                }
            };
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            if row.len() > columns.len() {
                warn!(
                    source,
                    line,
                    cells = row.len(),
                    columns = columns.len(),
                    "Row is wider than the header; surplus cells dropped"
                );
                stats.overlong_rows += 1;
            }
            records.push(record_from_row(&columns, &row, &mut stats, source, line));
        }

        stats.rows = records.len();
        Ok((Self { columns, records }, stats))
    }

    /// Write the table with minimal quoting.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.save_with(path, QuoteStyle::Necessary)
    }

    /// Write the table quoting every field.
    pub fn save_quoted(&self, path: &Path) -> Result<()> {
        self.save_with(path, QuoteStyle::Always)
    }

    fn save_with(&self, path: &Path, quote: QuoteStyle) -> Result<()> {
        let rows = self
            .records
            .iter()
            .map(|r| self.columns.iter().map(|c| r.field(c)).collect::<Vec<_>>());
        write_rows(path, &self.columns, rows, quote)?;
        info!(path = %path.display(), rows = self.records.len(), "Saved table");
        Ok(())
    }
}

/// One key per header cell, by position. Blank headers become `Unnamed: <index>` and
/// repeated headers get a `.1`, `.2`, ... suffix, so no cell is ever shifted.
fn header_keys(headers: &StringRecord) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let header = header.trim();
        let base = if header.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            header.to_string()
        };
        let mut key = base.clone();
        let mut n = 1;
        while keys.contains(&key) {
            key = format!("{}.{}", base, n);
            n += 1;
        }
        keys.push(key);
    }
    keys
}

fn record_from_row(
    columns: &[String],
    row: &StringRecord,
    stats: &mut LoadStats,
    source: &str,
    line: usize,
) -> ProductRecord {
    let mut record = ProductRecord::default();

    for (column, raw) in columns.iter().zip(row.iter().chain(std::iter::repeat(""))) {
        let value = raw.trim();
        match column.as_str() {
            COL_NAME => record.name = value.to_string(),
            COL_PRICE => record.price = number_cell(column, value, stats, source, line),
            COL_UNIT_PRICE => record.unit_price = number_cell(column, value, stats, source, line),
            COL_QUANTITY => record.quantity = number_cell(column, value, stats, source, line),
            COL_PAGE => record.page = integer_cell(column, value, stats, source, line),
            COL_CLUSTER => {
                record.cluster =
                    integer_cell(column, value, stats, source, line).map(|v| v as usize)
            }
            COL_BRAND => record.brand = text_cell(value),
            COL_TYPE => record.product_type = text_cell(value),
            other => {
                record.extra.insert(other.to_string(), raw.to_string());
            }
        }
    }
    record
}

fn number_cell(
    column: &str,
    value: &str,
    stats: &mut LoadStats,
    source: &str,
    line: usize,
) -> Option<f64> {
    let parsed = coerce_price(value);
    if parsed.is_none() && !value.is_empty() {
        debug!(source, line, column, value, "Malformed number coerced to missing");
        *stats.malformed.entry(column.to_string()).or_default() += 1;
    }
    parsed
}

/// Whole non-negative numbers, including the `2.0` form written for integer columns
/// that held a missing value. Anything else counts as malformed.
fn integer_cell(
    column: &str,
    value: &str,
    stats: &mut LoadStats,
    source: &str,
    line: usize,
) -> Option<u32> {
    if value.is_empty() {
        return None;
    }
    let parsed = value.parse::<u32>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64 && v.fract() == 0.0)
            .map(|v| v as u32)
    });
    if parsed.is_none() {
        debug!(source, line, column, value, "Malformed integer coerced to missing");
        *stats.malformed.entry(column.to_string()).or_default() += 1;
    }
    parsed
}

fn text_cell(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Write `;`-delimited rows to `path` atomically.
pub fn write_rows<I, R>(path: &Path, headers: &[String], rows: I, quote: QuoteStyle) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    write_atomic(path, |partial| {
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote_style(quote)
            .from_path(partial)?;
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Run `write` against a hidden sibling of `path`, then rename it into place.
///
/// Parent directories are created first. On failure the sibling is removed and
/// `path` is left untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);

    match write(&partial) {
        Ok(()) => {
            fs::rename(&partial, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "table".to_string());
    path.with_file_name(format!(".{}.partial", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coerces_numbers() {
        let text = "name;price;page\n\
                    \"Douwe Egberts Koffie\";\"3,99\";1\n\
                    Jumbo Thee;gratis;2\n\
                    Lavazza;;x\n";
        let (table, stats) = ProductTable::parse(text, "test").unwrap();

        assert_eq!(table.columns(), &["name", "price", "page"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.records[0].price, Some(3.99));
        assert_eq!(table.records[0].page, Some(1));
        assert_eq!(table.records[1].price, None);
        assert_eq!(table.records[2].page, None);
        // the empty cell is missing, not malformed
        assert_eq!(stats.malformed_in("price"), 1);
    }

    #[test]
    fn test_parse_keeps_unknown_columns() {
        let text = "name;price;brand;shelf\nIllé;2.5;Illé;A3\n";
        let (table, _) = ProductTable::parse(text, "test").unwrap();
        let record = &table.records[0];
        assert_eq!(record.brand.as_deref(), Some("Illé"));
        assert_eq!(record.extra.get("shelf").map(String::as_str), Some("A3"));
        assert_eq!(record.field("shelf"), "A3");
    }

    #[test]
    fn test_parse_short_rows_and_bom() {
        let text = "\u{feff}name;price;quantity\nPickwick;1,99\n;;\n";
        let (table, _) = ProductTable::parse(text, "test").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns()[0], "name");
        assert_eq!(table.records[0].quantity, None);
    }

    #[test]
    fn test_header_only_table() {
        let (table, stats) = ProductTable::parse("name;price;page\n", "test").unwrap();
        assert!(table.is_empty());
        assert_eq!(stats.rows, 0);
    }

    #[test]
    fn test_require_columns() {
        let table = ProductTable::new(&["name", "price"], vec![]);
        assert!(table.require_columns(&["name", "price"], "t").is_ok());
        let err = table.require_columns(&["name", "unit_price"], "t").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "unit_price"));
    }

    #[test]
    fn test_latin1_decoding() {
        let bytes = vec![b'c', b'a', b'f', 0xE9];
        let text = InputEncoding::Latin1.decode(bytes.clone(), "t").unwrap();
        assert_eq!(text, "café");
        assert!(InputEncoding::Utf8.decode(bytes, "t").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip_with_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("clean.csv");

        let mut table = ProductTable::new(
            &["name", "price", "page"],
            vec![ProductRecord::new("Koffie; extra sterk", Some(3.5))],
        );
        table.records[0].page = Some(4);
        table.save(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("name;price;page\n"));
        assert!(written.contains("\"Koffie; extra sterk\";3.5;4"));
        assert!(!partial_path(&path).exists());

        let (loaded, _) = ProductTable::load(&path, InputEncoding::Utf8).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_blank_header_keeps_cells_aligned() {
        let (table, stats) =
            ProductTable::parse(";name;price\n0;Lavazza Oro;3,99\n", "test").unwrap();
        assert_eq!(table.columns(), &["Unnamed: 0", "name", "price"]);
        let record = &table.records[0];
        assert_eq!(record.name, "Lavazza Oro");
        assert_eq!(record.price, Some(3.99));
        assert_eq!(record.field("Unnamed: 0"), "0");
        assert!(stats.malformed.is_empty());

        let (table, _) = ProductTable::parse("name;;price\nLavazza Oro;x;3,99\n", "test").unwrap();
        assert_eq!(table.records[0].price, Some(3.99));
        assert_eq!(table.records[0].field("Unnamed: 1"), "x");
    }

    #[test]
    fn test_repeated_headers_get_suffixes() {
        let (table, _) = ProductTable::parse("name;shelf;shelf\nIlly;A1;B2\n", "test").unwrap();
        assert_eq!(table.columns(), &["name", "shelf", "shelf.1"]);
        assert_eq!(table.records[0].field("shelf.1"), "B2");
    }

    #[test]
    fn test_overlong_rows_are_counted() {
        let text = "name;price\nPickwick;1,99;extra;cells\nIlly;6,49\n";
        let (table, stats) = ProductTable::parse(text, "test").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(stats.overlong_rows, 1);
        assert_eq!(table.records[0].price, Some(1.99));
    }

    #[test]
    fn test_integer_columns_accept_whole_floats() {
        let text = "name;price;page;cluster\n\
                    Lavazza;3,99;2.0;1\n\
                    Illy;6,49;2.5;x\n\
                    Jumbo;1,99;;\n";
        let (table, stats) = ProductTable::parse(text, "test").unwrap();
        assert_eq!(table.records[0].page, Some(2));
        assert_eq!(table.records[0].field(COL_PAGE), "2");
        assert_eq!(table.records[0].cluster, Some(1));
        assert_eq!(table.records[1].page, None);
        assert_eq!(table.records[2].page, None);
        assert_eq!(stats.malformed_in("page"), 1);
        assert_eq!(stats.malformed_in("cluster"), 1);
    }

    #[test]
    fn test_failed_atomic_write_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        fs::write(&path, "old").unwrap();

        let result = write_atomic(&path, |partial| {
            fs::write(partial, "new")?;
            Err(PipelineError::InsufficientData("stop".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ProductTable::load(Path::new("no/such/table.csv"), InputEncoding::Utf8);
        assert!(matches!(err, Err(PipelineError::Io(_))));
    }
}
