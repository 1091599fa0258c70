// src/process/mod.rs
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use serde_json::{Number, Value};
use std::{io::Read, path::Path};
use tracing::{debug, trace};

use crate::store::Document;

pub mod reshape;
pub mod team_name;

pub use team_name::extract_team_name;

/// Cells that read back as null, whatever the column type.
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "N/A", "NA", "n/a", "NULL", "null", "NaN", "nan", "-NaN", "-nan", "None", "<NA>",
];

/// How cell text becomes a document value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellMode {
    /// Per-column type inference: integer, double, boolean or string, with
    /// null markers mapped to null.
    Infer,
    /// Every cell stays a string, empty cells included.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Double,
    Boolean,
    Text,
}

/// A parsed CSV sheet: its header row plus one document per data row.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    /// Column names in file order, duplicates disambiguated as `name.1`, `name.2`, ...
    pub headers: Vec<String>,
    pub records: Vec<Document>,
}

impl CsvTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows as a JSON array, in file order.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .cloned()
                .map(Value::Object)
                .collect(),
        )
    }
}

/// Read a CSV file with a header row into a [`CsvTable`].
#[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
pub fn read_csv<P: AsRef<Path>>(path: P, mode: CellMode) -> Result<CsvTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;
    parse_csv(file, mode).with_context(|| format!("failed to parse CSV file {}", path.display()))
}

/// Parse CSV text from any reader. Short rows are padded with nulls; rows
/// with more fields than the header are an error.
pub fn parse_csv<R: Read>(reader: R, mode: CellMode) -> Result<CsvTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let raw_headers: Vec<String> = rdr
        .headers()
        .context("reading CSV header row")?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        bail!("no header row; the file is empty");
    }
    let headers = dedupe_headers(raw_headers);

    let mut cells: Vec<Vec<String>> = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        if record.len() > headers.len() {
            bail!(
                "record {} has {} fields, header has {}",
                idx,
                record.len(),
                headers.len()
            );
        }
        // a single empty field is how the reader reports a whitespace-only line
        if headers.len() > 1
            && record.len() == 1
            && record.get(0).map_or(false, |c| c.trim().is_empty())
        {
            trace!(record = idx, "skipping blank line");
            continue;
        }
        cells.push(record.iter().map(str::to_string).collect());
    }

    let kinds: Vec<ColumnKind> = match mode {
        CellMode::Text => vec![ColumnKind::Text; headers.len()],
        CellMode::Infer => (0..headers.len())
            .map(|col| infer_column_kind(cells.iter().map(|row| row.get(col).map(String::as_str))))
            .collect(),
    };

    let records = cells
        .into_iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let value = match (mode, row.get(col)) {
                        (CellMode::Text, Some(raw)) => Value::String(raw.clone()),
                        (CellMode::Text, None) => Value::String(String::new()),
                        (CellMode::Infer, Some(raw)) => convert_cell(raw, kinds[col]),
                        (CellMode::Infer, None) => Value::Null,
                    };
                    (name.clone(), value)
                })
                .collect::<Document>()
        })
        .collect::<Vec<_>>();

    debug!(columns = headers.len(), rows = records.len(), "parsed CSV");
    Ok(CsvTable { headers, records })
}

fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        if !out.contains(&name) {
            out.push(name);
            continue;
        }
        let mut n = 1;
        while out.contains(&format!("{}.{}", name, n)) {
            n += 1;
        }
        out.push(format!("{}.{}", name, n));
    }
    out
}

fn is_null_marker(raw: &str) -> bool {
    NULL_MARKERS.contains(&raw.trim())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn parse_double(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Narrowest kind every non-null cell of the column fits. An all-null column is text.
fn infer_column_kind<'a, I>(cells: I) -> ColumnKind
where
    I: Iterator<Item = Option<&'a str>>,
{
    let mut int_ok = true;
    let mut double_ok = true;
    let mut bool_ok = true;
    let mut seen = false;

    for cell in cells.flatten() {
        if is_null_marker(cell) {
            continue;
        }
        seen = true;
        int_ok &= cell.trim().parse::<i64>().is_ok();
        double_ok &= parse_double(cell).is_some();
        bool_ok &= parse_bool(cell).is_some();
        if !int_ok && !double_ok && !bool_ok {
            return ColumnKind::Text;
        }
    }

    match (seen, int_ok, double_ok, bool_ok) {
        (false, ..) => ColumnKind::Text,
        (true, true, _, _) => ColumnKind::Integer,
        (true, _, true, _) => ColumnKind::Double,
        (true, _, _, true) => ColumnKind::Boolean,
        _ => ColumnKind::Text,
    }
}

fn convert_cell(raw: &str, kind: ColumnKind) -> Value {
    if is_null_marker(raw) {
        return Value::Null;
    }
    match kind {
        ColumnKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnKind::Double => parse_double(raw)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnKind::Boolean => parse_bool(raw).map(Value::Bool).unwrap_or(Value::Null),
        ColumnKind::Text => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,ksfa_loader::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn parse(text: &str, mode: CellMode) -> CsvTable {
        parse_csv(Cursor::new(text.as_bytes()), mode).unwrap()
    }

    #[test]
    fn empty_input_has_no_header_and_is_an_error() {
        init_test_logging();
        for text in ["", "\n\n", "\u{feff}"] {
            let err = parse_csv(Cursor::new(text.as_bytes()), CellMode::Infer).unwrap_err();
            assert!(format!("{:#}", err).contains("no header row"), "input {:?}", text);
        }
        // a header with no rows is a valid, empty sheet
        let t = parse("Name,Age\n", CellMode::Infer);
        assert_eq!(t.headers, vec!["Name", "Age"]);
        assert!(t.is_empty());
    }

    #[test]
    fn infers_column_types() {
        init_test_logging();
        let table = parse(
            "Name,Age,Height,Captain,Notes\nAsha,19,1.72,True,\nRavi,,1.8,False,left foot\n",
            CellMode::Infer,
        );
        assert_eq!(table.headers, vec!["Name", "Age", "Height", "Captain", "Notes"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            Value::Object(table.records[0].clone()),
            json!({"Name": "Asha", "Age": 19, "Height": 1.72, "Captain": true, "Notes": null})
        );
        assert_eq!(table.records[1]["Age"], Value::Null);
        assert_eq!(table.records[1]["Notes"], json!("left foot"));
    }

    #[test]
    fn mixed_column_stays_text() {
        let table = parse("Jersey Number\n10\n7A\n", CellMode::Infer);
        assert_eq!(table.records[0]["Jersey Number"], json!("10"));
        assert_eq!(table.records[1]["Jersey Number"], json!("7A"));
    }

    #[test]
    fn ints_and_floats_widen_to_double() {
        let table = parse("Points\n3\n4.5\n", CellMode::Infer);
        assert_eq!(table.records[0]["Points"], json!(3.0));
        assert_eq!(table.records[1]["Points"], json!(4.5));
    }

    #[test]
    fn text_mode_keeps_strings() {
        let table = parse("id,title\n1,Derby day\n2,\n", CellMode::Text);
        assert_eq!(table.records[0]["id"], json!("1"));
        assert_eq!(table.records[1]["title"], json!(""));
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_rejected() {
        let table = parse("a,b,c\n1,2\n", CellMode::Infer);
        assert_eq!(table.records[0]["c"], Value::Null);

        let err = parse_csv(Cursor::new("a,b\n1,2,3\n".as_bytes()), CellMode::Infer);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_headers_and_bom() {
        let table = parse("\u{feff}Team,Goals,Goals\nFoo,1,2\n", CellMode::Infer);
        assert_eq!(table.headers, vec!["Team", "Goals", "Goals.1"]);
        assert_eq!(table.records[0]["Goals.1"], json!(2));
        assert!(table.has_column("Team"));
    }

    #[test]
    fn read_csv_reports_missing_file() {
        let tmp = tempdir().unwrap();
        let err = read_csv(tmp.path().join("absent.csv"), CellMode::Infer).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.csv"));
    }

    #[test]
    fn to_value_preserves_row_order() {
        let table = parse("Name\nZed\nAmy\n", CellMode::Infer);
        assert_eq!(table.to_value(), json!([{"Name": "Zed"}, {"Name": "Amy"}]));
    }
}
