// Workbook reading.
//
// CSV files become a single sheet named after the file stem; Excel files are
// read sheet by sheet through calamine. Every sheet is turned into header-keyed
// rows where a missing cell is `Value::Empty`, so downstream code never sees
// ragged records.
use crate::error::{AppError, Result};
use crate::types::{RawRow, Value};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// The auxiliary account-manager sheet, if the workbook has one.
    pub fn am_sheet(&self) -> Option<&Sheet> {
        self.sheets.iter().find(|s| is_am_sheet(&s.name))
    }

    /// Sheets that carry campaign data, i.e. everything except the AM sheet.
    pub fn data_sheet_names(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .filter(|s| !is_am_sheet(&s.name))
            .map(|s| s.name.as_str())
            .collect()
    }
}

pub fn is_am_sheet(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("am")
}

pub fn load_workbook(path: &Path) -> Result<Workbook> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let sheets = match ext.as_str() {
        "csv" => vec![load_csv_sheet(path)?],
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_excel_sheets(path)?,
        _ => return Err(AppError::UnsupportedFormat(ext)),
    };
    info!(
        "Found {} {} in the workbook",
        sheets.len(),
        if sheets.len() == 1 { "sheet" } else { "sheets" }
    );
    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
    })
}

fn parse_failure(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::WorkbookParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn load_csv_sheet(path: &Path) -> Result<Sheet> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| parse_failure(path, e))?;

    let headers = dedupe_headers(
        rdr.headers()
            .map_err(|e| parse_failure(path, e))?
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );

    let mut grid = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| parse_failure(path, e))?;
        grid.push(record.iter().map(csv_cell).collect::<Vec<_>>());
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    debug!("Read {} records from {}", grid.len(), path.display());
    Ok(Sheet {
        rows: rows_from_grid(&headers, grid),
        name,
        headers,
    })
}

fn load_excel_sheets(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| parse_failure(path, e))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| parse_failure(path, e))?;
        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(first) => dedupe_headers(first.iter().map(|c| excel_cell(c).to_cell()).collect()),
            None => Vec::new(),
        };
        let grid: Vec<Vec<Value>> = rows.map(|r| r.iter().map(excel_cell).collect()).collect();
        debug!("Read {} records from sheet \"{}\"", grid.len(), name);
        sheets.push(Sheet {
            rows: rows_from_grid(&headers, grid),
            name,
            headers,
        });
    }
    Ok(sheets)
}

/// CSV cells that read as plain numbers are typed as numbers, the way a
/// spreadsheet would open the file.
fn csv_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Empty;
    }
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(raw.to_string()),
    }
}

fn excel_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) if s.is_empty() => Value::Empty,
        Data::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Blank headers become `__EMPTY`, repeated headers get a `_1`, `_2`... suffix.
/// A suffixed name never collides with a header that already exists.
fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let bases: Vec<String> = raw
        .into_iter()
        .map(|h| {
            if h.trim().is_empty() {
                "__EMPTY".to_string()
            } else {
                h
            }
        })
        .collect();
    let taken: HashSet<String> = bases.iter().cloned().collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();

    bases
        .into_iter()
        .map(|base| {
            if used.insert(base.clone()) {
                return base;
            }
            let counter = counters.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{}_{}", base, counter);
                if !taken.contains(&candidate) && used.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

fn rows_from_grid(headers: &[String], grid: Vec<Vec<Value>>) -> Vec<RawRow> {
    grid.into_iter()
        .map(|cells| {
            let mut cells = cells.into_iter();
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn csv_becomes_single_sheet_with_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campaigns.csv");
        fs::write(
            &path,
            "client_name,unique_sent_count,note\nAcme,100,first\nBeta,,\n",
        )
        .unwrap();

        let wb = load_workbook(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["campaigns"]);
        let sheet = wb.sheet("campaigns").unwrap();
        assert_eq!(sheet.headers, vec!["client_name", "unique_sent_count", "note"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["unique_sent_count"], Value::Number(100.0));
        assert_eq!(sheet.rows[0]["client_name"], Value::Text("Acme".into()));
        assert_eq!(sheet.rows[1]["note"], Value::Empty);
    }

    #[test]
    fn short_records_are_padded_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "a,b,c\n1\n").unwrap();

        let wb = load_workbook(&path).unwrap();
        let row = &wb.sheets[0].rows[0];
        assert_eq!(row.len(), 3);
        assert_eq!(row["c"], Value::Empty);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = load_workbook(Path::new("report.pdf")).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(ext) if ext == "pdf"));
    }

    #[test]
    fn missing_file_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_workbook(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, AppError::WorkbookParse { .. }));
    }

    #[test]
    fn duplicate_and_blank_headers_are_renamed() {
        let headers = dedupe_headers(vec!["a".into(), "".into(), "a".into(), " ".into()]);
        assert_eq!(headers, vec!["a", "__EMPTY", "a_1", "__EMPTY_1"]);

        let headers = dedupe_headers(vec!["a".into(), "a".into(), "a_1".into()]);
        assert_eq!(headers, vec!["a", "a_2", "a_1"]);

        let headers = dedupe_headers(vec!["a_1".into(), "a".into(), "a".into(), "a_1".into()]);
        assert_eq!(headers, vec!["a_1", "a", "a_2", "a_1_1"]);
    }

    #[test]
    fn suffixed_header_does_not_shadow_an_existing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clash.csv");
        fs::write(&path, "a,a,a_1\n1,2,3\n").unwrap();

        let wb = load_workbook(&path).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.headers, vec!["a", "a_2", "a_1"]);
        let row = &sheet.rows[0];
        assert_eq!(row.len(), 3);
        assert_eq!(row["a"], Value::Number(1.0));
        assert_eq!(row["a_2"], Value::Number(2.0));
        assert_eq!(row["a_1"], Value::Number(3.0));
    }

    #[test]
    fn am_sheet_match_ignores_case_and_whitespace() {
        assert!(is_am_sheet(" am "));
        assert!(is_am_sheet("AM"));
        assert!(!is_am_sheet("AMER"));
    }
}
