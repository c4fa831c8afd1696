// Sheet extraction and row normalization.
//
// Raw sheet rows are validated (empty rows and stale summary rows dropped),
// count columns are coerced to numbers, excluded columns are removed, and the
// ratio metrics are attached. Input order is preserved throughout.
use crate::error::{AppError, Result};
use crate::loader::{is_am_sheet, Workbook};
use crate::metrics::derive_metrics;
use crate::schema::{is_excluded, is_numeric_field, ColumnRole, Schema};
use crate::types::{RawRow, Row, Value, SUMMARY_SUFFIX};
use crate::util::coerce_count;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Upper bound on rows kept across all selected sheets.
    pub max_rows: usize,
    /// Rows whose unique sent count falls below this are dropped.
    pub min_unique_sent: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            max_rows: 1_000_000,
            min_unique_sent: 1.0,
        }
    }
}

/// Normalized rows of the selected sheets plus the schema they were read with.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

/// Returns `None` for rows that must not enter the pipeline.
pub fn normalize_row(raw: &RawRow, schema: &Schema) -> Option<Row> {
    if raw.values().all(Value::is_empty) {
        return None;
    }

    let mut row = Row::default();
    for (key, value) in raw {
        if is_excluded(key) {
            continue;
        }
        match schema.role(key) {
            Some(ColumnRole::Client) => {
                if value.is_empty() {
                    continue;
                }
                let client = value.to_cell();
                if matches!(value, Value::Text(_)) && client.ends_with(SUMMARY_SUFFIX) {
                    return None;
                }
                row.client = Some(client);
            }
            Some(ColumnRole::Metric(metric)) => {
                *row.base.get_mut(metric) = match value {
                    Value::Number(n) => *n,
                    Value::Text(s) => coerce_count(s),
                    Value::Empty => 0.0,
                };
            }
            Some(ColumnRole::Derived) => {}
            _ => {
                let kept = match value {
                    Value::Text(s) if is_numeric_field(key) => Value::Number(coerce_count(s)),
                    other => other.clone(),
                };
                row.extra.insert(key.clone(), kept);
            }
        }
    }
    Some(row)
}

pub fn normalize_rows(raws: &[RawRow], schema: &Schema) -> Vec<Row> {
    raws.iter().filter_map(|r| normalize_row(r, schema)).collect()
}

/// Read the selected sheets into one normalized dataset.
///
/// Sheets that are not in the workbook are skipped with a warning; the AM
/// sheet is never treated as data.
pub fn extract_sheet_data(
    workbook: &Workbook,
    selected: &[String],
    opts: &ExtractOptions,
) -> Result<Dataset> {
    if selected.is_empty() {
        return Err(AppError::NoSheetsSelected);
    }

    let mut sheets = Vec::new();
    for name in selected {
        if is_am_sheet(name) {
            debug!("Skipping AM sheet \"{}\" as a data sheet", name);
            continue;
        }
        match workbook.sheet(name) {
            Some(sheet) => sheets.push(sheet),
            None => warn!("Sheet \"{}\" not found in workbook", name),
        }
    }

    let all_raw: Vec<RawRow> = sheets.iter().flat_map(|s| s.rows.iter().cloned()).collect();
    let schema = Schema::sniff(
        sheets.iter().flat_map(|s| s.headers.iter().map(String::as_str)),
        &all_raw,
    );
    match schema.client_field() {
        Some(field) => debug!("Client column resolved to \"{}\"", field),
        None => debug!("No client column; rows will be summarized as one group"),
    }

    let mut rows: Vec<Row> = Vec::new();
    for sheet in &sheets {
        let valid = normalize_rows(&sheet.rows, &schema);
        if valid.is_empty() {
            warn!("No valid data found in sheet \"{}\"", sheet.name);
        } else {
            info!("Processed {} rows from sheet \"{}\"", valid.len(), sheet.name);
        }
        rows.extend(valid);
    }
    info!("Total rows processed from all sheets: {}", rows.len());

    if rows.len() > opts.max_rows {
        warn!(
            "Row cap reached: keeping the first {} of {} rows",
            opts.max_rows,
            rows.len()
        );
        rows.truncate(opts.max_rows);
    }

    for row in &mut rows {
        derive_metrics(row);
    }
    rows.retain(|r| r.base.unique_sent_count >= opts.min_unique_sent);

    Ok(Dataset { schema, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Sheet;
    use crate::types::BaseMetric;
    use std::path::PathBuf;

    fn raw(cells: &[(&str, Value)]) -> RawRow {
        cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn schema_for(rows: &[RawRow]) -> Schema {
        let headers: Vec<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        Schema::sniff(headers.iter().map(String::as_str), rows)
    }

    #[test]
    fn numeric_text_is_coerced_and_garbage_becomes_zero() {
        let rows = vec![raw(&[
            ("client_name", text("Acme")),
            ("unique_sent_count", text("120")),
            ("reply_count", text("lots")),
            ("open_count", text("7")),
        ])];
        let schema = schema_for(&rows);
        let row = normalize_row(&rows[0], &schema).unwrap();
        assert_eq!(row.client.as_deref(), Some("Acme"));
        assert_eq!(row.base.get(BaseMetric::UniqueSentCount), 120.0);
        assert_eq!(row.base.reply_count, 0.0);
        assert_eq!(row.extra["open_count"], Value::Number(7.0));
    }

    #[test]
    fn count_text_is_read_as_a_float_prefix() {
        let rows = vec![raw(&[
            ("client_name", text("Acme")),
            ("unique_sent_count", text("1e3")),
            ("reply_count", text("12 replies")),
            ("click_count", text("4 clicks")),
        ])];
        let schema = schema_for(&rows);
        let row = normalize_row(&rows[0], &schema).unwrap();
        assert_eq!(row.base.unique_sent_count, 1000.0);
        assert_eq!(row.base.reply_count, 12.0);
        assert_eq!(row.extra["click_count"], Value::Number(4.0));
    }

    #[test]
    fn excluded_columns_are_dropped_regardless_of_case() {
        let rows = vec![raw(&[
            ("ID", Value::Number(9.0)),
            ("User_Id", Value::Number(3.0)),
            ("campaign", text("spring")),
        ])];
        let schema = schema_for(&rows);
        let row = normalize_row(&rows[0], &schema).unwrap();
        assert_eq!(row.extra.len(), 1);
        assert_eq!(row.extra["campaign"], text("spring"));
    }

    #[test]
    fn empty_and_summary_rows_are_discarded() {
        let rows = vec![
            raw(&[("client", Value::Empty), ("reply_count", text(""))]),
            raw(&[("client", text("Acme - Summary")), ("reply_count", Value::Number(4.0))]),
            raw(&[("client", text("Acme")), ("reply_count", Value::Number(4.0))]),
        ];
        let schema = schema_for(&rows);
        let out = normalize_rows(&rows, &schema);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client.as_deref(), Some("Acme"));
    }

    #[test]
    fn rows_without_numeric_fields_pass_through() {
        let rows = vec![raw(&[("note", text("hello")), ("owner", text("kim"))])];
        let schema = schema_for(&rows);
        let row = normalize_row(&rows[0], &schema).unwrap();
        assert_eq!(row.client, None);
        assert_eq!(row.extra.keys().collect::<Vec<_>>(), vec!["note", "owner"]);
        assert_eq!(row.base, Default::default());
    }

    #[test]
    fn source_ratio_columns_are_not_carried() {
        let rows = vec![raw(&[("client", text("A")), ("rr", Value::Number(99.0))])];
        let schema = schema_for(&rows);
        let row = normalize_row(&rows[0], &schema).unwrap();
        assert!(row.extra.get("rr").is_none());
    }

    fn workbook(sheets: Vec<Sheet>) -> Workbook {
        Workbook {
            path: PathBuf::from("test.xlsx"),
            sheets,
        }
    }

    fn sheet(name: &str, rows: Vec<RawRow>) -> Sheet {
        let headers = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
        Sheet {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    #[test]
    fn extraction_requires_a_selection() {
        let wb = workbook(vec![]);
        let err = extract_sheet_data(&wb, &[], &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::NoSheetsSelected));
    }

    #[test]
    fn extraction_merges_sheets_in_order_and_applies_floor() {
        let wb = workbook(vec![
            sheet(
                "week1",
                vec![
                    raw(&[("client_name", text("A")), ("unique_sent_count", Value::Number(10.0))]),
                    raw(&[("client_name", text("B")), ("unique_sent_count", Value::Number(0.0))]),
                ],
            ),
            sheet(
                "week2",
                vec![raw(&[("client_name", text("C")), ("unique_sent_count", text("5"))])],
            ),
            sheet(
                "AM",
                vec![raw(&[("client_name", text("A")), ("Target", Value::Number(10.0))])],
            ),
        ]);
        let selected = vec!["week1".to_string(), "missing".to_string(), "week2".to_string(), "AM".to_string()];
        let ds = extract_sheet_data(&wb, &selected, &ExtractOptions::default()).unwrap();
        let clients: Vec<_> = ds.rows.iter().map(|r| r.client_key().to_string()).collect();
        assert_eq!(clients, vec!["A", "C"]);
        assert!(ds.rows.iter().all(|r| r.derived.is_some()));
        assert_eq!(ds.schema.client_field(), Some("client_name"));
        assert_eq!(ds.schema.role("Target"), None);
    }

    #[test]
    fn sheet_without_client_column_lands_in_unknown() {
        use crate::aggregate::{aggregate, GroupBy};

        let wb = workbook(vec![
            sheet(
                "clients",
                vec![raw(&[("client_name", text("Acme")), ("unique_sent_count", Value::Number(10.0))])],
            ),
            sheet(
                "totals",
                vec![
                    raw(&[("unique_sent_count", Value::Number(4.0)), ("reply_count", Value::Number(1.0))]),
                    raw(&[("unique_sent_count", Value::Number(6.0)), ("reply_count", Value::Number(4.0))]),
                ],
            ),
        ]);
        let selected = vec!["clients".to_string(), "totals".to_string()];
        let ds = extract_sheet_data(&wb, &selected, &ExtractOptions::default()).unwrap();
        assert_eq!(ds.schema.client_field(), Some("client_name"));
        assert_eq!(ds.rows.len(), 3);

        let out = aggregate(&ds.rows, &ds.schema, GroupBy::Client);
        let labels: Vec<_> = out.iter().map(|r| r.client_key()).collect();
        assert_eq!(labels, vec!["Acme", "Unknown"]);
        assert_eq!(out[1].base.unique_sent_count, 10.0);
        assert_eq!(out[1].base.reply_count, 5.0);
        assert_eq!(out[1].derived.map(|d| d.rr), Some(50.0));
    }

    #[test]
    fn extraction_honours_row_cap() {
        let rows = (0..5)
            .map(|i| raw(&[("client", text(&format!("c{i}"))), ("unique_sent_count", Value::Number(2.0))]))
            .collect();
        let wb = workbook(vec![sheet("data", rows)]);
        let opts = ExtractOptions {
            max_rows: 3,
            min_unique_sent: 1.0,
        };
        let ds = extract_sheet_data(&wb, &["data".to_string()], &opts).unwrap();
        assert_eq!(ds.rows.len(), 3);
    }
}
