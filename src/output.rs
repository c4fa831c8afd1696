// Export building, file writers and terminal previews.
//
// Export rows are heterogeneous (detail rows, aggregates and the executive
// block have different columns), so they are collected into an `ExportTable`
// whose header is the union of every record's keys in first-seen order.
use crate::aggregate::{aggregate, sort_by_client, totals, with_client_summaries, GroupBy};
use crate::error::Result;
use crate::executive::evaluate_executive;
use crate::normalize::Dataset;
use crate::schema::{ColumnRole, Schema};
use crate::types::{
    BaseMetric, ExecutiveRow, Flag, Row, RowKind, TargetRecord, Value, NO_POSITIVE_REPLY,
};
use crate::util::{format_column_name, format_grouped, format_percent, format_plain};
use chrono::NaiveDate;
use clap::ValueEnum;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

pub const EXPORT_FILE: &str = "workbook_summary.csv";

/// Columns that only make sense next to account-manager data.
pub const AM_COLUMNS: [&str; 4] = ["AM", "Target", "Target %", "Weekend sendout"];

const RATIO_COLUMNS: [&str; 3] = ["prr_vs_rr", "rr", "bounce_rate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ViewKind {
    Detail,
    #[default]
    Summary,
}

pub type Record = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    /// Column holding client labels; never number-formatted in previews.
    pub label_column: Option<String>,
}

impl ExportTable {
    pub fn push(&mut self, record: Record) {
        for key in record.keys() {
            if !self.headers.contains(key) {
                self.headers.push(key.clone());
            }
        }
        self.records.push(record);
    }

    pub fn any_record_has(&self, column: &str) -> bool {
        self.records.iter().any(|r| r.contains_key(column))
    }

    pub fn strip_columns(&mut self, columns: &[&str]) {
        self.headers.retain(|h| !columns.contains(&h.as_str()));
        for record in &mut self.records {
            record.retain(|k, _| !columns.contains(&k.as_str()));
        }
    }

    /// Cells aligned to `headers`; keys a record does not carry are blank.
    pub fn aligned(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        self.records.iter().map(move |r| {
            self.headers
                .iter()
                .map(|h| r.get(h).map(String::as_str).unwrap_or(""))
                .collect()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn cell_for(row: &Row, schema: &Schema, header: &str) -> Option<String> {
    match schema.role(header) {
        Some(ColumnRole::Client) => Some(match row.kind {
            RowKind::Summary => row.client_key().to_string(),
            RowKind::Detail => row.client.clone().unwrap_or_default(),
        }),
        Some(ColumnRole::Metric(metric)) => Some(format_plain(row.base.get(metric))),
        Some(ColumnRole::Derived) => row.derived.and_then(|d| d.cell(&header.to_lowercase())),
        Some(_) => row.extra.get(header).map(Value::to_cell),
        None => match BaseMetric::from_column(header) {
            Some(metric) => Some(format_plain(row.base.get(metric))),
            None => row
                .derived
                .and_then(|d| d.cell(header))
                .or_else(|| row.extra.get(header).map(Value::to_cell)),
        },
    }
}

pub fn row_record(row: &Row, schema: &Schema, headers: &[String]) -> Record {
    headers
        .iter()
        .filter_map(|h| cell_for(row, schema, h).map(|cell| (h.clone(), cell)))
        .collect()
}

pub fn executive_record(row: &ExecutiveRow, client_header: &str) -> Record {
    let d = &row.derived;
    let b = &row.base;
    [
        (client_header, row.client_name.clone()),
        ("sent_count", format_plain(b.sent_count)),
        ("unique_sent_count", format_plain(b.unique_sent_count)),
        ("Target", row.target.map(format_plain).unwrap_or_default()),
        ("Target %", row.target_percent_label()),
        ("AM", row.account_manager.clone()),
        ("Weekend sendout", row.weekend_sendout.clone()),
        ("positive_reply_count", format_plain(b.positive_reply_count)),
        ("unique_leads_per_positive", d.unique_leads_per_positive.to_cell()),
        ("prr_vs_rr", format_plain(d.prr_vs_rr)),
        ("reply_count", format_plain(b.reply_count)),
        ("rr", format_plain(d.rr)),
        ("bounce_count", format_plain(b.bounce_count)),
        ("bounce_rate", format_plain(d.bounce_rate)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Everything needed to decide which rows end up in the export file.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub view: ViewKind,
    /// Rows currently shown, i.e. after the client filter.
    pub filtered: &'a [Row],
    pub dataset: &'a Dataset,
    pub selected_client: Option<&'a str>,
    pub targets: Option<&'a [TargetRecord]>,
    pub reference_date: NaiveDate,
    pub include_client_summaries: bool,
}

/// Executive rows over the whole dataset, when target data exists.
pub fn executive_rows(
    dataset: &Dataset,
    targets: Option<&[TargetRecord]>,
    reference_date: NaiveDate,
) -> Vec<ExecutiveRow> {
    match targets {
        Some(targets) if dataset.schema.has_client() => {
            let aggregates = aggregate(&dataset.rows, &dataset.schema, GroupBy::Client);
            evaluate_executive(&aggregates, targets, reference_date)
        }
        _ => Vec::new(),
    }
}

pub fn build_export_rows(req: &ExportRequest) -> ExportTable {
    let schema = &req.dataset.schema;
    let mut table = ExportTable {
        label_column: schema.client_field().map(str::to_string),
        ..ExportTable::default()
    };

    match req.view {
        ViewKind::Detail => {
            let mut rows: Vec<Row> = req
                .filtered
                .iter()
                .filter(|r| r.base.unique_sent_count > 1.0 && !r.is_summary())
                .cloned()
                .collect();
            sort_by_client(&mut rows);
            if req.include_client_summaries {
                rows = with_client_summaries(&rows, schema);
            }
            let headers = schema.detail_headers();
            for row in &rows {
                table.push(row_record(row, schema, &headers));
            }
        }
        ViewKind::Summary => {
            let mut aggregates = aggregate(req.filtered, schema, GroupBy::Client);
            sort_by_client(&mut aggregates);
            let headers = schema.summary_headers();
            for row in &aggregates {
                table.push(row_record(row, schema, &headers));
            }
            if req.selected_client.is_none() {
                let client_header = schema.client_field().unwrap_or("client_name");
                for row in executive_rows(req.dataset, req.targets, req.reference_date) {
                    table.push(executive_record(&row, client_header));
                }
            }
        }
    }

    if !table.any_record_has("AM") {
        table.strip_columns(&AM_COLUMNS);
    }
    table
}

pub fn write_csv(path: &Path, table: &ExportTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&table.headers)?;
    for cells in table.aligned() {
        wtr.write_record(cells)?;
    }
    wtr.flush()?;
    info!("Wrote {} rows to {}", table.records.len(), path.display());
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Display form of an exported cell.
pub fn format_metric(column: &str, cell: &str) -> String {
    if cell == NO_POSITIVE_REPLY {
        return "No positive reply".to_string();
    }
    let Ok(n) = cell.parse::<f64>() else {
        return cell.to_string();
    };
    if RATIO_COLUMNS.contains(&column) {
        format_percent(n)
    } else if column == "unique_leads_per_positive" {
        format!("{:.2}", n)
    } else {
        format_grouped(n)
    }
}

fn metric_description(column: &str) -> Option<&'static str> {
    match column {
        "prr_vs_rr" => Some("Positive Reply Count / Reply Count"),
        "rr" => Some("Reply Count / Unique Sent Count"),
        "bounce_rate" => Some("Bounce Count / Unique Sent Count"),
        "unique_leads_per_positive" => Some("Unique Sent Count / Positive Reply Count"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryCard {
    pub key: String,
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryCards {
    pub records: usize,
    pub cards: Vec<SummaryCard>,
}

/// Totals over the filtered rows, one card per summed or derived column.
pub fn summary_cards(rows: &[Row], schema: &Schema) -> Option<SummaryCards> {
    let total = totals(rows, schema)?;
    let cards = schema
        .summary_headers()
        .into_iter()
        .filter(|h| schema.role(h) != Some(ColumnRole::Client))
        .filter_map(|h| {
            let cell = cell_for(&total, schema, &h)?;
            Some(SummaryCard {
                label: format_column_name(&h),
                value: format_metric(&h, &cell),
                description: metric_description(&h),
                key: h,
            })
        })
        .collect();
    Some(SummaryCards {
        records: rows.iter().filter(|r| !r.is_summary()).count(),
        cards,
    })
}

pub fn preview_table(table: &ExportTable, max_rows: usize) {
    if table.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(table.headers.iter().map(|h| format_column_name(h)));
    for cells in table.aligned().take(max_rows) {
        builder.push_record(table.headers.iter().zip(cells).map(|(h, cell)| {
            if table.label_column.as_deref() == Some(h.as_str()) {
                cell.to_string()
            } else {
                format_metric(h, cell)
            }
        }));
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
    if table.records.len() > max_rows {
        println!("({} more rows not shown)\n", table.records.len() - max_rows);
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct ExecutivePreviewRow {
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Sent")]
    pub sent: String,
    #[tabled(rename = "Unique Sent")]
    pub unique_sent: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Target %")]
    pub target_percent: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "AM")]
    pub am: String,
    #[tabled(rename = "Weekend")]
    pub weekend: String,
    #[tabled(rename = "Positive")]
    pub positive: String,
    #[tabled(rename = "Unique sent/positives")]
    pub leads_per_positive: String,
    #[tabled(rename = "PRR")]
    pub prr: String,
    #[tabled(rename = "Replies")]
    pub replies: String,
    #[tabled(rename = "RR")]
    pub rr: String,
    #[tabled(rename = "Bounce")]
    pub bounce: String,
    #[tabled(rename = "Bounce %")]
    pub bounce_rate: String,
}

impl From<&ExecutiveRow> for ExecutivePreviewRow {
    fn from(row: &ExecutiveRow) -> Self {
        let b = &row.base;
        let d = &row.derived;
        ExecutivePreviewRow {
            client: row.client_name.clone(),
            sent: format_grouped(b.sent_count),
            unique_sent: format_grouped(b.unique_sent_count),
            target: row.target.map(format_grouped).unwrap_or_default(),
            target_percent: row.target_percent_label(),
            status: match row.flag {
                Flag::Red => "RED".to_string(),
                Flag::Green => "OK".to_string(),
            },
            am: row.account_manager.clone(),
            weekend: row.weekend_sendout.clone(),
            positive: format_grouped(b.positive_reply_count),
            leads_per_positive: format_metric(
                "unique_leads_per_positive",
                &d.unique_leads_per_positive.to_cell(),
            ),
            prr: format_percent(d.prr_vs_rr),
            replies: format_grouped(b.reply_count),
            rr: format_percent(d.rr),
            bounce: format_grouped(b.bounce_count),
            bounce_rate: format_percent(d.bounce_rate),
        }
    }
}

pub fn preview_executive(rows: &[ExecutiveRow]) {
    if rows.is_empty() {
        println!("(no clients with sends)\n");
        return;
    }
    let preview: Vec<ExecutivePreviewRow> = rows.iter().map(ExecutivePreviewRow::from).collect();
    let table_str = Table::new(preview).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
    println!("Target %: red below/above the day's thresholds. AM and Weekend come from the AM sheet.\n");
}
