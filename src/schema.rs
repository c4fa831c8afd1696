// Column-role resolution.
//
// The schema is sniffed once per dataset (the union of the selected sheets'
// headers) and every later stage asks it where the client column and the
// count columns live instead of searching the headers again.
use crate::types::{BaseMetric, RawRow, Value, DERIVED_COLUMNS};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Columns dropped on ingest regardless of case.
pub static EXCLUDED_COLUMNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "record_count",
        "id",
        "user_id",
        "ln_connection_req_pending_count",
        "ln_connection_req_accepted_count",
        "ln_connection_req_skipped_sent_msg_count",
    ])
});

/// Numeric columns that are never summed even though they survive ingest.
static UNSUMMED_COLUMNS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["total_count", "drafted_count"]));

/// Fields whose text cells are coerced to numbers on ingest.
pub const NUMERIC_FIELDS: [&str; 8] = [
    "sent_count",
    "unique_sent_count",
    "positive_reply_count",
    "reply_count",
    "bounce_count",
    "open_count",
    "unique_open_count",
    "click_count",
];

pub fn is_excluded(column: &str) -> bool {
    EXCLUDED_COLUMNS.contains(column.to_lowercase().as_str())
}

pub fn is_numeric_field(column: &str) -> bool {
    NUMERIC_FIELDS.contains(&column.to_lowercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Client,
    Metric(BaseMetric),
    /// A ratio column from the source; recomputed, never read.
    Derived,
    /// Numeric passthrough that the aggregator sums alongside the base counts.
    NumericExtra,
    Passthrough,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: IndexMap<String, ColumnRole>,
}

impl Schema {
    /// Resolve column roles from headers in first-seen order.
    ///
    /// `rows` is only used to decide whether an unknown column is numeric: it
    /// is if the first non-empty cell in that column is a number.
    pub fn sniff<'a, I>(headers: I, rows: &[RawRow]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut columns: IndexMap<String, ColumnRole> = IndexMap::new();
        let mut client_seen = false;
        let mut metrics_seen: HashSet<BaseMetric> = HashSet::new();

        for header in headers {
            if columns.contains_key(header) || is_excluded(header) {
                continue;
            }
            let lower = header.to_lowercase();
            let role = if !client_seen && lower.contains("client") {
                client_seen = true;
                ColumnRole::Client
            } else if let Some(metric) =
                BaseMetric::from_column(header).filter(|m| !metrics_seen.contains(m))
            {
                metrics_seen.insert(metric);
                ColumnRole::Metric(metric)
            } else if DERIVED_COLUMNS.contains(&lower.as_str()) {
                ColumnRole::Derived
            } else if UNSUMMED_COLUMNS.contains(lower.as_str()) {
                ColumnRole::Passthrough
            } else if is_numeric_field(header) || first_value_is_numeric(header, rows) {
                ColumnRole::NumericExtra
            } else {
                ColumnRole::Passthrough
            };
            columns.insert(header.to_string(), role);
        }
        Schema { columns }
    }

    pub fn client_field(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, role)| **role == ColumnRole::Client)
            .map(|(name, _)| name.as_str())
    }

    pub fn has_client(&self) -> bool {
        self.client_field().is_some()
    }

    pub fn metric_column(&self, metric: BaseMetric) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, role)| **role == ColumnRole::Metric(metric))
            .map(|(name, _)| name.as_str())
    }

    pub fn role(&self, column: &str) -> Option<ColumnRole> {
        self.columns.get(column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnRole)> {
        self.columns.iter().map(|(name, role)| (name.as_str(), *role))
    }

    pub fn numeric_extras(&self) -> impl Iterator<Item = &str> {
        self.columns()
            .filter(|(_, role)| *role == ColumnRole::NumericExtra)
            .map(|(name, _)| name)
    }

    /// Headers for detail rows: source order, derived columns appended when
    /// the source did not already carry them.
    pub fn detail_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = self.columns.keys().cloned().collect();
        self.append_missing_derived(&mut headers);
        headers
    }

    /// Headers for aggregate rows: client, summed counts, then derived ratios.
    pub fn summary_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = self
            .columns()
            .filter(|(_, role)| {
                matches!(
                    role,
                    ColumnRole::Client | ColumnRole::Metric(_) | ColumnRole::NumericExtra
                )
            })
            .map(|(name, _)| name.to_string())
            .collect();
        for metric in BaseMetric::ALL {
            if self.metric_column(metric).is_none() {
                headers.push(metric.column().to_string());
            }
        }
        for derived in DERIVED_COLUMNS {
            headers.push(derived.to_string());
        }
        headers
    }

    fn append_missing_derived(&self, headers: &mut Vec<String>) {
        for derived in DERIVED_COLUMNS {
            let present = self
                .columns()
                .any(|(name, role)| role == ColumnRole::Derived && name.eq_ignore_ascii_case(derived));
            if !present {
                headers.push(derived.to_string());
            }
        }
    }
}

fn first_value_is_numeric(column: &str, rows: &[RawRow]) -> bool {
    rows.iter()
        .filter_map(|r| r.get(column))
        .find(|v| !v.is_empty())
        .is_some_and(|v| matches!(v, Value::Number(_)))
}
