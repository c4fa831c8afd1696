use indexmap::IndexMap;

use crate::util::{format_plain, parse_f64_safe};

/// Sentinel carried by `unique_leads_per_positive` when a group has no positive replies.
pub const NO_POSITIVE_REPLY: &str = "no positive reply";

/// Label used for rows that have no client value in a dataset that has a client column.
pub const UNKNOWN_CLIENT: &str = "Unknown";

pub const SUMMARY_SUFFIX: &str = " - Summary";

pub const DERIVED_COLUMNS: [&str; 4] = ["prr_vs_rr", "rr", "bounce_rate", "unique_leads_per_positive"];

/// A single cell as handed over by the workbook reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            Value::Number(_) => false,
        }
    }

    /// Numeric view of the cell; text goes through the forgiving parser.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_f64_safe(Some(s)),
            Value::Empty => None,
        }
    }

    /// String coercion used for grouping keys and CSV cells.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => format_plain(*n),
            Value::Text(s) => s.clone(),
        }
    }
}

/// One sheet record before normalization: header -> cell, in column order.
pub type RawRow = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseMetric {
    SentCount,
    UniqueSentCount,
    PositiveReplyCount,
    ReplyCount,
    BounceCount,
}

impl BaseMetric {
    pub const ALL: [BaseMetric; 5] = [
        BaseMetric::SentCount,
        BaseMetric::UniqueSentCount,
        BaseMetric::PositiveReplyCount,
        BaseMetric::ReplyCount,
        BaseMetric::BounceCount,
    ];

    pub fn column(self) -> &'static str {
        match self {
            BaseMetric::SentCount => "sent_count",
            BaseMetric::UniqueSentCount => "unique_sent_count",
            BaseMetric::PositiveReplyCount => "positive_reply_count",
            BaseMetric::ReplyCount => "reply_count",
            BaseMetric::BounceCount => "bounce_count",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|m| m.column() == lower)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseMetrics {
    pub sent_count: f64,
    pub unique_sent_count: f64,
    pub positive_reply_count: f64,
    pub reply_count: f64,
    pub bounce_count: f64,
}

impl BaseMetrics {
    pub fn get(&self, metric: BaseMetric) -> f64 {
        match metric {
            BaseMetric::SentCount => self.sent_count,
            BaseMetric::UniqueSentCount => self.unique_sent_count,
            BaseMetric::PositiveReplyCount => self.positive_reply_count,
            BaseMetric::ReplyCount => self.reply_count,
            BaseMetric::BounceCount => self.bounce_count,
        }
    }

    pub fn get_mut(&mut self, metric: BaseMetric) -> &mut f64 {
        match metric {
            BaseMetric::SentCount => &mut self.sent_count,
            BaseMetric::UniqueSentCount => &mut self.unique_sent_count,
            BaseMetric::PositiveReplyCount => &mut self.positive_reply_count,
            BaseMetric::ReplyCount => &mut self.reply_count,
            BaseMetric::BounceCount => &mut self.bounce_count,
        }
    }
}

impl std::ops::AddAssign for BaseMetrics {
    fn add_assign(&mut self, rhs: Self) {
        for metric in BaseMetric::ALL {
            *self.get_mut(metric) += rhs.get(metric);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeadsPerPositive {
    Ratio(f64),
    NoPositiveReply,
}

impl LeadsPerPositive {
    pub fn to_cell(&self) -> String {
        match self {
            LeadsPerPositive::Ratio(v) => format_plain(*v),
            LeadsPerPositive::NoPositiveReply => NO_POSITIVE_REPLY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub prr_vs_rr: f64,
    pub rr: f64,
    pub bounce_rate: f64,
    pub unique_leads_per_positive: LeadsPerPositive,
}

impl DerivedMetrics {
    pub fn cell(&self, column: &str) -> Option<String> {
        match column {
            "prr_vs_rr" => Some(format_plain(self.prr_vs_rr)),
            "rr" => Some(format_plain(self.rr)),
            "bounce_rate" => Some(format_plain(self.bounce_rate)),
            "unique_leads_per_positive" => Some(self.unique_leads_per_positive.to_cell()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowKind {
    /// A record read from a sheet.
    #[default]
    Detail,
    /// A synthesized aggregate; never fed back into aggregation.
    Summary,
}

/// A normalized sheet record.
///
/// Base counts have named fields, every other surviving column rides along in
/// `extra` in its original column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub client: Option<String>,
    pub base: BaseMetrics,
    pub derived: Option<DerivedMetrics>,
    pub extra: IndexMap<String, Value>,
    pub kind: RowKind,
}

impl Row {
    pub fn with_base(client: Option<&str>, base: BaseMetrics) -> Self {
        Row {
            client: client.map(str::to_string),
            base,
            ..Row::default()
        }
    }

    /// Grouping key; rows without a client value fall under `"Unknown"`.
    pub fn client_key(&self) -> &str {
        match self.client.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => UNKNOWN_CLIENT,
        }
    }

    pub fn is_summary(&self) -> bool {
        self.kind == RowKind::Summary
            || self
                .client
                .as_deref()
                .is_some_and(|c| c.contains(SUMMARY_SUFFIX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekendSendout {
    Yes,
    No,
    Unspecified,
}

impl WeekendSendout {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "Y" | "YES" => WeekendSendout::Yes,
            "N" | "NO" => WeekendSendout::No,
            _ => WeekendSendout::Unspecified,
        }
    }
}

/// One usable line of the AM sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub client_name: String,
    pub target: f64,
    pub account_manager: String,
    /// Raw cell text, kept verbatim for export.
    pub weekend_sendout: String,
}

impl TargetRecord {
    pub fn weekend(&self) -> WeekendSendout {
        WeekendSendout::parse(&self.weekend_sendout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Red,
    Green,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutiveRow {
    pub client_name: String,
    pub base: BaseMetrics,
    pub derived: DerivedMetrics,
    /// `None` when no target record matched or the target was not positive.
    pub target: Option<f64>,
    pub target_percent: f64,
    pub account_manager: String,
    pub weekend_sendout: String,
    pub flag: Flag,
}

impl ExecutiveRow {
    pub fn target_percent_label(&self) -> String {
        match self.target {
            Some(_) => format!("{:.2}%", self.target_percent),
            None => String::new(),
        }
    }
}
