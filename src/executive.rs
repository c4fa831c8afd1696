// Executive summary: per-client roll-up joined against the AM target sheet.
use crate::loader::{Sheet, Workbook};
use crate::metrics::compute;
use crate::types::{
    BaseMetrics, ExecutiveRow, Flag, Row, TargetRecord, Value, WeekendSendout, SUMMARY_SUFFIX,
};
use crate::util::cmp_ignore_case;
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use indexmap::IndexMap;
use tracing::{debug, info};

/// How a target percentage is judged on a given weekday.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdRule {
    /// Red when sending has started but lags; the floor depends on whether
    /// the client sends over the weekend.
    WeekendAware { weekend_floor: f64, weekday_floor: f64 },
    /// Red below the floor.
    Floor(f64),
    /// Red outside `[low, high]`.
    Band { low: f64, high: f64 },
}

pub const DEFAULT_RULE: ThresholdRule = ThresholdRule::Band {
    low: 80.0,
    high: 130.0,
};

pub const WEEKDAY_RULES: [(Weekday, ThresholdRule); 3] = [
    (
        Weekday::Mon,
        ThresholdRule::WeekendAware {
            weekend_floor: 30.0,
            weekday_floor: 15.0,
        },
    ),
    (Weekday::Tue, ThresholdRule::Floor(50.0)),
    (Weekday::Fri, ThresholdRule::Floor(95.0)),
];

pub fn rule_for(weekday: Weekday) -> ThresholdRule {
    WEEKDAY_RULES
        .iter()
        .find(|(day, _)| *day == weekday)
        .map(|(_, rule)| *rule)
        .unwrap_or(DEFAULT_RULE)
}

impl ThresholdRule {
    /// Cutoffs are strict: a value sitting exactly on a threshold is not red.
    pub fn flag(&self, target_percent: f64, weekend: &WeekendSendout) -> Flag {
        let red = match *self {
            ThresholdRule::WeekendAware {
                weekend_floor,
                weekday_floor,
            } => {
                let started = target_percent > 0.0;
                match weekend {
                    WeekendSendout::Yes => started && target_percent < weekend_floor,
                    WeekendSendout::No => started && target_percent < weekday_floor,
                    WeekendSendout::Unspecified => false,
                }
            }
            ThresholdRule::Floor(floor) => target_percent < floor,
            ThresholdRule::Band { low, high } => target_percent < low || target_percent > high,
        };
        if red {
            Flag::Red
        } else {
            Flag::Green
        }
    }
}

/// Calendar date "now" in the reference timezone.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

fn column<'a>(sheet: &'a Sheet, wanted: &str) -> Option<&'a str> {
    sheet
        .headers
        .iter()
        .find(|h| h.trim().eq_ignore_ascii_case(wanted))
        .map(String::as_str)
}

fn cell(row: &IndexMap<String, Value>, column: Option<&str>) -> Option<String> {
    let value = row.get(column?)?;
    if value.is_empty() {
        None
    } else {
        Some(value.to_cell().trim().to_string()).filter(|s| !s.is_empty())
    }
}

/// Read the AM sheet, discarding rows that lack a client, target or manager.
pub fn load_targets(sheet: &Sheet) -> Vec<TargetRecord> {
    let client_col = column(sheet, "client_name");
    let target_col = column(sheet, "Target");
    let manager_col = column(sheet, "Account Manager");
    let weekend_col = column(sheet, "Weekend sendout");

    let mut records = Vec::new();
    let mut discarded = 0usize;
    for row in &sheet.rows {
        let (Some(client_name), Some(target), Some(account_manager)) = (
            cell(row, client_col),
            target_col.and_then(|c| row.get(c)),
            cell(row, manager_col),
        ) else {
            discarded += 1;
            continue;
        };
        if target.is_empty() {
            discarded += 1;
            continue;
        }
        records.push(TargetRecord {
            client_name,
            target: target.as_number().unwrap_or(0.0),
            account_manager,
            weekend_sendout: cell(row, weekend_col).unwrap_or_default(),
        });
    }
    if discarded > 0 {
        debug!("Discarded {} incomplete rows from AM sheet", discarded);
    }
    records
}

/// Target table of the workbook; `None` disables the executive view.
pub fn targets_from_workbook(workbook: &Workbook) -> Option<Vec<TargetRecord>> {
    match workbook.am_sheet() {
        Some(sheet) => {
            let targets = load_targets(sheet);
            info!("Loaded {} target records from sheet \"{}\"", targets.len(), sheet.name);
            Some(targets)
        }
        None => {
            info!("No AM sheet in workbook; executive summary disabled");
            None
        }
    }
}

/// One row per client with target attainment and its weekday flag.
///
/// Clients that sent nothing are left out; the result is sorted by client
/// name ignoring case.
pub fn evaluate_executive(
    client_aggregates: &[Row],
    targets: &[TargetRecord],
    reference_date: NaiveDate,
) -> Vec<ExecutiveRow> {
    let mut by_client: IndexMap<String, BaseMetrics> = IndexMap::new();
    for row in client_aggregates {
        let Some(client) = row.client.as_deref() else {
            continue;
        };
        if client.is_empty() || client.contains(SUMMARY_SUFFIX) {
            continue;
        }
        *by_client.entry(client.to_string()).or_default() += row.base;
    }

    let rule = rule_for(reference_date.weekday());
    let mut rows: Vec<ExecutiveRow> = by_client
        .into_iter()
        .filter(|(_, base)| base.sent_count >= 1.0)
        .map(|(client_name, base)| {
            let record = targets.iter().find(|t| t.client_name.trim() == client_name);
            let target = record.map(|t| t.target).filter(|t| *t > 0.0);
            let target_percent = match target {
                Some(t) => base.unique_sent_count / t * 100.0,
                None => 0.0,
            };
            let weekend = record.map(TargetRecord::weekend).unwrap_or(WeekendSendout::Unspecified);
            ExecutiveRow {
                derived: compute(&base),
                flag: rule.flag(target_percent, &weekend),
                account_manager: record.map(|t| t.account_manager.clone()).unwrap_or_default(),
                weekend_sendout: record.map(|t| t.weekend_sendout.clone()).unwrap_or_default(),
                client_name,
                base,
                target,
                target_percent,
            }
        })
        .collect();
    rows.sort_by(|a, b| cmp_ignore_case(&a.client_name, &b.client_name));
    rows
}
