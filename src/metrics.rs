use crate::types::{BaseMetrics, DerivedMetrics, LeadsPerPositive, Row};

/// Ratio metrics computed from base counts.
///
/// Percentages are 0 when their denominator is 0. Leads-per-positive has no
/// meaningful zero value, so it carries the `NoPositiveReply` sentinel instead.
pub fn compute(base: &BaseMetrics) -> DerivedMetrics {
    let unique_sent = base.unique_sent_count;
    let positive = base.positive_reply_count;
    let replies = base.reply_count;

    DerivedMetrics {
        prr_vs_rr: percent(positive, replies),
        rr: percent(replies, unique_sent),
        bounce_rate: percent(base.bounce_count, unique_sent),
        unique_leads_per_positive: if positive > 0.0 {
            LeadsPerPositive::Ratio(unique_sent / positive)
        } else {
            LeadsPerPositive::NoPositiveReply
        },
    }
}

/// Attach freshly computed ratios to a row, replacing whatever it carried.
pub fn derive_metrics(row: &mut Row) {
    row.derived = Some(compute(&row.base));
}

pub fn with_metrics(mut row: Row) -> Row {
    derive_metrics(&mut row);
    row
}

fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (numerator / denominator) * 100.0
    } else {
        0.0
    }
}
