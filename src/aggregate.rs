use crate::metrics::with_metrics;
use crate::schema::Schema;
use crate::types::{BaseMetrics, Row, RowKind, Value, SUMMARY_SUFFIX};
use crate::util::cmp_ignore_case;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Client,
    All,
}

struct Acc {
    base: BaseMetrics,
    extras: IndexMap<String, f64>,
}

impl Acc {
    fn new(schema: &Schema) -> Self {
        Acc {
            base: BaseMetrics::default(),
            extras: schema.numeric_extras().map(|c| (c.to_string(), 0.0)).collect(),
        }
    }

    fn add(&mut self, row: &Row) {
        self.base += row.base;
        for (column, total) in self.extras.iter_mut() {
            *total += row.extra.get(column).and_then(Value::as_number).unwrap_or(0.0);
        }
    }

    fn into_row(self, client: Option<&str>) -> Row {
        let mut row = Row::with_base(client, self.base);
        row.extra = self
            .extras
            .into_iter()
            .map(|(c, v)| (c, Value::Number(v)))
            .collect();
        row.kind = RowKind::Summary;
        with_metrics(row)
    }
}

/// Sum base counts per group and derive the ratios from the sums.
///
/// Ratios are never added or averaged across rows. Synthesized summary rows in
/// the input are ignored. Groups come out in first-encountered order; without
/// a client column the whole input is one group. Rows without a client value
/// form their own group whose aggregate has `client: None` and is labelled
/// `"Unknown"`, so it never merges with a client actually named that.
pub fn aggregate(rows: &[Row], schema: &Schema, group_by: GroupBy) -> Vec<Row> {
    let members = rows.iter().filter(|r| !r.is_summary());

    if group_by == GroupBy::All || !schema.has_client() {
        let mut acc = Acc::new(schema);
        let mut count = 0usize;
        for row in members {
            acc.add(row);
            count += 1;
        }
        if count == 0 {
            return Vec::new();
        }
        return vec![acc.into_row(None)];
    }

    let mut groups: IndexMap<Option<&str>, Acc> = IndexMap::new();
    for row in members {
        groups
            .entry(group_key(row))
            .or_insert_with(|| Acc::new(schema))
            .add(row);
    }
    groups
        .into_iter()
        .map(|(client, acc)| acc.into_row(client))
        .collect()
}

/// `None` for the missing-client bucket.
fn group_key(row: &Row) -> Option<&str> {
    row.client.as_deref().filter(|c| !c.is_empty())
}

/// Overall totals of a row set, as shown on the summary cards and table footer.
pub fn totals(rows: &[Row], schema: &Schema) -> Option<Row> {
    aggregate(rows, schema, GroupBy::All).into_iter().next()
}

/// Stable case-insensitive ordering by client label. Labels that only differ
/// in case, and a client named "Unknown" next to the missing-client bucket,
/// stay in separate runs.
pub fn sort_by_client(rows: &mut [Row]) {
    rows.sort_by(|a, b| {
        cmp_ignore_case(a.client_key(), b.client_key())
            .then_with(|| a.client_key().cmp(b.client_key()))
            .then_with(|| group_key(a).is_none().cmp(&group_key(b).is_none()))
    });
}

/// `"<Client> - Summary"` row over the given client's members.
pub fn client_summary_row(rows: &[Row], schema: &Schema, client: Option<&str>) -> Option<Row> {
    let members: Vec<Row> = rows
        .iter()
        .filter(|r| !r.is_summary() && group_key(r) == client)
        .cloned()
        .collect();
    let label = format!("{}{}", members.first()?.client_key(), SUMMARY_SUFFIX);
    let mut summary = aggregate(&members, schema, GroupBy::All).into_iter().next()?;
    summary.client = Some(label);
    Some(summary)
}

/// Detail rows sorted by client, each client's block followed by its summary row.
pub fn with_client_summaries(rows: &[Row], schema: &Schema) -> Vec<Row> {
    let mut detail: Vec<Row> = rows.iter().filter(|r| !r.is_summary()).cloned().collect();
    sort_by_client(&mut detail);
    if !schema.has_client() {
        return detail;
    }

    let mut out = Vec::with_capacity(detail.len() + 8);
    let mut start = 0;
    while start < detail.len() {
        let key = group_key(&detail[start]);
        let end = detail[start..]
            .iter()
            .position(|r| group_key(r) != key)
            .map_or(detail.len(), |offset| start + offset);
        let block = &detail[start..end];
        out.extend(block.iter().cloned());
        if let Some(summary) = client_summary_row(block, schema, key) {
            out.push(summary);
        }
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::compute;
    use crate::types::LeadsPerPositive;

    const EPS: f64 = 0.005;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    fn client_schema() -> Schema {
        Schema::sniff(
            [
                "client",
                "sent_count",
                "unique_sent_count",
                "positive_reply_count",
                "reply_count",
                "bounce_count",
            ],
            &[],
        )
    }

    fn row(client: Option<&str>, unique: f64, replies: f64, positive: f64, bounces: f64) -> Row {
        with_metrics(Row::with_base(
            client,
            BaseMetrics {
                sent_count: unique,
                unique_sent_count: unique,
                positive_reply_count: positive,
                reply_count: replies,
                bounce_count: bounces,
            },
        ))
    }

    #[test]
    fn client_rows_are_summed_and_ratios_rederived() {
        let rows = vec![
            row(Some("A"), 100.0, 10.0, 2.0, 1.0),
            row(Some("A"), 50.0, 5.0, 0.0, 0.0),
        ];
        let out = aggregate(&rows, &client_schema(), GroupBy::Client);
        assert_eq!(out.len(), 1);
        let a = &out[0];
        assert_eq!(a.client.as_deref(), Some("A"));
        assert_eq!(a.base.unique_sent_count, 150.0);
        assert_eq!(a.base.reply_count, 15.0);
        assert_eq!(a.base.positive_reply_count, 2.0);
        assert_eq!(a.base.bounce_count, 1.0);
        let d = a.derived.unwrap();
        assert!(approx(d.rr, 10.0));
        assert!(approx(d.prr_vs_rr, 13.33));
        assert!(approx(d.bounce_rate, 0.67));
        assert_eq!(d.unique_leads_per_positive, LeadsPerPositive::Ratio(75.0));
    }

    #[test]
    fn aggregate_ratio_is_not_the_mean_of_row_ratios() {
        let r1 = row(Some("A"), 100.0, 10.0, 1.0, 0.0);
        let r2 = row(Some("A"), 100.0, 40.0, 20.0, 0.0);
        let out = aggregate(&[r1.clone(), r2.clone()], &client_schema(), GroupBy::Client);
        let agg = out[0].derived.unwrap().prr_vs_rr;

        let expected = compute(&BaseMetrics {
            reply_count: 50.0,
            positive_reply_count: 21.0,
            ..BaseMetrics::default()
        })
        .prr_vs_rr;
        assert!(approx(agg, expected));

        let mean = (r1.derived.unwrap().prr_vs_rr + r2.derived.unwrap().prr_vs_rr) / 2.0;
        assert!((agg - mean).abs() > 1.0);
    }

    #[test]
    fn groups_keep_first_encountered_order() {
        let rows = vec![
            row(Some("Zed"), 1.0, 0.0, 0.0, 0.0),
            row(Some("Acme"), 1.0, 0.0, 0.0, 0.0),
            row(Some("Zed"), 1.0, 0.0, 0.0, 0.0),
        ];
        let out = aggregate(&rows, &client_schema(), GroupBy::Client);
        let clients: Vec<_> = out.iter().map(|r| r.client_key()).collect();
        assert_eq!(clients, vec!["Zed", "Acme"]);
        assert_eq!(out[0].base.unique_sent_count, 2.0);
    }

    #[test]
    fn rows_without_client_fall_under_unknown() {
        let rows = vec![
            row(Some("A"), 10.0, 1.0, 0.0, 0.0),
            row(None, 5.0, 0.0, 0.0, 0.0),
            row(Some(""), 2.0, 0.0, 0.0, 0.0),
        ];
        let out = aggregate(&rows, &client_schema(), GroupBy::Client);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].client, None);
        assert_eq!(out[1].client_key(), "Unknown");
        assert_eq!(out[1].base.unique_sent_count, 7.0);
    }

    #[test]
    fn client_named_unknown_is_its_own_group() {
        let rows = vec![
            row(Some("Unknown"), 3.0, 0.0, 0.0, 0.0),
            row(None, 5.0, 0.0, 0.0, 0.0),
        ];
        let out = aggregate(&rows, &client_schema(), GroupBy::Client);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].client.as_deref(), Some("Unknown"));
        assert_eq!(out[0].base.unique_sent_count, 3.0);
        assert_eq!(out[1].client, None);
        assert_eq!(out[1].base.unique_sent_count, 5.0);
    }

    #[test]
    fn missing_client_column_yields_one_overall_row() {
        let schema = Schema::sniff(["unique_sent_count", "reply_count"], &[]);
        let rows = vec![row(None, 10.0, 1.0, 0.0, 0.0), row(None, 30.0, 3.0, 0.0, 0.0)];
        let out = aggregate(&rows, &schema, GroupBy::Client);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client, None);
        assert_eq!(out[0].base.unique_sent_count, 40.0);
        assert!(approx(out[0].derived.unwrap().rr, 10.0));
    }

    #[test]
    fn empty_input_produces_no_groups() {
        assert!(aggregate(&[], &client_schema(), GroupBy::Client).is_empty());
        assert!(aggregate(&[], &client_schema(), GroupBy::All).is_empty());
    }

    #[test]
    fn summary_rows_are_never_reaggregated() {
        let rows = vec![row(Some("A"), 10.0, 1.0, 1.0, 0.0)];
        let schema = client_schema();
        let mut with_summary = with_client_summaries(&rows, &schema);
        assert_eq!(with_summary.len(), 2);
        assert_eq!(with_summary[1].client.as_deref(), Some("A - Summary"));

        with_summary.extend(aggregate(&rows, &schema, GroupBy::Client));
        let out = aggregate(&with_summary, &schema, GroupBy::Client);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].base.unique_sent_count, 10.0);
    }

    #[test]
    fn client_blocks_are_sorted_and_closed_by_summary() {
        let rows = vec![
            row(Some("beta"), 4.0, 0.0, 0.0, 0.0),
            row(Some("Alpha"), 2.0, 0.0, 0.0, 0.0),
            row(Some("beta"), 6.0, 0.0, 0.0, 0.0),
        ];
        let out = with_client_summaries(&rows, &client_schema());
        let labels: Vec<_> = out.iter().map(|r| r.client_key()).collect();
        assert_eq!(labels, vec!["Alpha", "Alpha - Summary", "beta", "beta", "beta - Summary"]);
        assert_eq!(out[4].base.unique_sent_count, 10.0);
    }

    #[test]
    fn numeric_passthrough_columns_are_summed() {
        let schema = Schema::sniff(["client", "unique_sent_count", "open_count"], &[]);
        let mut a = row(Some("A"), 1.0, 0.0, 0.0, 0.0);
        a.extra.insert("open_count".into(), Value::Number(3.0));
        let mut b = row(Some("A"), 1.0, 0.0, 0.0, 0.0);
        b.extra.insert("open_count".into(), Value::Text("oops".into()));
        let out = aggregate(&[a, b], &schema, GroupBy::Client);
        assert_eq!(out[0].extra["open_count"], Value::Number(3.0));
    }
}
