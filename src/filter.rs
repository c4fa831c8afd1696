use crate::types::Row;
use std::collections::BTreeSet;

/// Distinct, non-empty client names, sorted.
pub fn client_names(rows: &[Row]) -> Vec<String> {
    let unique: BTreeSet<&str> = rows
        .iter()
        .filter(|r| !r.is_summary())
        .filter_map(|r| r.client.as_deref())
        .filter(|c| !c.is_empty())
        .collect();
    unique.into_iter().map(str::to_string).collect()
}

/// Case-insensitive substring search over names; an empty term matches all.
pub fn search<'a>(names: &'a [String], term: &str) -> Vec<&'a str> {
    let term = term.trim().to_lowercase();
    names
        .iter()
        .filter(|n| term.is_empty() || n.to_lowercase().contains(&term))
        .map(String::as_str)
        .collect()
}

/// Rows for one client; `None` keeps everything.
pub fn filter_by_client(rows: &[Row], client: Option<&str>) -> Vec<Row> {
    match client {
        None => rows.to_vec(),
        Some(client) => rows
            .iter()
            .filter(|r| r.client.as_deref() == Some(client))
            .cloned()
            .collect(),
    }
}

/// Sheet names matching a search term, in workbook order.
pub fn search_sheets<'a>(sheet_names: &[&'a str], term: &str) -> Vec<&'a str> {
    let term = term.trim().to_lowercase();
    sheet_names
        .iter()
        .copied()
        .filter(|n| term.is_empty() || n.to_lowercase().contains(&term))
        .collect()
}
