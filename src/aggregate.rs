//! Summaries over labelled tables, used for the per-class report tables.

use crate::binning::compare_labels;
use crate::error::{Error, Result};
use crate::table::Table;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

fn compare_keys(a: &[String], b: &[String]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_labels(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Row indices grouped by the values of `columns`, groups in label order
fn grouped(table: &Table, columns: &[&str]) -> Result<Vec<(Vec<String>, Vec<usize>)>> {
    let cols = columns
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<Vec<_>>>()?;
    let mut groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for row in 0..table.len() {
        let key = cols.iter().map(|&c| table.cell(row, c).to_string()).collect();
        groups.entry(key).or_default().push(row);
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|a, b| compare_keys(&a.0, &b.0));
    Ok(groups)
}

/// One row per combination of `group_by` values: the group values, the
/// number of rows `n`, and the mean of each of `value_columns`.
pub fn group_means(table: &Table, group_by: &[&str], value_columns: &[&str]) -> Result<Table> {
    let values = value_columns
        .iter()
        .map(|c| table.numeric_column(c))
        .collect::<Result<Vec<_>>>()?;

    let mut headers: Vec<String> = group_by.iter().map(|c| c.to_string()).collect();
    headers.push("n".to_string());
    headers.extend(value_columns.iter().map(|c| c.to_string()));
    let mut out = Table::new(headers)?;

    for (key, rows) in grouped(table, group_by)? {
        let n = rows.len() as f64;
        let mut row = key;
        row.push(rows.len().to_string());
        for column in &values {
            let sum: f64 = rows.iter().map(|&r| column[r]).sum();
            row.push((sum / n).to_string());
        }
        out.push_row(row)?;
    }
    Ok(out)
}

/// Counts of `rows` values against `columns` values. The first column holds
/// the row labels; an absent combination counts 0.
pub fn crosstab(table: &Table, rows: &str, columns: &str) -> Result<Table> {
    let r = table.column(rows)?;
    let c = table.column(columns)?;

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    let mut row_labels = Vec::new();
    let mut col_labels = Vec::new();
    for i in 0..table.len() {
        let (a, b) = (table.cell(i, r), table.cell(i, c));
        if !row_labels.contains(&a) {
            row_labels.push(a);
        }
        if !col_labels.contains(&b) {
            col_labels.push(b);
        }
        *counts.entry((a, b)).or_default() += 1;
    }
    row_labels.sort_by(|a, b| compare_labels(a, b));
    col_labels.sort_by(|a, b| compare_labels(a, b));

    let mut headers = vec![rows.to_string()];
    headers.extend(col_labels.iter().map(|l| l.to_string()));
    let mut out = Table::new(headers)
        .map_err(|_| Error::Config(format!("`{}` and one of its values share a name", rows)))?;
    for a in row_labels {
        let mut row = vec![a.to_string()];
        row.extend(
            col_labels
                .iter()
                .map(|b| counts.get(&(a, *b)).copied().unwrap_or(0).to_string()),
        );
        out.push_row(row)?;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPoint {
    Low,
    High,
    Middle,
}

/// Bounds encoded in a column name such as `parked_s[900;1800]`
pub fn decode_interval(name: &str) -> Option<(f64, f64)> {
    let start = name.find('[')?;
    let end = start + name[start..].find(']')?;
    let (low, high) = name[start + 1..end].split_once(';')?;
    Some((low.trim().parse().ok()?, high.trim().parse().ok()?))
}

pub fn decode_point(name: &str, point: IntervalPoint) -> Option<f64> {
    let (low, high) = decode_interval(name)?;
    Some(match point {
        IntervalPoint::Low => low,
        IntervalPoint::High => high,
        IntervalPoint::Middle => (low + high) / 2.0,
    })
}

/// Turns every column starting with `prefix` into rows: one row per input row
/// and matching column, with the `keep` columns, the interval bounds and
/// middle decoded from the column name, and the cell value as `value_name`.
pub fn melt_intervals(table: &Table, keep: &[&str], prefix: &str, value_name: &str) -> Result<Table> {
    let kept = keep
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<Vec<_>>>()?;
    let mut melted = Vec::new();
    for (i, h) in table.headers().iter().enumerate() {
        if h.starts_with(prefix) {
            let (low, high) = decode_interval(h).ok_or_else(|| {
                Error::Config(format!("column `{}` does not encode an interval", h))
            })?;
            melted.push((i, low, high));
        }
    }

    let mut headers: Vec<String> = keep.iter().map(|c| c.to_string()).collect();
    headers.extend(
        ["interval_start", "interval_end", "interval_middle", value_name]
            .iter()
            .map(|s| s.to_string()),
    );
    let mut out = Table::new(headers)?;
    for row in 0..table.len() {
        for &(col, low, high) in &melted {
            let mut r: Vec<String> = kept.iter().map(|&c| table.cell(row, c).to_string()).collect();
            r.push(low.to_string());
            r.push(high.to_string());
            r.push(((low + high) / 2.0).to_string());
            r.push(table.cell(row, col).to_string());
            out.push_row(r)?;
        }
    }
    Ok(out)
}

/// Share of each distinct value of `column`, summing to 1. Empty cells are
/// left out.
pub fn category_shares(table: &Table, column: &str) -> Result<BTreeMap<String, f64>> {
    let col = table.column(column)?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..table.len() {
        let v = table.cell(row, col).trim();
        if !v.is_empty() {
            *counts.entry(v.to_string()).or_default() += 1;
        }
    }
    let total: usize = counts.values().sum();
    Ok(counts
        .into_iter()
        .map(|(k, n)| (k, n as f64 / total as f64))
        .collect())
}

/// Summed weight per combination of `keys`, each row weighing 1 without a
/// weight column. Rows with an empty key cell are left out.
fn weighted_counts(
    table: &Table,
    keys: &[&str],
    weight: Option<&str>,
) -> Result<HashMap<Vec<String>, f64>> {
    let weights = match weight {
        Some(w) => Some(table.numeric_column(w)?),
        None => None,
    };
    let mut counts = HashMap::new();
    for (key, rows) in grouped(table, keys)? {
        if key.iter().any(|k| k.trim().is_empty()) {
            continue;
        }
        let n = match &weights {
            Some(w) => rows.iter().map(|&r| w[r]).sum(),
            None => rows.len() as f64,
        };
        counts.insert(key, n);
    }
    Ok(counts)
}

/// Compares how two populations spread over the combinations of `keys`,
/// e.g. vehicle type and powertrain. Target rows count once each, source rows
/// by `source_weight` when given. Each side is normalised to shares; a
/// combination found on one side only has share 0 on the other.
///
/// Columns: the keys, `share_target`, `share_source`.
pub fn stock_comparison(
    target: &Table,
    source: &Table,
    keys: &[&str],
    source_weight: Option<&str>,
) -> Result<Table> {
    let target_counts = weighted_counts(target, keys, None)?;
    let source_counts = weighted_counts(source, keys, source_weight)?;
    let target_total: f64 = target_counts.values().sum();
    let source_total: f64 = source_counts.values().sum();
    let share = |counts: &HashMap<Vec<String>, f64>, total: f64, key: &Vec<String>| {
        match counts.get(key) {
            Some(n) if total > 0.0 => n / total,
            _ => 0.0,
        }
    };

    let mut combinations: Vec<&Vec<String>> = target_counts.keys().collect();
    combinations.extend(source_counts.keys().filter(|k| !target_counts.contains_key(*k)));
    combinations.sort_by(|a, b| compare_keys(a, b));

    let mut headers: Vec<String> = keys.iter().map(|c| c.to_string()).collect();
    headers.push("share_target".to_string());
    headers.push("share_source".to_string());
    let mut out = Table::new(headers)?;
    for key in combinations {
        let mut row = key.clone();
        row.push(share(&target_counts, target_total, key).to_string());
        row.push(share(&source_counts, source_total, key).to_string());
        out.push_row(row)?;
    }
    Ok(out)
}
