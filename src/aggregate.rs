//! Pure grouped-count reductions over the cleaned table. Persistence and
//! chart rendering belong to the report layer.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use itertools::Itertools;

use crate::clean::CleanedTable;
use crate::totals::TotalsTable;

/// Yearly count with its share of the repository-wide artefact volume.
/// The percentage is None when the totals table has no row for the year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
    pub total: Option<u64>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// A wide two-dimensional count: one row per year, one column per label,
/// missing combinations filled with 0.
#[derive(Debug, Clone)]
pub struct Pivot {
    pub columns: Vec<String>,
    pub rows: Vec<(i32, Vec<u64>)>,
}

/// Count records per year across the window, with percentages against the
/// repository totals, rounded to one decimal place.
pub fn count_by_year(
    table: &CleanedTable,
    window: RangeInclusive<i32>,
    totals: &TotalsTable,
) -> Vec<YearCount> {
    let by_year: HashMap<i32, usize> = table
        .rows
        .iter()
        .filter_map(|r| r.year)
        .filter(|y| window.contains(y))
        .counts();

    window
        .map(|year| {
            let count = by_year.get(&year).copied().unwrap_or(0) as u64;
            let total = totals.total_for_year(year);
            let percentage = total
                .filter(|&t| t > 0)
                .map(|t| round1(count as f64 / t as f64 * 100.0));
            YearCount {
                year,
                count,
                total,
                percentage,
            }
        })
        .collect()
}

/// Count records per canonical funder, restricted to `subset`, sorted
/// ascending by count. Records with an empty or out-of-subset funder are
/// excluded.
pub fn count_by_funder(table: &CleanedTable, subset: &[String]) -> Vec<LabelCount> {
    let counts: HashMap<&str, usize> = table
        .rows
        .iter()
        .filter(|r| !r.funder.is_empty() && subset.iter().any(|s| *s == r.funder))
        .map(|r| r.funder.as_str())
        .counts();

    counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count: count as u64,
        })
        .sorted_by(|a, b| a.count.cmp(&b.count).then_with(|| a.label.cmp(&b.label)))
        .collect()
}

/// Count set flags per term column, sorted descending by count. Terms in
/// the catalog with no hits still appear, with a count of 0.
pub fn count_by_term(table: &CleanedTable) -> Vec<LabelCount> {
    table
        .terms
        .iter()
        .map(|term| LabelCount {
            label: term.clone(),
            count: table.rows.iter().filter(|r| r.terms.contains(term)).count() as u64,
        })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)))
        .collect()
}

/// Year × term counts across the window, one column per catalog term.
pub fn counts_by_year_and_term(table: &CleanedTable, window: RangeInclusive<i32>) -> Pivot {
    pivot(table, window, table.terms.clone(), |row, term| {
        row.terms.contains(term)
    })
}

/// Year × funder counts across the window, one column per subset code.
pub fn counts_by_year_and_funder(
    table: &CleanedTable,
    window: RangeInclusive<i32>,
    subset: &[String],
) -> Pivot {
    pivot(table, window, subset.to_vec(), |row, funder| {
        row.funder == *funder
    })
}

fn pivot(
    table: &CleanedTable,
    window: RangeInclusive<i32>,
    columns: Vec<String>,
    matches: impl Fn(&crate::clean::CleanedRow, &String) -> bool,
) -> Pivot {
    let rows = window
        .map(|year| {
            let values = columns
                .iter()
                .map(|col| {
                    table
                        .rows
                        .iter()
                        .filter(|r| r.year == Some(year) && matches(r, col))
                        .count() as u64
                })
                .collect();
            (year, values)
        })
        .collect();

    Pivot { columns, rows }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ── Tests ──
