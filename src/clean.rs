use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::settings::{FunderEntry, Settings};
use crate::table::RecordTable;

static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

/// One record after cleaning: parsed date, derived year, canonical funder.
#[derive(Debug, Clone)]
pub struct CleanedRow {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    /// Canonical funder code, or empty when the raw text matched nothing.
    pub funder: String,
    pub terms: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct CleanedTable {
    pub rows: Vec<CleanedRow>,
    /// Term catalog carried over from the record table, discovery order.
    pub terms: Vec<String>,
}

/// Parse dates (day-first), derive years, canonicalize funder names and
/// optionally restrict rows to the configured year window.
pub fn clean(table: &RecordTable, settings: &Settings) -> CleanedTable {
    let window = settings.year_window();
    let mut rows = Vec::with_capacity(table.len());

    for row in table.rows() {
        let date = row.meta.date.as_deref().and_then(parse_date_dayfirst);
        let year = date.map(|d| d.year());
        if settings.filter_years && !year.is_some_and(|y| window.contains(&y)) {
            continue;
        }
        let funder = row
            .meta
            .funder
            .as_deref()
            .and_then(|raw| canonical_funder(raw, &settings.funders))
            .unwrap_or_default()
            .to_string();

        rows.push(CleanedRow {
            id: row.id.clone(),
            date,
            year,
            funder,
            terms: row.terms.clone(),
        });
    }

    CleanedTable {
        rows,
        terms: table.terms().to_vec(),
    }
}

/// Parse a free-text date, resolving ambiguous numeric dates day-first:
/// `03/04/2015` is the 3rd of April. Year-month and bare-year strings fall
/// back to the first day of the month/year; anything else is None.
pub fn parse_date_dayfirst(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    const FORMATS: [&str; 7] = [
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d %B %Y",
        "%d %b %Y",
    ];
    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    if let Some(caps) = YEAR_MONTH_RE.captures(raw) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    // Last resort: a recognisable 4-digit year anywhere in the string.
    if let Some(caps) = YEAR_RE.captures(raw) {
        let year: i32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }

    None
}

/// Match raw funder text against the vocabulary, case-sensitively, by
/// substring. The first entry in declaration order wins; this tie-break is
/// part of the contract since it decides funder attribution.
pub fn canonical_funder<'a>(raw: &str, vocab: &'a [FunderEntry]) -> Option<&'a str> {
    vocab
        .iter()
        .find(|entry| entry.forms.iter().any(|form| raw.contains(form.as_str())))
        .map(|entry| entry.code.as_str())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RecordMeta;

    #[test]
    fn ambiguous_numeric_date_is_day_first() {
        let d = parse_date_dayfirst("03/04/2015").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2015, 4, 3));
    }

    #[test]
    fn iso_year_month_and_bare_year_parse() {
        assert_eq!(
            parse_date_dayfirst("2012-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2012, 6, 1).unwrap()
        );
        assert_eq!(
            parse_date_dayfirst("2015-04").unwrap(),
            NaiveDate::from_ymd_opt(2015, 4, 1).unwrap()
        );
        assert_eq!(
            parse_date_dayfirst("2016").unwrap(),
            NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
        );
    }

    #[test]
    fn unparseable_date_degrades_to_none() {
        assert!(parse_date_dayfirst("not-a-date").is_none());
        assert!(parse_date_dayfirst("").is_none());
        assert!(parse_date_dayfirst("??").is_none());
    }

    #[test]
    fn funder_canonicalization_matches_abbreviation_or_full_name() {
        let vocab = Settings::default().funders;
        assert_eq!(
            canonical_funder(
                "EPSRC (Engineering and Physical Sciences Research Council)",
                &vocab
            ),
            Some("EPSRC")
        );
        assert_eq!(
            canonical_funder("Funded by the Medical Research Council", &vocab),
            Some("MRC")
        );
        assert_eq!(canonical_funder("Wellcome Trust", &vocab), None);
    }

    #[test]
    fn funder_match_is_case_sensitive_first_entry_wins() {
        let vocab = Settings::default().funders;
        assert_eq!(canonical_funder("epsrc", &vocab), None);
        // Text naming two councils attributes to the earlier vocabulary entry.
        assert_eq!(
            canonical_funder("Joint EPSRC and MRC programme", &vocab),
            Some("EPSRC")
        );
        assert_eq!(
            canonical_funder("Joint MRC and EPSRC programme", &vocab),
            Some("EPSRC")
        );
    }

    fn table_with(date: Option<&str>, funder: Option<&str>) -> RecordTable {
        let mut t = RecordTable::new();
        t.upsert(
            "id-1",
            RecordMeta {
                title: None,
                abstract_text: None,
                funder: funder.map(|s| s.to_string()),
                date: date.map(|s| s.to_string()),
            },
            "simulation",
        );
        t
    }

    #[test]
    fn year_window_filter_drops_out_of_window_rows() {
        let table = table_with(Some("01/01/1999"), None);
        let settings = Settings::default();
        assert!(clean(&table, &settings).rows.is_empty());

        let mut keep_all = Settings::default();
        keep_all.filter_years = false;
        let cleaned = clean(&table, &keep_all);
        assert_eq!(cleaned.rows.len(), 1);
        assert_eq!(cleaned.rows[0].year, Some(1999));
    }

    #[test]
    fn null_dates_are_dropped_only_when_filtering() {
        let table = table_with(Some("not-a-date"), None);
        let settings = Settings::default();
        assert!(clean(&table, &settings).rows.is_empty());

        let mut keep_all = Settings::default();
        keep_all.filter_years = false;
        let cleaned = clean(&table, &keep_all);
        assert_eq!(cleaned.rows.len(), 1);
        assert!(cleaned.rows[0].year.is_none());
    }

    #[test]
    fn unknown_funder_becomes_empty() {
        let table = table_with(Some("03/04/2015"), Some("Wellcome Trust"));
        let cleaned = clean(&table, &Settings::default());
        assert_eq!(cleaned.rows[0].funder, "");
    }
}
