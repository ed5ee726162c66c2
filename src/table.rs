use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

/// Fixed metadata columns, in persisted order. Term columns follow these.
pub const METADATA_FIELDS: [&str; 4] = ["title", "abstract", "funder", "date"];

/// Persisted term columns are named `<term>_found`, matching the original
/// export; the cell holds the term name when the flag is set.
pub const TERM_COLUMN_SUFFIX: &str = "_found";

/// The four optional metadata fields extracted from one `<eprint>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub funder: Option<String>,
    pub date: Option<String>,
}

/// One row of the record table: a deduplicated publication.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub meta: RecordMeta,
    pub terms: HashSet<String>,
}

/// Deduplicated table keyed by the cross-repository identifier, with a
/// monotonically growing term catalog. Row and column order is insertion
/// order, so a scan in a stable order yields reproducible output.
#[derive(Debug, Default)]
pub struct RecordTable {
    rows: Vec<Row>,
    index: HashMap<String, usize>,
    terms: Vec<String>,
    term_set: HashSet<String>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Term catalog in discovery order (bare term names, no suffix).
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn get(&self, id: &str) -> Option<&Row> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    /// Register a term column without touching any row. Idempotent.
    pub fn ensure_term(&mut self, term: &str) {
        if self.term_set.insert(term.to_string()) {
            self.terms.push(term.to_string());
        }
    }

    /// Merge one record occurrence into the table.
    ///
    /// Precedence contract: each metadata field keeps the value from the
    /// first occurrence that supplied it; the term flag is set regardless
    /// of whether the row already existed (flags accumulate, idempotently).
    pub fn upsert(&mut self, id: &str, meta: RecordMeta, term: &str) {
        self.ensure_term(term);
        let i = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.rows.push(Row {
                    id: id.to_string(),
                    meta: RecordMeta::default(),
                    terms: HashSet::new(),
                });
                let i = self.rows.len() - 1;
                self.index.insert(id.to_string(), i);
                i
            }
        };

        let row = &mut self.rows[i];
        fill_first(&mut row.meta.title, meta.title);
        fill_first(&mut row.meta.abstract_text, meta.abstract_text);
        fill_first(&mut row.meta.funder, meta.funder);
        fill_first(&mut row.meta.date, meta.date);
        row.terms.insert(term.to_string());
    }

    /// Write the table as CSV: `id`, the four metadata columns, then one
    /// `<term>_found` column per catalog entry in discovery order.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let mut header = vec!["id".to_string()];
        header.extend(METADATA_FIELDS.iter().map(|f| f.to_string()));
        header.extend(self.terms.iter().map(|t| format!("{t}{TERM_COLUMN_SUFFIX}")));
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.id.clone(),
                row.meta.title.clone().unwrap_or_default(),
                row.meta.abstract_text.clone().unwrap_or_default(),
                row.meta.funder.clone().unwrap_or_default(),
                row.meta.date.clone().unwrap_or_default(),
            ];
            for term in &self.terms {
                if row.terms.contains(term) {
                    record.push(term.clone());
                } else {
                    record.push(String::new());
                }
            }
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Read a table previously written by `write_csv`. Term columns are
    /// discovered from the header; columns absent from the header were
    /// never observed and simply do not enter the catalog.
    pub fn read_csv(path: &Path) -> Result<RecordTable> {
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let headers = rdr.headers()?.clone();
        let mut meta_cols: HashMap<&str, usize> = HashMap::new();
        let mut term_cols: Vec<(usize, String)> = Vec::new();
        for (i, name) in headers.iter().enumerate() {
            if i == 0 {
                continue; // identifier column
            }
            if METADATA_FIELDS.contains(&name) {
                meta_cols.insert(name, i);
            } else if let Some(term) = name.strip_suffix(TERM_COLUMN_SUFFIX) {
                term_cols.push((i, term.to_string()));
            }
        }

        let mut table = RecordTable::new();
        for (_, term) in &term_cols {
            table.ensure_term(term);
        }

        let cell = |rec: &csv::StringRecord, i: usize| -> Option<String> {
            rec.get(i).filter(|v| !v.is_empty()).map(|v| v.to_string())
        };

        for result in rdr.records() {
            let record = result?;
            let Some(id) = record.get(0).filter(|v| !v.is_empty()) else {
                continue;
            };
            let id = id.to_string();
            // One row per identifier, same as during extraction; a repeated
            // id in a hand-edited file keeps its first row.
            if table.index.contains_key(&id) {
                warn!("{}: duplicate identifier {id}, keeping first row", path.display());
                continue;
            }
            let meta = RecordMeta {
                title: meta_cols.get("title").and_then(|&i| cell(&record, i)),
                abstract_text: meta_cols.get("abstract").and_then(|&i| cell(&record, i)),
                funder: meta_cols.get("funder").and_then(|&i| cell(&record, i)),
                date: meta_cols.get("date").and_then(|&i| cell(&record, i)),
            };

            let mut terms = HashSet::new();
            for (i, term) in &term_cols {
                if cell(&record, *i).is_some() {
                    terms.insert(term.clone());
                }
            }

            let pos = table.rows.len();
            table.index.insert(id.clone(), pos);
            table.rows.push(Row { id, meta, terms });
        }

        Ok(table)
    }
}

fn fill_first(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        if let Some(v) = value {
            *slot = Some(v);
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: Option<&str>, date: Option<&str>) -> RecordMeta {
        RecordMeta {
            title: title.map(|s| s.to_string()),
            abstract_text: None,
            funder: None,
            date: date.map(|s| s.to_string()),
        }
    }

    #[test]
    fn upsert_creates_row_and_sets_flag() {
        let mut t = RecordTable::new();
        t.upsert("id-1", meta(Some("A title"), Some("2015")), "simulation");
        assert_eq!(t.len(), 1);
        let row = t.get("id-1").unwrap();
        assert_eq!(row.meta.title.as_deref(), Some("A title"));
        assert!(row.terms.contains("simulation"));
        assert_eq!(t.terms(), ["simulation".to_string()]);
    }

    #[test]
    fn first_write_wins_for_metadata_flags_accumulate() {
        let mut t = RecordTable::new();
        t.upsert("id-1", meta(None, Some("2015")), "simulation");
        t.upsert("id-1", meta(Some("Late title"), Some("1999")), "python");
        let row = t.get("id-1").unwrap();
        // date came first, title was filled by the later occurrence
        assert_eq!(row.meta.date.as_deref(), Some("2015"));
        assert_eq!(row.meta.title.as_deref(), Some("Late title"));
        assert!(row.terms.contains("simulation"));
        assert!(row.terms.contains("python"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn reprocessing_same_term_is_idempotent() {
        let mut t = RecordTable::new();
        t.upsert("id-1", meta(Some("A"), None), "simulation");
        t.upsert("id-1", meta(Some("A"), None), "simulation");
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("id-1").unwrap().terms.len(), 1);
        assert_eq!(t.terms().len(), 1);
    }

    #[test]
    fn row_and_column_order_is_insertion_order() {
        let mut t = RecordTable::new();
        t.upsert("b", meta(None, None), "zebra");
        t.upsert("a", meta(None, None), "apple");
        let ids: Vec<&str> = t.rows().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(t.terms(), ["zebra".to_string(), "apple".to_string()]);
    }

    #[test]
    fn csv_round_trip_preserves_shape() {
        let mut t = RecordTable::new();
        t.upsert(
            "10.1/x",
            RecordMeta {
                title: Some("T, with comma".into()),
                abstract_text: Some("An abstract".into()),
                funder: Some("EPSRC".into()),
                date: Some("03/04/2015".into()),
            },
            "simulation",
        );
        t.upsert("10.1/y", meta(None, None), "python");

        let path = std::env::temp_dir().join("eprints_table_round_trip.csv");
        t.write_csv(&path).unwrap();
        let back = RecordTable::read_csv(&path).unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back.terms(), t.terms());
        let row = back.get("10.1/x").unwrap();
        assert_eq!(row.meta.title.as_deref(), Some("T, with comma"));
        assert_eq!(row.meta.funder.as_deref(), Some("EPSRC"));
        assert!(row.terms.contains("simulation"));
        assert!(!row.terms.contains("python"));
        assert!(back.get("10.1/y").unwrap().meta.title.is_none());
    }

    #[test]
    fn read_csv_keeps_first_row_for_duplicated_identifier() {
        let path = std::env::temp_dir().join("eprints_table_dup_id.csv");
        std::fs::write(
            &path,
            "id,title,abstract,funder,date,simulation_found\n\
             dup-1,First title,,,2015,simulation\n\
             dup-1,Second title,,,,\n\
             other,,,,2016,simulation\n",
        )
        .unwrap();

        let table = RecordTable::read_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        let row = table.get("dup-1").unwrap();
        assert_eq!(row.meta.title.as_deref(), Some("First title"));
        assert!(row.terms.contains("simulation"));
    }
}
