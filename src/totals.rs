use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Per-year artefact totals across all repositories: one row per year, one
/// column per repository file, plus the derived `total_count` column. This
/// supplies the denominator for the yearly percentage computation.
#[derive(Debug, Default)]
pub struct TotalsTable {
    repos: Vec<String>,
    counts: BTreeMap<i32, HashMap<String, u64>>,
}

impl TotalsTable {
    pub fn repos(&self) -> &[String] {
        &self.repos
    }

    /// Add a repository column (idempotent). Columns appear in the order
    /// they are registered, which the merge keeps sorted by filename.
    pub fn register_repo(&mut self, repo: &str) {
        if !self.repos.iter().any(|r| r == repo) {
            self.repos.push(repo.to_string());
        }
    }

    pub fn insert(&mut self, repo: &str, year: i32, count: u64) {
        self.register_repo(repo);
        self.counts
            .entry(year)
            .or_default()
            .insert(repo.to_string(), count);
    }

    /// Total artefacts across all repositories for one year; None when the
    /// year appears in no repository file.
    pub fn total_for_year(&self, year: i32) -> Option<u64> {
        self.counts.get(&year).map(|row| row.values().sum())
    }

    /// Grand total across every repository and year.
    pub fn grand_total(&self) -> u64 {
        self.counts
            .values()
            .map(|row| row.values().sum::<u64>())
            .sum()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let mut header = vec!["year".to_string()];
        header.extend(self.repos.iter().cloned());
        header.push("total_count".to_string());
        wtr.write_record(&header)?;

        for (year, row) in &self.counts {
            let mut record = vec![year.to_string()];
            let mut total = 0u64;
            for repo in &self.repos {
                let count = row.get(repo).copied().unwrap_or(0);
                total += count;
                record.push(count.to_string());
            }
            record.push(total.to_string());
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

/// Merge the per-repository yearly totals CSVs (a `year` index and an
/// `artefacts` column each) found in `dir`. Repositories missing a year
/// simply contribute nothing to it.
pub fn merge_totals(dir: &Path) -> Result<TotalsTable> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();

    let mut table = TotalsTable::default();
    for path in files {
        let repo = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        info!("Merging yearly repo data from {repo}...");
        table.register_repo(&repo);
        merge_one(&mut table, &path, &repo)
            .with_context(|| format!("failed to merge {}", path.display()))?;
    }

    Ok(table)
}

fn merge_one(table: &mut TotalsTable, path: &Path, repo: &str) -> Result<()> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let artefacts_col = headers
        .iter()
        .position(|h| h == "artefacts")
        .with_context(|| format!("no 'artefacts' column in {}", path.display()))?;

    for result in rdr.records() {
        let record = result?;
        let Some(year) = record.get(0).and_then(|v| v.trim().parse::<i32>().ok()) else {
            warn!("{}: skipping row with unparseable year", path.display());
            continue;
        };
        let count = record
            .get(artefacts_col)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        table.insert(repo, year, count);
    }

    Ok(())
}

// ── Tests ──
