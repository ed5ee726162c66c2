pub mod eprint;

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::ExtractError;
use crate::settings::{ParseErrorPolicy, Settings};
use crate::table::RecordTable;

#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_parsed: usize,
    pub files_ignored: usize,
    pub files_failed: usize,
    pub records_seen: usize,
    pub missing_ids: usize,
}

impl ScanStats {
    pub fn print(&self, table: &RecordTable) {
        println!(
            "Parsed {} term files ({} ignored, {} failed): {} records seen, {} without id, {} unique.",
            self.files_parsed,
            self.files_ignored,
            self.files_failed,
            self.records_seen,
            self.missing_ids,
            table.len(),
        );
    }
}

/// Scan the XML export and build the deduplicated record table.
///
/// Subdirectories of `root` are repository sites, files inside are one XML
/// document per search term. Both are visited in sorted order so that row
/// and column insertion order is reproducible. Files whose term is in the
/// ignore set are skipped without being opened.
pub fn extract(root: &Path, settings: &Settings) -> Result<(RecordTable, ScanStats), ExtractError> {
    let work = list_term_files(root)?;

    let pb = ProgressBar::new(work.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut table = RecordTable::new();
    let mut stats = ScanStats::default();
    let mut last_site = String::new();

    for (site, path) in &work {
        if *site != last_site {
            info!("Processing {site}...");
            last_site = site.clone();
        }
        pb.set_message(site.clone());

        let term = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => {
                pb.inc(1);
                continue;
            }
        };

        // Short-circuit: ignored terms are never parsed, even if malformed.
        if settings.is_ignored_term(&term) {
            stats.files_ignored += 1;
            pb.inc(1);
            continue;
        }

        let records = match eprint::parse_term_file(path) {
            Ok(records) => records,
            Err(err) => match settings.on_parse_error {
                ParseErrorPolicy::Abort => {
                    pb.finish_and_clear();
                    return Err(err);
                }
                ParseErrorPolicy::Skip => {
                    warn!("skipping {}: {err}", err.path().display());
                    stats.files_failed += 1;
                    pb.inc(1);
                    continue;
                }
            },
        };

        stats.files_parsed += 1;
        for record in records {
            stats.records_seen += 1;
            match record.id {
                Some(id) => table.upsert(&id, record.meta, &term),
                None => {
                    warn!("{}: eprint record without id_number, skipped", path.display());
                    stats.missing_ids += 1;
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok((table, stats))
}

/// List `(site, term file)` pairs in sorted site then file order. Only
/// regular `.xml` files are considered term files.
fn list_term_files(root: &Path) -> Result<Vec<(String, PathBuf)>, ExtractError> {
    let io_err = |path: &Path, source: std::io::Error| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut sites: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|e| io_err(root, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    sites.sort();

    let mut work = Vec::new();
    for site_dir in sites {
        let site = site_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&site_dir)
            .map_err(|e| io_err(&site_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        files.sort();
        work.extend(files.into_iter().map(|f| (site.clone(), f)));
    }

    Ok(work)
}

// ── Tests ──
