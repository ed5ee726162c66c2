use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::aggregate::{self, LabelCount, Pivot, YearCount};
use crate::chart;
use crate::clean;
use crate::settings::Settings;
use crate::table::RecordTable;
use crate::totals;

pub struct AnalysisSummary {
    pub total_records: u64,
    pub software_records: usize,
}

impl AnalysisSummary {
    pub fn print(&self) {
        println!("\nTotal number of records: {}", self.total_records);
        println!(
            "Total number of valid software-related records: {}",
            self.software_records
        );
        if self.total_records > 0 {
            let pct = self.software_records as f64 / self.total_records as f64 * 100.0;
            println!("Overall percentage of software-related records: {:.1}%", pct);
        }
    }
}

/// The analyse phase: load and clean the extracted metadata table, merge
/// the repository totals, then write the aggregate CSVs and bar charts.
pub fn run_analyse(settings: &Settings) -> Result<AnalysisSummary> {
    let table = RecordTable::read_csv(&settings.metadata_file)?;
    info!(
        "Loaded {} records, {} term columns from {}",
        table.len(),
        table.terms().len(),
        settings.metadata_file.display()
    );

    let cleaned = clean::clean(&table, settings);
    let totals = totals::merge_totals(&settings.yearly_repo_dir)?;

    fs::create_dir_all(&settings.output_csv_dir)
        .with_context(|| format!("failed to create {}", settings.output_csv_dir.display()))?;
    fs::create_dir_all(&settings.output_png_dir)
        .with_context(|| format!("failed to create {}", settings.output_png_dir.display()))?;

    let csv_path = |name: &str| -> PathBuf { settings.output_csv_dir.join(format!("{name}.csv")) };
    let png_path = |name: &str| -> PathBuf { settings.output_png_dir.join(format!("{name}.png")) };

    totals.write_csv(&csv_path("repo-info-all"))?;

    let window = settings.year_window();
    let subset = settings.funder_codes();

    // By year, with share of the total repository volume.
    let yearly = aggregate::count_by_year(&cleaned, window.clone(), &totals);
    write_year_csv(&yearly, &csv_path("artifacts_by_year"))?;
    let bars: Vec<(String, f64)> = yearly
        .iter()
        .map(|c| (c.year.to_string(), c.percentage.unwrap_or(0.0)))
        .collect();
    chart::save_bar_chart(
        &png_path("artifacts_by_year"),
        "Software-related artifacts by year",
        "Year",
        "% EPrints software-related artifacts",
        &bars,
        true,
    )?;

    // By funder, within the configured subset.
    let funders = aggregate::count_by_funder(&cleaned, &subset);
    write_label_csv(&funders, "funder", &csv_path("artifacts_by_funder"))?;
    let bars: Vec<(String, f64)> = funders
        .iter()
        .map(|c| (c.label.clone(), c.count as f64))
        .collect();
    chart::save_bar_chart(
        &png_path("artifacts_by_funder"),
        "Software-related artifacts by funder",
        "Funder",
        "# EPrints software-related artifacts",
        &bars,
        false,
    )?;

    // By search term.
    let terms = aggregate::count_by_term(&cleaned);
    write_label_csv(&terms, "term", &csv_path("artifacts_by_term"))?;

    // Two-dimensional pivots.
    let by_year_term = aggregate::counts_by_year_and_term(&cleaned, window.clone());
    write_pivot_csv(&by_year_term, &csv_path("artifacts_by_year_and_term"))?;
    let by_year_funder = aggregate::counts_by_year_and_funder(&cleaned, window, &subset);
    write_pivot_csv(&by_year_funder, &csv_path("artifacts_by_year_and_funder"))?;

    Ok(AnalysisSummary {
        total_records: totals.grand_total(),
        software_records: cleaned.rows.len(),
    })
}

fn write_year_csv(rows: &[YearCount], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(["year", "count", "total_count", "percentage"])?;
    for c in rows {
        wtr.write_record([
            c.year.to_string(),
            c.count.to_string(),
            c.total.map(|t| t.to_string()).unwrap_or_default(),
            c.percentage.map(|p| format!("{p:.1}")).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_label_csv(rows: &[LabelCount], key: &str, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record([key, "count"])?;
    for c in rows {
        wtr.write_record([c.label.clone(), c.count.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_pivot_csv(pivot: &Pivot, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut header = vec!["year".to_string()];
    header.extend(pivot.columns.iter().cloned());
    wtr.write_record(&header)?;
    for (year, values) in &pivot.rows {
        let mut record = vec![year.to_string()];
        record.extend(values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Tests ──
