use std::ops::RangeInclusive;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

/// What to do when a term file fails to parse as XML. Default is abort,
/// since the downstream aggregates assume a complete scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    Abort,
    Skip,
}

/// One funder vocabulary entry: a canonical short code plus the surface
/// forms (full name, abbreviation) recognised in free-text funder fields.
/// Declaration order is the tie-break when a string matches several entries.
#[derive(Debug, Clone, Deserialize)]
pub struct FunderEntry {
    pub code: String,
    pub forms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the XML export: one subdirectory per repository site,
    /// one `<term>.xml` file per search term inside each.
    pub xml_data_dir: PathBuf,
    /// Where the extracted metadata table is written/read.
    pub metadata_file: PathBuf,
    /// Directory of per-repository yearly totals CSVs.
    pub yearly_repo_dir: PathBuf,
    pub output_csv_dir: PathBuf,
    pub output_png_dir: PathBuf,
    /// Inclusive year window for year-based aggregates.
    pub year_min: i32,
    pub year_max: i32,
    /// Drop rows outside the year window during cleaning. When false the
    /// rows are kept and the window is applied inside the aggregates only.
    pub filter_years: bool,
    /// Search terms whose files are skipped without being opened.
    pub ignore_terms: Vec<String>,
    pub on_parse_error: ParseErrorPolicy,
    pub funders: Vec<FunderEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            xml_data_dir: PathBuf::from("data/eprints-data-xml"),
            metadata_file: PathBuf::from("final_df.csv"),
            yearly_repo_dir: PathBuf::from("yearly_repo_data"),
            output_csv_dir: PathBuf::from("analysis_output/csv"),
            output_png_dir: PathBuf::from("analysis_output/png"),
            year_min: 2000,
            year_max: 2017,
            filter_years: true,
            ignore_terms: vec!["model".into(), "regression".into(), "excel".into()],
            on_parse_error: ParseErrorPolicy::Abort,
            funders: default_funders(),
        }
    }
}

impl Settings {
    /// Load settings from an optional config file plus EPRINTS_* environment
    /// variables, falling back to the built-in defaults.
    pub fn load(file: Option<&str>) -> Result<Settings> {
        let cfg = Config::builder()
            .add_source(config::File::with_name(file.unwrap_or("analysis")).required(file.is_some()))
            .add_source(config::Environment::with_prefix("EPRINTS"))
            .build()
            .context("failed to read settings")?;
        cfg.try_deserialize().context("invalid settings")
    }

    pub fn year_window(&self) -> RangeInclusive<i32> {
        self.year_min..=self.year_max
    }

    pub fn is_ignored_term(&self, term: &str) -> bool {
        self.ignore_terms.iter().any(|t| t == term)
    }

    /// Canonical codes in declaration order; the default subset for the
    /// by-funder aggregation.
    pub fn funder_codes(&self) -> Vec<String> {
        self.funders.iter().map(|f| f.code.clone()).collect()
    }
}

/// The seven UK research councils tracked by the original survey.
fn default_funders() -> Vec<FunderEntry> {
    [
        ("EPSRC", "Engineering and Physical Sciences Research Council"),
        ("BBSRC", "Biotechnology and Biological Sciences Research Council"),
        ("ESRC", "Economic and Social Research Council"),
        ("NERC", "Natural Environment Research Council"),
        ("AHRC", "Arts and Humanities Research Council"),
        ("STFC", "Science and Technology Facilities Council"),
        ("MRC", "Medical Research Council"),
    ]
    .into_iter()
    .map(|(code, full)| FunderEntry {
        code: code.to_string(),
        forms: vec![full.to_string(), code.to_string()],
    })
    .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_original_constants() {
        let s = Settings::default();
        assert_eq!(s.year_window(), 2000..=2017);
        assert!(s.is_ignored_term("model"));
        assert!(s.is_ignored_term("regression"));
        assert!(s.is_ignored_term("excel"));
        assert!(!s.is_ignored_term("simulation"));
        assert_eq!(s.funders.len(), 7);
        assert_eq!(s.funders[0].code, "EPSRC");
        assert_eq!(s.on_parse_error, ParseErrorPolicy::Abort);
    }

    #[test]
    fn funder_forms_include_code_and_full_name() {
        let s = Settings::default();
        let mrc = s.funders.iter().find(|f| f.code == "MRC").unwrap();
        assert!(mrc.forms.contains(&"Medical Research Council".to_string()));
        assert!(mrc.forms.contains(&"MRC".to_string()));
    }
}
