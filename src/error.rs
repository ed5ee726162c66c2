use std::path::PathBuf;

use thiserror::Error;

/// File-level failures during the extraction scan. Record-level anomalies
/// (missing identifier, unparseable date) are logged and skipped instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("unexpected XML namespace in {path}: expected {expected}, found {found}")]
    Namespace {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

impl ExtractError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ExtractError::Io { path, .. }
            | ExtractError::Parse { path, .. }
            | ExtractError::Namespace { path, .. } => path,
        }
    }
}
