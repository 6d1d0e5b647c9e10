use crate::excel::CellRef;
use std::path::PathBuf;
use thiserror::Error;

pub type CostResult<T> = Result<T, CostError>;

#[derive(Error, Debug)]
pub enum CostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Failures raised by the template exporter.
///
/// `CellWriteSkipped` never aborts an export; it is collected into
/// [`crate::excel::FillReport::skipped`] instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error(
        "template file not found: {}\nPlace the cost sheet template at this path and try again.",
        .0.display()
    )]
    TemplateNotFound(PathBuf),

    #[error("cell {0} is inside a merged region, write skipped")]
    CellWriteSkipped(CellRef),

    #[error("export failed: {0}")]
    Unexpected(String),
}

impl ExportError {
    /// Wrap an underlying error, keeping its full `source()` chain in the detail
    pub fn unexpected(context: &str, err: &dyn std::error::Error) -> Self {
        let mut detail = format!("{context}: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
        ExportError::Unexpected(detail)
    }
}
