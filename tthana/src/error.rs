use hepcore::btag::pdf::PdfError;
use thiserror::Error;

/// Errors that abort a run. Per-event conditions are not errors, they are
/// skip outcomes counted by the pipeline statistics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("probability table error: {0}")]
    Pdf(#[from] PdfError),

    #[error("invalid cut criterion '{0}'")]
    CutCriterion(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
