//! Error types for the aggregation pipeline.

use thiserror::Error;

use crate::db::DbError;

/// Top-level error for an aggregation run.
///
/// Only two conditions are hard failures by design: an empty input set and
/// filtering with no clusters. Everything else inside the components degrades
/// to skipped records or fallback scoring instead of propagating here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no completed messages in store; nothing to aggregate")]
    NoInput,

    #[error("no clusters available to filter")]
    NoClusters,

    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("failed to write output: {0}")]
    Output(String),
}

impl PipelineError {
    /// Get a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PipelineError::NoInput => {
                "Run the enrichment stage first so the store has completed messages."
            }
            PipelineError::NoClusters => {
                "Aggregation produced no project clusters; check the extraction data."
            }
            PipelineError::Store(_) => "Check the store path and file permissions.",
            PipelineError::Output(_) => "Check file permissions and disk space.",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Output(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Output(err.to_string())
    }
}
