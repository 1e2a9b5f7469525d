// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// The document root could not be enumerated. This is the only error that
/// stops a run before any document is processed.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("document root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("document root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A single document could not be turned into flat content.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("PDF is scanned / image-only")]
    ScannedImage,

    #[error("failed to open workbook: {0}")]
    Workbook(String),

    #[error("workbook has no sheets")]
    EmptyWorkbook,

    #[error("unsupported file extension: {0:?}")]
    UnsupportedFormat(PathBuf),

    #[error("parse exceeded {0}s time budget")]
    Timeout(u64),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Why a document made no contribution to the aggregate.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no numeric candidates in document")]
    NoNumericCandidates,

    #[error("no TOTAL row with a numeric value")]
    NoTotalRowFound,

    #[error("no candidate divides the total {total} (candidates: {candidates:?})")]
    AmbiguousRate { total: f64, candidates: Vec<f64> },

    #[error("{usd:.2} USD (raw {raw:.2}) outside plausibility band")]
    OutOfPlausibilityRange { raw: f64, usd: f64 },
}

impl SkipReason {
    /// Short stable label used as a key in the run report.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Extraction(_) => "extraction_error",
            SkipReason::NoNumericCandidates => "no_numeric_candidates",
            SkipReason::NoTotalRowFound => "no_total_row",
            SkipReason::AmbiguousRate { .. } => "ambiguous_rate",
            SkipReason::OutOfPlausibilityRange { .. } => "out_of_range",
        }
    }
}

/// Errors that abort a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error("config error: {0}")]
    Config(String),

    #[error("artifact I/O error at {path:?}: {source}")]
    ArtifactIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("artifact serialization error: {0}")]
    ArtifactFormat(#[from] serde_json::Error),

    #[error("aggregation task failed: {0}")]
    Worker(String),

    #[error("run interrupted before publish")]
    Interrupted,
}

impl PipelineError {
    pub fn artifact_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            source,
        }
    }
}
