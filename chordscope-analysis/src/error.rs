//! Error types for the analysis pipeline
//!
//! Error strategy:
//! - Fatal (`AnalysisError`): missing file or undecodable audio, no result
//! - Degraded (`StageError`): one stage failed, its default is substituted

use crate::provider::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure that aborts an analysis run
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to load audio file '{}': {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
}

/// Failure contained at a stage boundary
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No key reached the minimum occurrence of {0:.2}")]
    NoKeyAboveThreshold(f32),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(f32),
    #[error("No analysable chord spans")]
    NoChordSpans,
}

/// Result type alias for stage computations
pub type StageResult<T> = std::result::Result<T, StageError>;
