//! Feature provider abstraction
//!
//! The analysis core never decodes audio or computes spectra itself. A
//! `FeatureProvider` supplies waveforms, harmonic/percussive components,
//! chroma frames and beat positions; the core only consumes their output
//! shapes.

use crate::pitch::PITCH_CLASSES;
use std::path::Path;
use thiserror::Error;

/// One chroma frame: energy per pitch class (C=0 .. B=11)
pub type ChromaFrame = [f32; PITCH_CLASSES];

/// Errors reported by a feature provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to load audio: {0}")]
    Load(String),
    #[error("Signal too short: {0}")]
    TooShort(String),
    #[error("No rhythmic content detected")]
    NoOnsets,
    #[error("Feature extraction failed: {0}")]
    Extraction(String),
}

/// Signal-processing collaborator used by the pipeline
pub trait FeatureProvider: Send + Sync {
    /// Name of this provider (for logging)
    fn name(&self) -> &'static str;

    /// Decode an audio file, resampled to `sample_rate`
    ///
    /// Returns the samples and the rate they are actually at. When `mono` is
    /// set, channels are averaged into one.
    fn load(
        &self,
        path: &Path,
        sample_rate: u32,
        mono: bool,
    ) -> Result<(Vec<f32>, u32), ProviderError>;

    /// Split a signal into (harmonic, percussive) components of equal length
    fn harmonic_percussive_split(
        &self,
        signal: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>), ProviderError>;

    /// Chroma frames at the given hop length
    fn chroma_features(
        &self,
        signal: &[f32],
        sample_rate: u32,
        hop_length: usize,
    ) -> Result<Vec<ChromaFrame>, ProviderError>;

    /// Tempo in BPM and beat positions in seconds relative to the signal start
    fn detect_beats(&self, signal: &[f32], sample_rate: u32)
        -> Result<(f32, Vec<f64>), ProviderError>;
}
