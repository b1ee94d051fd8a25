//! Pipeline tunables

use serde::{Deserialize, Serialize};

/// Numeric parameters of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate the provider resamples to (Hz)
    pub sample_rate: u32,
    /// Chroma hop for key windows
    pub key_hop_length: usize,
    /// Length of one key window (seconds)
    pub key_segment_secs: f64,
    /// Key windows shorter than this are not estimated
    pub min_key_segment_secs: f64,
    /// Keys winning fewer windows than this fraction are dropped
    pub min_key_occurrence: f32,
    /// Length of the window chords are detected in (seconds)
    pub chord_window_secs: f64,
    /// RMS frame and hop for segment selection
    pub segment_frame_length: usize,
    pub segment_hop_length: usize,
    /// Span width when there are too few beats (seconds)
    pub fixed_chord_span_secs: f64,
    /// Chord spans with fewer samples are skipped
    pub min_span_samples: usize,
    /// Chroma hop for chord spans
    pub chord_hop_length: usize,
    pub beats_per_bar: usize,
    /// Beats needed before spans follow bars
    pub min_beats: usize,
    /// Tempo reported when beat tracking fails
    pub default_tempo: f32,
    /// Length of the single chord reported when chord detection fails
    pub fallback_chord_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            key_hop_length: 512,
            key_segment_secs: 15.0,
            min_key_segment_secs: 5.0,
            min_key_occurrence: 0.15,
            chord_window_secs: 30.0,
            segment_frame_length: 2048,
            segment_hop_length: 512,
            fixed_chord_span_secs: 2.0,
            min_span_samples: 1024,
            chord_hop_length: 256,
            beats_per_bar: 4,
            min_beats: 4,
            default_tempo: 120.0,
            fallback_chord_secs: 4.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.key_segment_secs, 15.0);
        assert_eq!(config.chord_window_secs, 30.0);
        assert_eq!(config.default_tempo, 120.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"sample_rate": 44100, "min_beats": 8}"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.min_beats, 8);
        assert_eq!(config.chord_hop_length, 256);
    }
}
