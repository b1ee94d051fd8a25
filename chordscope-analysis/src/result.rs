//! Analysis result model
//!
//! Field names serialize in camelCase to match the JSON contract consumed by
//! the scale/chord suggestion front end.

use crate::chord::ChordQuality;
use crate::pitch::{Mode, PitchClass};
use crate::pipeline::Stage;
use crate::scale::ScaleMatch;
use serde::{Deserialize, Serialize};

/// A key reported by the modulation aggregator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedKey {
    #[serde(rename = "key")]
    pub root: PitchClass,
    #[serde(rename = "scale")]
    pub mode: Mode,
    /// Mean key confidence over the windows that voted for this key
    pub confidence: f32,
    /// Fraction of analysed windows in which this key won
    pub occurrence: f32,
}

/// One chord over a time range of the original track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordSpan {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(rename = "chord")]
    pub label: String,
    pub root_note: PitchClass,
    pub quality: ChordQuality,
    pub confidence: f32,
}

impl ChordSpan {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Track-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// Full track duration in seconds
    pub duration: f64,
    /// Tempo in BPM
    pub tempo: f32,
    pub time_signature: String,
    /// Primary key root
    pub detected_key: PitchClass,
    /// Primary key mode
    pub scale: Mode,
    pub confidence: f32,
    /// All reported keys, present only when the track modulates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_keys: Option<Vec<DetectedKey>>,
}

/// Ranked scale suggestions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleMatchResult {
    pub matching_scales: Vec<ScaleMatch>,
}

/// Paths of separated stems (reserved, never produced)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemPaths {
    pub vocals: String,
    pub drums: String,
    pub bass: String,
    pub other: String,
}

/// Complete output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub metadata: AnalysisMetadata,
    pub chord_progression: Vec<ChordSpan>,
    pub scale_match: ScaleMatchResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stems: Option<StemPaths>,
    /// Stages that fell back to their default value
    #[serde(skip)]
    pub degraded_stages: Vec<Stage>,
}

impl AnalysisResult {
    /// True when every stage produced its own value
    pub fn is_complete(&self) -> bool {
        self.degraded_stages.is_empty()
    }
}
