//! Musical structure analysis for chordscope
//!
//! Estimates key (with modulations), tempo, a chord progression and ranked
//! scale suggestions from the features a `FeatureProvider` supplies.

mod chord;
mod config;
mod error;
mod key;
mod modulation;
mod pipeline;
mod pitch;
mod provider;
mod result;
mod scale;
mod segment;
mod sequencer;

pub use chord::{chord_label, vocabulary, ChordMatch, ChordMatcher, ChordQuality, ScaleDegree};
pub use config::PipelineConfig;
pub use error::{AnalysisError, StageError, StageResult};
pub use key::{KeyEstimate, KeyEstimator};
pub use modulation::{aggregate, KeyDetection, KeyObservation, ModulationAggregator};
pub use pipeline::{demo_result, fallback_chords, AnalysisOptions, Analyzer, Engine, Stage};
pub use pitch::{Mode, PitchClass, PitchClassProfile, PITCH_CLASSES};
pub use provider::{ChromaFrame, FeatureProvider, ProviderError};
pub use result::{
    AnalysisMetadata, AnalysisResult, ChordSpan, DetectedKey, ScaleMatchResult, StemPaths,
};
pub use scale::{rank_scales, ScaleMatch, ScaleName};
pub use segment::{Segment, SegmentSelector};
pub use sequencer::{bar_spans, fixed_spans, merge_consecutive, ChordSequencer, TimeSpan};
