//! Analysis orchestration
//!
//! Runs the stages in order and keeps going when one of them fails:
//!
//! | Stage | Default on failure |
//! |---|---|
//! | load | none, the run aborts |
//! | harmonic split | unsplit waveform |
//! | key detection | C major, confidence 0.5 |
//! | segment selection | first 30 s of waveform and harmonic signal |
//! | tempo detection | 120 BPM, no beats |
//! | chord detection | one 4 s chord on the key root |
//! | scale matching | no suggestions |

use crate::chord::{chord_label, ChordQuality};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, StageError, StageResult};
use crate::modulation::{KeyDetection, ModulationAggregator};
use crate::pitch::{Mode, PitchClass};
use crate::provider::FeatureProvider;
use crate::result::{AnalysisMetadata, AnalysisResult, ChordSpan, ScaleMatchResult};
use crate::scale::{rank_scales, ScaleMatch, ScaleName};
use crate::segment::{Segment, SegmentSelector};
use crate::sequencer::ChordSequencer;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Time signature reported for every track
const TIME_SIGNATURE: &str = "4/4";

/// Confidence of the default key and the fallback chord
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// A recoverable step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    HarmonicSplit,
    KeyDetection,
    SegmentSelection,
    TempoDetection,
    ChordDetection,
    ScaleMatching,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 7] = [
        Stage::Load,
        Stage::HarmonicSplit,
        Stage::KeyDetection,
        Stage::SegmentSelection,
        Stage::TempoDetection,
        Stage::ChordDetection,
        Stage::ScaleMatching,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::HarmonicSplit => "harmonic split",
            Stage::KeyDetection => "key detection",
            Stage::SegmentSelection => "segment selection",
            Stage::TempoDetection => "tempo detection",
            Stage::ChordDetection => "chord detection",
            Stage::ScaleMatching => "scale matching",
        }
    }

    /// Whether a failure here aborts the run
    pub fn is_fatal(self) -> bool {
        matches!(self, Stage::Load)
    }

    /// What replaces the stage's output when it fails
    pub fn fallback_description(self) -> &'static str {
        match self {
            Stage::Load => "none (analysis aborted)",
            Stage::HarmonicSplit => "unsplit waveform",
            Stage::KeyDetection => "C major, confidence 0.5",
            Stage::SegmentSelection => "first 30 s of the track",
            Stage::TempoDetection => "120 BPM without beats",
            Stage::ChordDetection => "one 4 s chord on the key root",
            Stage::ScaleMatching => "no scale suggestions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which analysis engine to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// The default provider
    #[default]
    Standard,
    /// The higher-precision provider, falling back to standard on failure
    Precise,
    /// Canned demonstration result, no decoding
    Demo,
}

impl Engine {
    pub fn name(self) -> &'static str {
        match self {
            Engine::Standard => "standard",
            Engine::Precise => "precise",
            Engine::Demo => "demo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Engine::Standard),
            "precise" => Some(Engine::Precise),
            "demo" => Some(Engine::Demo),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalysisOptions {
    pub engine: Engine,
    /// Stem separation is not available; requesting it is only logged
    pub separate_stems: bool,
}

/// Analysis window chosen for chord detection
struct ChordWindow {
    segment: Segment,
    harmonic: Vec<f32>,
}

/// Runs the full analysis of one file
pub struct Analyzer {
    standard: Arc<dyn FeatureProvider>,
    precise: Option<Arc<dyn FeatureProvider>>,
    config: PipelineConfig,
}

impl Analyzer {
    /// Analyzer with the standard provider and default tunables
    pub fn new(standard: Arc<dyn FeatureProvider>) -> Self {
        Self {
            standard,
            precise: None,
            config: PipelineConfig::default(),
        }
    }

    /// Install the provider used by `Engine::Precise`
    pub fn with_precise(mut self, precise: Arc<dyn FeatureProvider>) -> Self {
        self.precise = Some(precise);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze an audio file
    ///
    /// Fails only when the file is missing or cannot be decoded; every other
    /// stage failure is replaced by that stage's default.
    pub fn analyze(
        &self,
        path: &Path,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::FileNotFound(path.to_path_buf()));
        }

        if options.separate_stems {
            info!("Stem separation requested but not available, skipping");
        }

        match options.engine {
            Engine::Demo => {
                info!("Returning demonstration result for {}", path.display());
                Ok(demo_result())
            }
            Engine::Standard => self.run(self.standard.as_ref(), path),
            Engine::Precise => match &self.precise {
                Some(precise) => self.run(precise.as_ref(), path).or_else(|e| {
                    warn!(
                        "{} engine failed ({}), retrying with {}",
                        precise.name(),
                        e,
                        self.standard.name()
                    );
                    self.run(self.standard.as_ref(), path)
                }),
                None => {
                    debug!("No precise provider installed, using standard");
                    self.run(self.standard.as_ref(), path)
                }
            },
        }
    }

    /// One full pass over the stages with a single provider
    fn run(
        &self,
        provider: &dyn FeatureProvider,
        path: &Path,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let config = &self.config;
        let mut degraded = Vec::new();

        info!("Analyzing {} with {} provider", path.display(), provider.name());

        // Load (fatal)
        let (signal, sample_rate) = provider
            .load(path, config.sample_rate, true)
            .map_err(|e| AnalysisError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if sample_rate == 0 {
            return Err(AnalysisError::Load {
                path: path.to_path_buf(),
                reason: "decoder reported a sample rate of 0".into(),
            });
        }
        let duration = signal.len() as f64 / sample_rate as f64;
        info!("Loaded {:.2}s at {} Hz", duration, sample_rate);

        // Harmonic/percussive split of the full track
        let harmonic = recover(
            Stage::HarmonicSplit,
            split_harmonic(provider, &signal),
            &mut degraded,
            || signal.clone(),
        );

        // Keys over the full harmonic signal
        let modulation = ModulationAggregator::new(
            config.key_segment_secs,
            config.min_key_segment_secs,
            config.min_key_occurrence,
            config.key_hop_length,
        );
        let keys = recover(
            Stage::KeyDetection,
            modulation.detect(provider, &harmonic, sample_rate),
            &mut degraded,
            || KeyDetection::single(PitchClass::C, Mode::Major, FALLBACK_CONFIDENCE),
        );
        let primary = *keys.primary();
        info!(
            "Key: {} {} ({:.2}), {} key(s) reported",
            primary.root,
            primary.mode,
            primary.confidence,
            keys.keys().len()
        );

        // Loudest window for chords
        let window = recover(
            Stage::SegmentSelection,
            self.chord_window(provider, &signal, sample_rate),
            &mut degraded,
            || {
                let segment = Segment::leading(signal.len(), sample_rate, config.chord_window_secs);
                ChordWindow {
                    segment,
                    harmonic: segment.slice(&harmonic).to_vec(),
                }
            },
        );
        let segment = window.segment;
        info!(
            "Chord window: {:.1}s - {:.1}s",
            segment.start_secs, segment.end_secs
        );

        // Tempo and beats inside the window
        let (tempo, beats) = recover(
            Stage::TempoDetection,
            detect_tempo(provider, segment.slice(&signal), sample_rate),
            &mut degraded,
            || (config.default_tempo, Vec::new()),
        );
        info!("Tempo: {:.1} BPM, {} beats", tempo, beats.len());

        // Chords
        let sequencer = ChordSequencer::new(
            config.beats_per_bar,
            config.min_beats,
            config.fixed_chord_span_secs,
            config.min_span_samples,
            config.chord_hop_length,
        );
        let chords = recover(
            Stage::ChordDetection,
            sequencer.sequence(
                provider,
                &window.harmonic,
                sample_rate,
                &beats,
                primary.root,
                primary.mode,
                segment.start_secs,
            ),
            &mut degraded,
            || fallback_chords(primary.root, config.fallback_chord_secs),
        );
        info!("Chords: {} span(s)", chords.len());

        // Scales
        let scales = recover(
            Stage::ScaleMatching,
            match_scales(primary.root, primary.mode, &chords),
            &mut degraded,
            Vec::new,
        );

        let detected_keys = keys.is_modulating().then(|| keys.into_keys());

        info!(
            "Analysis of {} finished in {:.2}s",
            path.display(),
            started.elapsed().as_secs_f64()
        );

        Ok(AnalysisResult {
            metadata: AnalysisMetadata {
                duration,
                tempo,
                time_signature: TIME_SIGNATURE.to_string(),
                detected_key: primary.root,
                scale: primary.mode,
                confidence: primary.confidence,
                detected_keys,
            },
            chord_progression: chords,
            scale_match: ScaleMatchResult {
                matching_scales: scales,
            },
            stems: None,
            degraded_stages: degraded,
        })
    }

    /// Select the loudest window and split it into its harmonic part
    fn chord_window(
        &self,
        provider: &dyn FeatureProvider,
        signal: &[f32],
        sample_rate: u32,
    ) -> StageResult<ChordWindow> {
        let selector = SegmentSelector::new(
            self.config.segment_frame_length,
            self.config.segment_hop_length,
        );
        let segment = selector.select(signal, sample_rate, self.config.chord_window_secs)?;
        let harmonic = split_harmonic(provider, segment.slice(signal))?;
        Ok(ChordWindow { segment, harmonic })
    }
}

/// Substitute `fallback` for a failed stage
fn recover<T>(
    stage: Stage,
    result: StageResult<T>,
    degraded: &mut Vec<Stage>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "{} failed ({}), using {}",
                stage,
                e,
                stage.fallback_description()
            );
            degraded.push(stage);
            fallback()
        }
    }
}

fn split_harmonic(provider: &dyn FeatureProvider, signal: &[f32]) -> StageResult<Vec<f32>> {
    let (harmonic, _percussive) = provider.harmonic_percussive_split(signal)?;
    if harmonic.len() != signal.len() {
        return Err(StageError::InvalidInput(format!(
            "harmonic component has {} samples, expected {}",
            harmonic.len(),
            signal.len()
        )));
    }
    Ok(harmonic)
}

/// Tempo and beat times, rejecting tempos that are not a positive number
fn detect_tempo(
    provider: &dyn FeatureProvider,
    signal: &[f32],
    sample_rate: u32,
) -> StageResult<(f32, Vec<f64>)> {
    let (tempo, mut beats) = provider.detect_beats(signal, sample_rate)?;
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(StageError::InvalidTempo(tempo));
    }
    beats.retain(|b| b.is_finite() && *b >= 0.0);
    Ok((tempo, beats))
}

fn match_scales(root: PitchClass, mode: Mode, chords: &[ChordSpan]) -> StageResult<Vec<ScaleMatch>> {
    if chords.is_empty() {
        return Err(StageError::InvalidInput("no chords to match scales against".into()));
    }
    Ok(rank_scales(root, mode, chords))
}

/// Single chord on the key root used when chord detection fails
pub fn fallback_chords(root: PitchClass, secs: f64) -> Vec<ChordSpan> {
    vec![ChordSpan {
        start_time: 0.0,
        end_time: secs,
        label: chord_label(root, ChordQuality::Major),
        root_note: root,
        quality: ChordQuality::Major,
        confidence: FALLBACK_CONFIDENCE,
    }]
}

/// Fixed G-major result returned by `Engine::Demo`
pub fn demo_result() -> AnalysisResult {
    use ChordQuality::{Major, Minor};
    use PitchClass::{A, C, D, E, G};

    let progression = [
        (G, Major, 0.9),
        (E, Minor, 0.88),
        (C, Major, 0.87),
        (D, Major, 0.9),
        (G, Major, 0.92),
        (E, Minor, 0.85),
        (A, Minor, 0.89),
        (D, Major, 0.91),
    ];
    let chord_progression = progression
        .iter()
        .enumerate()
        .map(|(i, &(root, quality, confidence))| ChordSpan {
            start_time: i as f64 * 4.0,
            end_time: (i + 1) as f64 * 4.0,
            label: chord_label(root, quality),
            root_note: root,
            quality,
            confidence,
        })
        .collect();

    let scale = |scale, root_note, match_rate, chords: &[&str]| ScaleMatch {
        scale,
        root_note,
        match_rate,
        matching_chords: chords.iter().map(|c| c.to_string()).collect(),
    };

    AnalysisResult {
        metadata: AnalysisMetadata {
            duration: 120.0,
            tempo: 120.0,
            time_signature: TIME_SIGNATURE.to_string(),
            detected_key: G,
            scale: Mode::Major,
            confidence: 0.95,
            detected_keys: None,
        },
        chord_progression,
        scale_match: ScaleMatchResult {
            matching_scales: vec![
                scale(ScaleName::Major, G, 0.95, &["G", "C", "D", "Em", "Am"]),
                scale(ScaleName::Minor, E, 0.88, &["Em", "G", "C", "D", "Am"]),
                scale(ScaleName::Mixolydian, G, 0.82, &["G", "C", "D", "Em"]),
            ],
        },
        stems: None,
        degraded_stages: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_table() {
        assert_eq!(Stage::ALL.len(), 7);
        assert!(Stage::Load.is_fatal());
        assert_eq!(Stage::ALL.iter().filter(|s| s.is_fatal()).count(), 1);
        for stage in Stage::ALL {
            assert!(!stage.fallback_description().is_empty());
        }
    }

    #[test]
    fn test_engine_names() {
        for engine in [Engine::Standard, Engine::Precise, Engine::Demo] {
            assert_eq!(Engine::from_name(engine.name()), Some(engine));
        }
        assert_eq!(Engine::from_name(" Precise "), Some(Engine::Precise));
        assert_eq!(Engine::from_name("essentia"), None);
    }

    #[test]
    fn test_recover_records_degraded_stage() {
        let mut degraded = Vec::new();
        let ok = recover(Stage::TempoDetection, Ok(90.0f32), &mut degraded, || 120.0);
        assert_eq!(ok, 90.0);
        assert!(degraded.is_empty());

        let failed = recover(
            Stage::TempoDetection,
            Err(StageError::InvalidTempo(f32::NAN)),
            &mut degraded,
            || 120.0,
        );
        assert_eq!(failed, 120.0);
        assert_eq!(degraded, vec![Stage::TempoDetection]);
    }

    #[test]
    fn test_fallback_chord() {
        let chords = fallback_chords(PitchClass::A, 4.0);
        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].label, "A");
        assert_eq!(chords[0].quality, ChordQuality::Major);
        assert_eq!(chords[0].end_time, 4.0);
        assert_eq!(chords[0].confidence, 0.5);
    }

    #[test]
    fn test_match_scales_needs_chords() {
        assert!(match_scales(PitchClass::C, Mode::Major, &[]).is_err());
        let chords = fallback_chords(PitchClass::C, 4.0);
        assert_eq!(match_scales(PitchClass::C, Mode::Major, &chords).unwrap().len(), 3);
    }

    #[test]
    fn test_demo_result_shape() {
        let result = demo_result();
        assert_eq!(result.metadata.detected_key, PitchClass::G);
        assert_eq!(result.metadata.tempo, 120.0);
        assert_eq!(result.chord_progression.len(), 8);
        assert_eq!(result.chord_progression[7].end_time, 32.0);
        assert_eq!(result.scale_match.matching_scales.len(), 3);
        assert!(result.is_complete());
    }
}
