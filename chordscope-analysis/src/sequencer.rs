//! Chord progression over an analysis window
//!
//! The window is cut into chord-sized spans (bars when beats are known,
//! fixed two-second slices otherwise), each span is matched against the
//! key's chord vocabulary, and runs of the same chord are merged.

use crate::chord::ChordMatcher;
use crate::error::{StageError, StageResult};
use crate::pitch::{Mode, PitchClass, PitchClassProfile};
use crate::provider::FeatureProvider;
use crate::result::ChordSpan;
use tracing::debug;

/// A time range in seconds, relative to the analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Group beats into bars of `beats_per_bar`
///
/// Each bar runs from its first beat to the first beat of the next bar. A
/// trailing partial bar reaches to the last beat.
pub fn bar_spans(beats: &[f64], beats_per_bar: usize) -> Vec<TimeSpan> {
    let n = beats.len();
    let per_bar = beats_per_bar.max(1);
    let mut bars = Vec::new();

    let mut i = 0;
    while i + per_bar - 1 < n {
        let end = beats[(i + per_bar).min(n - 1)];
        bars.push(TimeSpan::new(beats[i], end));
        i += per_bar;
    }

    if let (Some(last_bar), Some(&last_beat)) = (bars.last().copied(), beats.last()) {
        if last_beat > last_bar.end {
            bars.push(TimeSpan::new(last_bar.end, last_beat));
        }
    }

    bars
}

/// Uniform slices of `width` seconds covering `duration`; the last is clipped
pub fn fixed_spans(duration: f64, width: f64) -> Vec<TimeSpan> {
    if !(duration > 0.0) || !(width > 0.0) {
        return Vec::new();
    }

    let count = (duration / width).ceil() as usize;
    (0..count)
        .map(|i| {
            let start = i as f64 * width;
            TimeSpan::new(start, ((i + 1) as f64 * width).min(duration))
        })
        .filter(|span| span.end > span.start)
        .collect()
}

/// Merge adjacent spans that carry the same chord label
///
/// A run of identical chords becomes one span covering the whole run, with
/// the arithmetic mean of the members' confidences.
pub fn merge_consecutive(spans: Vec<ChordSpan>) -> Vec<ChordSpan> {
    let mut merged: Vec<ChordSpan> = Vec::with_capacity(spans.len());
    let mut run_len = 0usize;
    let mut run_confidence = 0.0f32;

    for span in spans {
        match merged.last_mut() {
            Some(current) if current.label == span.label => {
                current.end_time = span.end_time;
                run_len += 1;
                run_confidence += span.confidence;
                current.confidence = run_confidence / run_len as f32;
            }
            _ => {
                run_len = 1;
                run_confidence = span.confidence;
                merged.push(span);
            }
        }
    }

    merged
}

/// Span generation and chord matching for one analysis window
#[derive(Debug, Clone)]
pub struct ChordSequencer {
    matcher: ChordMatcher,
    beats_per_bar: usize,
    min_beats: usize,
    fixed_span_secs: f64,
    min_span_samples: usize,
    hop_length: usize,
}

impl Default for ChordSequencer {
    fn default() -> Self {
        Self::new(4, 4, 2.0, 1024, 256)
    }
}

impl ChordSequencer {
    pub fn new(
        beats_per_bar: usize,
        min_beats: usize,
        fixed_span_secs: f64,
        min_span_samples: usize,
        hop_length: usize,
    ) -> Self {
        Self {
            matcher: ChordMatcher::new(),
            beats_per_bar: beats_per_bar.max(1),
            min_beats,
            fixed_span_secs,
            min_span_samples,
            hop_length: hop_length.max(1),
        }
    }

    /// Spans for a window: beat-synchronised when enough beats are known
    ///
    /// Bars are stretched so the first starts at 0 and the last ends at
    /// `duration`; the whole window is always covered.
    pub fn spans(&self, beats: &[f64], duration: f64) -> Vec<TimeSpan> {
        if beats.len() < self.min_beats {
            return fixed_spans(duration, self.fixed_span_secs);
        }

        let mut bars = bar_spans(beats, self.beats_per_bar);
        if bars.is_empty() {
            return fixed_spans(duration, self.fixed_span_secs);
        }
        if let Some(first) = bars.first_mut() {
            first.start = 0.0;
        }
        if let Some(last) = bars.last_mut() {
            last.end = last.end.max(duration);
        }
        bars
    }

    /// Detect the merged chord progression of a harmonic window
    ///
    /// `beats` are relative to the window; output times are shifted by
    /// `time_offset` into the original timeline. Spans that are too short or
    /// silent are folded into their neighbour so the output stays contiguous.
    #[allow(clippy::too_many_arguments)]
    pub fn sequence(
        &self,
        provider: &dyn FeatureProvider,
        harmonic: &[f32],
        sample_rate: u32,
        beats: &[f64],
        key_root: PitchClass,
        mode: Mode,
        time_offset: f64,
    ) -> StageResult<Vec<ChordSpan>> {
        if sample_rate == 0 {
            return Err(StageError::InvalidInput("sample rate is zero".into()));
        }

        let sr = sample_rate as f64;
        let duration = harmonic.len() as f64 / sr;
        let spans = self.spans(beats, duration);
        debug!(
            spans = spans.len(),
            beat_synced = beats.len() >= self.min_beats,
            "chord spans"
        );

        let mut chords: Vec<ChordSpan> = Vec::with_capacity(spans.len());
        // Start of skipped spans that precede the first emitted chord
        let mut pending_start: Option<f64> = None;

        for span in spans {
            let start = ((span.start * sr) as usize).min(harmonic.len());
            let end = ((span.end * sr) as usize).min(harmonic.len()).max(start);
            let samples = &harmonic[start..end];

            let profile = if samples.len() < self.min_span_samples {
                None
            } else {
                let frames = provider.chroma_features(samples, sample_rate, self.hop_length)?;
                let profile = PitchClassProfile::from_frames(&frames);
                (profile.energy() > f32::EPSILON).then_some(profile)
            };

            let Some(profile) = profile else {
                debug!("skipping span {:.2}s-{:.2}s", span.start, span.end);
                match chords.last_mut() {
                    Some(previous) => previous.end_time = span.end + time_offset,
                    None => {
                        pending_start.get_or_insert(span.start);
                    }
                }
                continue;
            };

            let m = self.matcher.best_match(&profile, key_root, mode);
            let span_start = pending_start.take().unwrap_or(span.start);
            chords.push(ChordSpan {
                start_time: span_start + time_offset,
                end_time: span.end + time_offset,
                label: m.label,
                root_note: m.root,
                quality: m.quality,
                confidence: m.confidence,
            });
        }

        if chords.is_empty() {
            return Err(StageError::NoChordSpans);
        }

        Ok(merge_consecutive(chords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordQuality;
    use crate::key::KeyEstimator;
    use crate::provider::{ChromaFrame, ProviderError};
    use std::path::Path;

    /// Chroma from the mean level of a slice: silence is empty, quiet
    /// slices sound like G major and loud ones like D major
    struct LevelChroma;

    impl FeatureProvider for LevelChroma {
        fn name(&self) -> &'static str {
            "levels"
        }

        fn load(&self, _: &Path, _: u32, _: bool) -> Result<(Vec<f32>, u32), ProviderError> {
            Err(ProviderError::Load("not used".into()))
        }

        fn harmonic_percussive_split(
            &self,
            signal: &[f32],
        ) -> Result<(Vec<f32>, Vec<f32>), ProviderError> {
            Ok((signal.to_vec(), vec![0.0; signal.len()]))
        }

        fn chroma_features(
            &self,
            signal: &[f32],
            _: u32,
            hop_length: usize,
        ) -> Result<Vec<ChromaFrame>, ProviderError> {
            let level = signal.iter().sum::<f32>() / signal.len().max(1) as f32;
            let frame = if level == 0.0 {
                [0.0; 12]
            } else {
                let root = if level <= 0.15 { PitchClass::G } else { PitchClass::D };
                let template = *KeyEstimator::new().template(Mode::Major);
                *PitchClassProfile::new(template)
                    .rotated(root.index() as i32)
                    .values()
            };
            Ok(vec![frame; (signal.len() / hop_length).max(1)])
        }

        fn detect_beats(&self, _: &[f32], _: u32) -> Result<(f32, Vec<f64>), ProviderError> {
            Err(ProviderError::NoOnsets)
        }
    }

    fn sections(sample_rate: u32, parts: &[(f64, f32)]) -> Vec<f32> {
        parts
            .iter()
            .flat_map(|&(secs, level)| {
                std::iter::repeat(level).take((secs * sample_rate as f64) as usize)
            })
            .collect()
    }

    fn span(start: f64, end: f64, label: &str, confidence: f32) -> ChordSpan {
        ChordSpan {
            start_time: start,
            end_time: end,
            label: label.to_string(),
            root_note: PitchClass::from_name(&label[..1]).unwrap(),
            quality: if label.ends_with('m') {
                ChordQuality::Minor
            } else {
                ChordQuality::Major
            },
            confidence,
        }
    }

    #[test]
    fn test_eight_beats_make_two_bars() {
        let beats = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let bars = bar_spans(&beats, 4);
        assert_eq!(bars, vec![TimeSpan::new(0.0, 4.0), TimeSpan::new(4.0, 7.0)]);
    }

    #[test]
    fn test_trailing_partial_bar() {
        let beats: Vec<f64> = (0..10).map(|b| b as f64 * 0.5).collect();
        let bars = bar_spans(&beats, 4);
        assert_eq!(
            bars,
            vec![
                TimeSpan::new(0.0, 2.0),
                TimeSpan::new(2.0, 4.0),
                TimeSpan::new(4.0, 4.5),
            ]
        );
    }

    #[test]
    fn test_too_few_beats_for_a_bar() {
        assert!(bar_spans(&[0.0, 1.0, 2.0], 4).is_empty());
    }

    #[test]
    fn test_fixed_spans_cover_duration() {
        let spans = fixed_spans(7.0, 2.0);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[0], TimeSpan::new(0.0, 2.0));
        assert_eq!(spans[3], TimeSpan::new(6.0, 7.0));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(fixed_spans(0.0, 2.0).is_empty());
    }

    #[test]
    fn test_sequencer_strategy_selection() {
        let sequencer = ChordSequencer::default();
        let beats = [0.5, 1.0, 1.5, 2.0, 2.5];
        assert_eq!(sequencer.spans(&beats, 10.0), vec![TimeSpan::new(0.0, 10.0)]);
        assert_eq!(sequencer.spans(&beats[..3], 10.0).len(), 5);
    }

    #[test]
    fn test_bar_spans_reach_window_edges() {
        let sequencer = ChordSequencer::default();
        let beats: Vec<f64> = (0..8).map(|b| 1.3 + b as f64).collect();
        let spans = sequencer.spans(&beats, 10.0);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start, 0.0);
        assert!((spans[0].end - 5.3).abs() < 1e-9);
        assert_eq!(spans[1].start, spans[0].end);
        assert_eq!(spans[1].end, 10.0);
    }

    #[test]
    fn test_merge_runs() {
        let spans = vec![
            span(0.0, 2.0, "G", 0.6),
            span(2.0, 4.0, "G", 0.8),
            span(4.0, 6.0, "G", 1.0),
            span(6.0, 8.0, "Em", 0.5),
            span(8.0, 10.0, "G", 0.4),
        ];
        let merged = merge_consecutive(spans);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].start_time, 0.0);
        assert_eq!(merged[0].end_time, 6.0);
        assert!((merged[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(merged[1].label, "Em");
        assert_eq!(merged[2].label, "G");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let spans = vec![
            span(0.0, 1.0, "C", 0.3),
            span(1.0, 2.0, "C", 0.5),
            span(2.0, 3.0, "Am", 0.9),
            span(3.0, 4.0, "Am", 0.7),
            span(4.0, 5.0, "F", 0.6),
        ];
        let once = merge_consecutive(spans);
        let twice = merge_consecutive(once.clone());
        assert_eq!(once, twice);

        for pair in once.windows(2) {
            assert_ne!(pair[0].label, pair[1].label);
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
    }

    #[test]
    fn test_silent_spans_fold_into_neighbours() {
        let harmonic = sections(1000, &[(2.0, 0.0), (4.0, 0.1), (2.0, 0.0), (2.0, 0.2)]);
        let chords = ChordSequencer::default()
            .sequence(&LevelChroma, &harmonic, 1000, &[], PitchClass::G, Mode::Major, 30.0)
            .unwrap();

        let ranges: Vec<(&str, f64, f64)> = chords
            .iter()
            .map(|c| (c.label.as_str(), c.start_time, c.end_time))
            .collect();
        // Leading silence moves G back to the window start, the gap at 6-8 s
        // extends G up to D
        assert_eq!(ranges, vec![("G", 30.0, 38.0), ("D", 38.0, 40.0)]);
    }

    #[test]
    fn test_trailing_short_span_extends_last_chord() {
        // The final 0.5 s slice has fewer samples than the minimum span
        let harmonic = sections(1000, &[(4.5, 0.2)]);
        let chords = ChordSequencer::default()
            .sequence(&LevelChroma, &harmonic, 1000, &[], PitchClass::G, Mode::Major, 0.0)
            .unwrap();

        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].label, "D");
        assert_eq!(chords[0].start_time, 0.0);
        assert_eq!(chords[0].end_time, 4.5);
    }

    #[test]
    fn test_all_silent_window_is_an_error() {
        let harmonic = vec![0.0; 6000];
        let err = ChordSequencer::default()
            .sequence(&LevelChroma, &harmonic, 1000, &[], PitchClass::C, Mode::Major, 0.0)
            .unwrap_err();
        assert!(matches!(err, StageError::NoChordSpans));
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_consecutive(Vec::new()).is_empty());
    }
}
