//! Key detection over fixed-length windows
//!
//! The track is cut into consecutive windows, each window gets its own key
//! estimate, and the estimates are grouped into a ranked list of keys. A key
//! that wins in enough windows is reported even if it is not the primary
//! one, which is how modulations show up.

use crate::error::{StageError, StageResult};
use crate::key::{KeyEstimate, KeyEstimator};
use crate::pitch::{Mode, PitchClass, PitchClassProfile};
use crate::provider::FeatureProvider;
use crate::result::DetectedKey;
use tracing::debug;

/// A key estimate for one analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyObservation {
    pub estimate: KeyEstimate,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Ranked keys for a track, primary key first
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDetection {
    keys: Vec<DetectedKey>,
}

impl KeyDetection {
    /// Wrap a non-empty ranked list
    pub fn new(keys: Vec<DetectedKey>) -> Option<Self> {
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// A single key covering the whole track
    pub fn single(root: PitchClass, mode: Mode, confidence: f32) -> Self {
        Self {
            keys: vec![DetectedKey {
                root,
                mode,
                confidence,
                occurrence: 1.0,
            }],
        }
    }

    pub fn primary(&self) -> &DetectedKey {
        &self.keys[0]
    }

    pub fn keys(&self) -> &[DetectedKey] {
        &self.keys
    }

    pub fn is_modulating(&self) -> bool {
        self.keys.len() > 1
    }

    pub fn into_keys(self) -> Vec<DetectedKey> {
        self.keys
    }
}

/// Windowed key detection
#[derive(Debug, Clone)]
pub struct ModulationAggregator {
    estimator: KeyEstimator,
    segment_secs: f64,
    min_segment_secs: f64,
    min_occurrence: f32,
    hop_length: usize,
}

impl Default for ModulationAggregator {
    fn default() -> Self {
        Self::new(15.0, 5.0, 0.15, 512)
    }
}

impl ModulationAggregator {
    pub fn new(segment_secs: f64, min_segment_secs: f64, min_occurrence: f32, hop_length: usize) -> Self {
        Self {
            estimator: KeyEstimator::new(),
            segment_secs,
            min_segment_secs,
            min_occurrence,
            hop_length: hop_length.max(1),
        }
    }

    /// Detect the keys of a harmonic signal
    pub fn detect(
        &self,
        provider: &dyn FeatureProvider,
        harmonic: &[f32],
        sample_rate: u32,
    ) -> StageResult<KeyDetection> {
        if sample_rate == 0 {
            return Err(StageError::InvalidInput("sample rate is zero".into()));
        }
        if !(self.segment_secs > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "key segment duration must be positive, got {}",
                self.segment_secs
            )));
        }

        let min_samples = (self.min_segment_secs * sample_rate as f64) as usize;
        let mut observations = Vec::new();

        for (start, end) in windows(harmonic.len(), sample_rate, self.segment_secs) {
            if end - start < min_samples {
                debug!(start, end, "skipping short key window");
                continue;
            }

            let frames = match provider.chroma_features(&harmonic[start..end], sample_rate, self.hop_length) {
                Ok(frames) => frames,
                Err(e) => {
                    debug!(start, end, error = %e, "chroma failed for key window");
                    continue;
                }
            };

            let estimate = self.estimator.estimate(&PitchClassProfile::from_frames(&frames));
            let observation = KeyObservation {
                estimate,
                start_secs: start as f64 / sample_rate as f64,
                end_secs: end as f64 / sample_rate as f64,
            };
            debug!(
                "window {:.1}s-{:.1}s: {} {} ({:.2})",
                observation.start_secs,
                observation.end_secs,
                estimate.root,
                estimate.mode,
                estimate.confidence
            );
            observations.push(observation);
        }

        if observations.is_empty() {
            // No usable window: one estimate over the whole signal
            let frames = provider.chroma_features(harmonic, sample_rate, self.hop_length)?;
            let estimate = self.estimator.estimate(&PitchClassProfile::from_frames(&frames));
            return Ok(KeyDetection::single(estimate.root, estimate.mode, estimate.confidence));
        }

        KeyDetection::new(aggregate(&observations, self.min_occurrence))
            .ok_or(StageError::NoKeyAboveThreshold(self.min_occurrence))
    }
}

/// Sample ranges of consecutive windows; the last one may be shorter
fn windows(len: usize, sample_rate: u32, segment_secs: f64) -> Vec<(usize, usize)> {
    let sr = sample_rate as f64;
    let full_duration = len as f64 / sr;
    let count = ((full_duration / segment_secs).ceil() as usize).max(1);

    (0..count)
        .map(|i| {
            let start_secs = i as f64 * segment_secs;
            let end_secs = ((i + 1) as f64 * segment_secs).min(full_duration);
            let start = ((start_secs * sr) as usize).min(len);
            let end = ((end_secs * sr) as usize).min(len).max(start);
            (start, end)
        })
        .collect()
}

/// Group observations by key and rank by occurrence
///
/// Keys below `min_occurrence` are dropped. Equal occurrences keep the order
/// in which the keys were first observed.
pub fn aggregate(observations: &[KeyObservation], min_occurrence: f32) -> Vec<DetectedKey> {
    if observations.is_empty() {
        return Vec::new();
    }

    // (root, mode, count, confidence sum) in first-seen order
    let mut groups: Vec<(PitchClass, Mode, usize, f32)> = Vec::new();
    for obs in observations {
        let key = (obs.estimate.root, obs.estimate.mode);
        match groups.iter_mut().find(|g| (g.0, g.1) == key) {
            Some(group) => {
                group.2 += 1;
                group.3 += obs.estimate.confidence;
            }
            None => groups.push((key.0, key.1, 1, obs.estimate.confidence)),
        }
    }

    let total = observations.len() as f32;
    let mut keys: Vec<DetectedKey> = groups
        .into_iter()
        .map(|(root, mode, count, confidence_sum)| DetectedKey {
            root,
            mode,
            confidence: confidence_sum / count as f32,
            occurrence: count as f32 / total,
        })
        .filter(|k| k.occurrence >= min_occurrence)
        .collect();

    keys.sort_by(|a, b| b.occurrence.total_cmp(&a.occurrence));
    keys
}
