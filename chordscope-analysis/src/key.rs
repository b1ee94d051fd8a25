//! Key estimation from a pitch-class profile
//!
//! Implements template key-finding:
//! 1. Normalize the profile to unit sum
//! 2. Correlate with Krumhansl-Kessler key profiles for all 24 keys
//! 3. Return the best matching key with confidence score

use crate::pitch::{Mode, PitchClass, PitchClassProfile, PITCH_CLASSES};
use serde::{Deserialize, Serialize};

/// Key estimate produced from a single profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    pub root: PitchClass,
    pub mode: Mode,
    /// Pearson correlation remapped from [-1, 1] to [0, 1]
    pub confidence: f32,
}

/// Krumhansl-Kessler major key profile
///
/// Index 0 = tonic.
const MAJOR_PROFILE: [f32; PITCH_CLASSES] = [
    6.35, // Tonic (I)
    2.23, // Minor 2nd
    3.48, // Major 2nd
    2.33, // Minor 3rd
    4.38, // Major 3rd
    4.09, // Perfect 4th
    2.52, // Tritone
    5.19, // Perfect 5th
    2.39, // Minor 6th
    3.66, // Major 6th
    2.29, // Minor 7th
    2.88, // Major 7th
];

/// Krumhansl-Kessler minor key profile
///
/// Index 0 = tonic.
const MINOR_PROFILE: [f32; PITCH_CLASSES] = [
    6.33, // Tonic (i)
    2.68, // Minor 2nd
    3.52, // Major 2nd
    5.38, // Minor 3rd
    2.60, // Major 3rd
    3.53, // Perfect 4th
    2.54, // Tritone
    4.75, // Perfect 5th
    3.98, // Minor 6th
    2.69, // Major 6th
    3.34, // Minor 7th
    3.17, // Major 7th
];

/// Key estimator using template correlation
#[derive(Debug, Clone)]
pub struct KeyEstimator {
    major: PitchClassProfile,
    minor: PitchClassProfile,
}

impl Default for KeyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyEstimator {
    /// Create an estimator with the unit-sum reference templates
    pub fn new() -> Self {
        Self {
            major: PitchClassProfile::new(MAJOR_PROFILE).normalized(),
            minor: PitchClassProfile::new(MINOR_PROFILE).normalized(),
        }
    }

    /// Reference template for a mode, tonic at index 0
    pub fn template(&self, mode: Mode) -> &[f32; PITCH_CLASSES] {
        self.profile(mode).values()
    }

    fn profile(&self, mode: Mode) -> &PitchClassProfile {
        match mode {
            Mode::Major => &self.major,
            Mode::Minor => &self.minor,
        }
    }

    /// Estimate the key of a profile
    ///
    /// Candidates are visited root 0..11, major before minor; a later
    /// candidate only wins with a strictly higher correlation.
    pub fn estimate(&self, profile: &PitchClassProfile) -> KeyEstimate {
        let chroma = profile.normalized();

        let mut best = KeyEstimate {
            root: PitchClass::C,
            mode: Mode::Major,
            confidence: f32::MIN,
        };

        for index in 0..PITCH_CLASSES as u8 {
            let root = PitchClass::from_index(index);
            // Candidate tonic moved down to index 0
            let relative = chroma.rotated(-i32::from(index));

            for mode in [Mode::Major, Mode::Minor] {
                let r = relative.correlation(self.profile(mode));
                if r > best.confidence {
                    best = KeyEstimate {
                        root,
                        mode,
                        confidence: r,
                    };
                }
            }
        }

        // Correlation lives in [-1, 1]
        best.confidence = ((best.confidence + 1.0) / 2.0).clamp(0.0, 1.0);
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Energy on the notes of a C major scale, tonic triad emphasised
    fn c_major_scale_profile() -> PitchClassProfile {
        PitchClassProfile::new([
            5.0, 0.0, 2.0, 0.0, 4.0, 2.5, 0.0, 4.5, 0.0, 2.0, 0.0, 1.5,
        ])
    }

    #[test]
    fn test_estimate_ignores_overall_level() {
        let estimator = KeyEstimator::new();
        let quiet = c_major_scale_profile();
        let loud = PitchClassProfile::new(quiet.values().map(|v| v * 40.0));

        let (a, b) = (estimator.estimate(&quiet), estimator.estimate(&loud));
        assert_eq!((a.root, a.mode), (b.root, b.mode));
        assert!((a.confidence - b.confidence).abs() < 1e-5);
    }

    #[test]
    fn test_tonic_template_scores_its_own_correlation() {
        let estimator = KeyEstimator::new();
        let minor = PitchClassProfile::new(*estimator.template(Mode::Minor));
        let expected = (minor.correlation(&minor) + 1.0) / 2.0;

        let key = estimator.estimate(&minor.rotated(4));
        assert_eq!(key.root, PitchClass::E);
        assert!((key.confidence - expected).abs() < 1e-5);
    }

    #[test]
    fn test_templates_sum_to_one() {
        let estimator = KeyEstimator::new();
        for mode in [Mode::Major, Mode::Minor] {
            let sum: f32 = estimator.template(mode).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_detects_g_major_template() {
        let estimator = KeyEstimator::new();
        let profile = PitchClassProfile::new(*estimator.template(Mode::Major)).rotated(7);

        let key = estimator.estimate(&profile);
        assert_eq!(key.root, PitchClass::G);
        assert_eq!(key.mode, Mode::Major);
        assert!(key.confidence > 0.9, "confidence was {}", key.confidence);
    }

    #[test]
    fn test_detects_minor_template() {
        let estimator = KeyEstimator::new();
        let profile = PitchClassProfile::new(*estimator.template(Mode::Minor)).rotated(9);

        let key = estimator.estimate(&profile);
        assert_eq!(key.root, PitchClass::A);
        assert_eq!(key.mode, Mode::Minor);
    }

    #[test]
    fn test_detects_c_major_scale() {
        let key = KeyEstimator::new().estimate(&c_major_scale_profile());
        assert_eq!(key.root, PitchClass::C);
        assert_eq!(key.mode, Mode::Major);
    }

    #[test]
    fn test_rotation_covariance() {
        let estimator = KeyEstimator::new();
        let base = estimator.estimate(&c_major_scale_profile());

        for k in 0..12 {
            let rotated = estimator.estimate(&c_major_scale_profile().rotated(k));
            assert_eq!(rotated.root, base.root.transpose(k));
            assert_eq!(rotated.mode, base.mode);
            assert!((rotated.confidence - base.confidence).abs() < 1e-5);
        }
    }

    #[test]
    fn test_silence_is_low_confidence_c_major() {
        let key = KeyEstimator::new().estimate(&PitchClassProfile::default());
        assert_eq!(key.root, PitchClass::C);
        assert_eq!(key.mode, Mode::Major);
        assert!((key.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_bounded_for_arbitrary_profiles() {
        let estimator = KeyEstimator::new();
        for seed in 0..50u32 {
            let mut values = [0.0f32; PITCH_CLASSES];
            for (i, v) in values.iter_mut().enumerate() {
                *v = ((seed * 31 + i as u32 * 17) % 13) as f32;
            }
            let key = estimator.estimate(&PitchClassProfile::new(values));
            assert!((0.0..=1.0).contains(&key.confidence));
            assert!(key.root.index() < 12);
        }
    }
}
