//! Chord matching against a key's diatonic and borrowed triads

use crate::pitch::{Mode, PitchClass, PitchClassProfile, PITCH_CLASSES};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Triad quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    #[serde(rename = "maj")]
    Major,
    #[serde(rename = "min")]
    Minor,
    #[serde(rename = "dim")]
    Diminished,
}

impl ChordQuality {
    /// Short code used in results ("maj", "min", "dim")
    pub fn code(self) -> &'static str {
        match self {
            ChordQuality::Major => "maj",
            ChordQuality::Minor => "min",
            ChordQuality::Diminished => "dim",
        }
    }

    /// Suffix appended to the root name in chord labels
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
        }
    }

    /// Semitone offsets of (third, fifth) above the root
    fn intervals(self) -> (usize, usize) {
        match self {
            ChordQuality::Major => (4, 7),
            ChordQuality::Minor => (3, 7),
            ChordQuality::Diminished => (3, 6),
        }
    }
}

impl fmt::Display for ChordQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Chord root label, e.g. "G", "Em", "F#dim"
pub fn chord_label(root: PitchClass, quality: ChordQuality) -> String {
    format!("{}{}", root.name(), quality.suffix())
}

/// A chord in a key's vocabulary, relative to the key root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDegree {
    /// Semitones above the key root
    pub offset: u8,
    pub quality: ChordQuality,
    /// Roman numeral for logging
    pub numeral: &'static str,
}

const fn degree(offset: u8, quality: ChordQuality, numeral: &'static str) -> ScaleDegree {
    ScaleDegree {
        offset,
        quality,
        numeral,
    }
}

/// Major key: seven diatonic triads plus bVII and bVI
pub const MAJOR_VOCABULARY: [ScaleDegree; 9] = [
    degree(0, ChordQuality::Major, "I"),
    degree(2, ChordQuality::Minor, "ii"),
    degree(4, ChordQuality::Minor, "iii"),
    degree(5, ChordQuality::Major, "IV"),
    degree(7, ChordQuality::Major, "V"),
    degree(9, ChordQuality::Minor, "vi"),
    degree(11, ChordQuality::Diminished, "vii°"),
    // Borrowed from the parallel minor
    degree(10, ChordQuality::Major, "bVII"),
    degree(8, ChordQuality::Major, "bVI"),
];

/// Minor key: natural minor triads with both v and the harmonic-minor V
pub const MINOR_VOCABULARY: [ScaleDegree; 8] = [
    degree(0, ChordQuality::Minor, "i"),
    degree(2, ChordQuality::Diminished, "ii°"),
    degree(3, ChordQuality::Major, "III"),
    degree(5, ChordQuality::Minor, "iv"),
    degree(7, ChordQuality::Minor, "v"),
    degree(7, ChordQuality::Major, "V"),
    degree(8, ChordQuality::Major, "VI"),
    degree(10, ChordQuality::Major, "VII"),
];

/// Vocabulary for a mode, in matching order
pub fn vocabulary(mode: Mode) -> &'static [ScaleDegree] {
    match mode {
        Mode::Major => &MAJOR_VOCABULARY,
        Mode::Minor => &MINOR_VOCABULARY,
    }
}

/// Best chord for a profile
#[derive(Debug, Clone, PartialEq)]
pub struct ChordMatch {
    pub label: String,
    pub root: PitchClass,
    pub quality: ChordQuality,
    pub numeral: &'static str,
    /// Template score clamped to [0, 1]
    pub confidence: f32,
}

const ROOT_WEIGHT: f32 = 1.0;
const THIRD_WEIGHT: f32 = 0.7;
const FIFTH_WEIGHT: f32 = 0.5;

/// Scores profiles against weighted triad templates
#[derive(Debug, Clone, Copy, Default)]
pub struct ChordMatcher;

impl ChordMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Unit-sum template for a triad on `root`
    pub fn template(root: PitchClass, quality: ChordQuality) -> PitchClassProfile {
        let (third, fifth) = quality.intervals();
        let r = root.index() as usize;

        let mut values = [0.0f32; PITCH_CLASSES];
        values[r] = ROOT_WEIGHT;
        values[(r + third) % PITCH_CLASSES] = THIRD_WEIGHT;
        values[(r + fifth) % PITCH_CLASSES] = FIFTH_WEIGHT;

        PitchClassProfile::new(values).normalized()
    }

    /// Match a profile against the vocabulary of `key_root` / `mode`
    ///
    /// A later chord only replaces the current best with a strictly higher
    /// score, so ties keep the earlier vocabulary entry.
    pub fn best_match(
        &self,
        profile: &PitchClassProfile,
        key_root: PitchClass,
        mode: Mode,
    ) -> ChordMatch {
        let chroma = profile.normalized();
        let candidates = vocabulary(mode);

        let mut best = candidates[0];
        let mut best_score = -1.0f32;

        for &candidate in candidates {
            let root = key_root.transpose(candidate.offset as i32);
            let score = chroma.dot(&Self::template(root, candidate.quality));
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }

        let root = key_root.transpose(best.offset as i32);
        ChordMatch {
            label: chord_label(root, best.quality),
            root,
            quality: best.quality,
            numeral: best.numeral,
            confidence: best_score.clamp(0.0, 1.0),
        }
    }
}
