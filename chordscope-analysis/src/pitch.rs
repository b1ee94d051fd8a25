//! Pitch classes, modes and pitch-class profiles
//!
//! Everything downstream (key estimation, chord matching, scale ranking)
//! works on the 12 octave-folded pitch classes defined here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of pitch classes in an octave
pub const PITCH_CLASSES: usize = 12;

/// Guard added to the profile sum before dividing
const NORMALIZE_EPSILON: f32 = 1e-8;

/// One of the 12 pitch classes (C=0 .. B=11), spelled with sharps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    Cs,
    D,
    #[serde(rename = "D#")]
    Ds,
    E,
    F,
    #[serde(rename = "F#")]
    Fs,
    G,
    #[serde(rename = "G#")]
    Gs,
    A,
    #[serde(rename = "A#")]
    As,
    B,
}

impl PitchClass {
    /// All pitch classes in semitone order, starting at C
    pub const ALL: [PitchClass; PITCH_CLASSES] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    /// Pitch class for a semitone index (wraps modulo 12)
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 12) as usize]
    }

    /// Semitone index (0-11, where 0=C)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Shift by a signed number of semitones, wrapping around the octave
    pub fn transpose(self, semitones: i32) -> Self {
        let shifted = (self.index() as i32 + semitones).rem_euclid(12);
        Self::from_index(shifted as u8)
    }

    /// Note name with sharp spelling ("C", "C#", ...)
    pub fn name(self) -> &'static str {
        use PitchClass::*;
        match self {
            C => "C",
            Cs => "C#",
            D => "D",
            Ds => "D#",
            E => "E",
            F => "F",
            Fs => "F#",
            G => "G",
            Gs => "G#",
            A => "A",
            As => "A#",
            B => "B",
        }
    }

    /// Parse a note name. Accepts sharp and flat spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        use PitchClass::*;
        let pc = match name.trim() {
            "C" | "B#" => C,
            "C#" | "Db" => Cs,
            "D" => D,
            "D#" | "Eb" => Ds,
            "E" | "Fb" => E,
            "F" | "E#" => F,
            "F#" | "Gb" => Fs,
            "G" => G,
            "G#" | "Ab" => Gs,
            "A" => A,
            "A#" | "Bb" => As,
            "B" | "Cb" => B,
            _ => return None,
        };
        Some(pc)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tonal mode of a key
///
/// Serialized under the scale identifiers the front end keys its scale
/// tables on; `name()` gives the English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "メジャー")]
    Major,
    #[serde(rename = "マイナー")]
    Minor,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }

    /// The other mode (relative major/minor counterpart)
    pub fn relative(self) -> Self {
        match self {
            Mode::Major => Mode::Minor,
            Mode::Minor => Mode::Major,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Relative energy per pitch class over some time window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchClassProfile([f32; PITCH_CLASSES]);

impl PitchClassProfile {
    pub fn new(values: [f32; PITCH_CLASSES]) -> Self {
        Self(values)
    }

    /// Average a sequence of chroma frames into one profile
    ///
    /// An empty frame sequence yields the all-zero profile.
    pub fn from_frames(frames: &[[f32; PITCH_CLASSES]]) -> Self {
        let mut sum = [0.0f32; PITCH_CLASSES];
        if frames.is_empty() {
            return Self(sum);
        }

        for frame in frames {
            for (acc, v) in sum.iter_mut().zip(frame) {
                *acc += v.max(0.0);
            }
        }

        let count = frames.len() as f32;
        for v in &mut sum {
            *v /= count;
        }
        Self(sum)
    }

    pub fn values(&self) -> &[f32; PITCH_CLASSES] {
        &self.0
    }

    /// Total energy across all pitch classes
    pub fn energy(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Scale to unit sum (epsilon-guarded, so all-zero stays all-zero)
    pub fn normalized(&self) -> Self {
        let sum = self.energy() + NORMALIZE_EPSILON;
        let mut out = self.0;
        for v in &mut out {
            *v /= sum;
        }
        Self(out)
    }

    /// Transpose the profile up by `semitones`
    ///
    /// Energy found at pitch class `i` moves to `(i + semitones) mod 12`.
    pub fn rotated(&self, semitones: i32) -> Self {
        let mut out = [0.0f32; PITCH_CLASSES];
        for (i, &v) in self.0.iter().enumerate() {
            let dst = (i as i32 + semitones).rem_euclid(PITCH_CLASSES as i32) as usize;
            out[dst] = v;
        }
        Self(out)
    }

    pub fn dot(&self, other: &Self) -> f32 {
        self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
    }

    /// Pearson correlation with `other`; a flat profile correlates as 0.0
    pub fn correlation(&self, other: &Self) -> f32 {
        let a = self.centered();
        let b = other.centered();
        let spread = (a.dot(&a) * b.dot(&b)).sqrt();
        if spread > 0.0 {
            a.dot(&b) / spread
        } else {
            0.0
        }
    }

    /// Mean removed from every pitch class
    fn centered(&self) -> Self {
        let mean = self.energy() / PITCH_CLASSES as f32;
        Self(self.0.map(|v| v - mean))
    }
}

impl From<[f32; PITCH_CLASSES]> for PitchClassProfile {
    fn from(values: [f32; PITCH_CLASSES]) -> Self {
        Self(values)
    }
}
