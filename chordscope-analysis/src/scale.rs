//! Scale suggestions from the detected key and chords
//!
//! Match rates are fixed per rank; they order the suggestions rather than
//! measure chord/scale coverage.

use crate::pitch::{Mode, PitchClass};
use crate::result::ChordSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rate reported for the detected key's own scale
pub const PRIMARY_MATCH_RATE: f32 = 0.92;
/// Rate reported for the relative major/minor
pub const RELATIVE_MATCH_RATE: f32 = 0.85;
/// Rate reported for the modal suggestion
pub const MODAL_MATCH_RATE: f32 = 0.75;

/// Chords listed with the modal suggestion
const MODAL_CHORD_LIMIT: usize = 3;

/// Scales the ranker can suggest
///
/// Serialized names match `Mode` and the front end's scale tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleName {
    #[serde(rename = "メジャー")]
    Major,
    #[serde(rename = "マイナー")]
    Minor,
    #[serde(rename = "ミクソリディアン")]
    Mixolydian,
}

impl ScaleName {
    pub fn name(self) -> &'static str {
        match self {
            ScaleName::Major => "major",
            ScaleName::Minor => "minor",
            ScaleName::Mixolydian => "mixolydian",
        }
    }
}

impl From<Mode> for ScaleName {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Major => ScaleName::Major,
            Mode::Minor => ScaleName::Minor,
        }
    }
}

impl fmt::Display for ScaleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One suggested scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleMatch {
    pub scale: ScaleName,
    pub root_note: PitchClass,
    pub match_rate: f32,
    pub matching_chords: Vec<String>,
}

/// Distinct chord labels in order of first appearance
pub fn distinct_chords(chords: &[ChordSpan]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for chord in chords {
        if !labels.contains(&chord.label) {
            labels.push(chord.label.clone());
        }
    }
    labels
}

/// Root of the relative key: a minor third below a major tonic, above a minor one
pub fn relative_root(root: PitchClass, mode: Mode) -> PitchClass {
    match mode {
        Mode::Major => root.transpose(-3),
        Mode::Minor => root.transpose(3),
    }
}

/// Rank three scales for a key and its chord progression
///
/// 1. the key's own scale
/// 2. its relative major/minor
/// 3. Mixolydian on the key root
pub fn rank_scales(root: PitchClass, mode: Mode, chords: &[ChordSpan]) -> Vec<ScaleMatch> {
    let labels = distinct_chords(chords);
    let modal_chords: Vec<String> = labels.iter().take(MODAL_CHORD_LIMIT).cloned().collect();

    vec![
        ScaleMatch {
            scale: mode.into(),
            root_note: root,
            match_rate: PRIMARY_MATCH_RATE,
            matching_chords: labels.clone(),
        },
        ScaleMatch {
            scale: mode.relative().into(),
            root_note: relative_root(root, mode),
            match_rate: RELATIVE_MATCH_RATE,
            matching_chords: labels,
        },
        ScaleMatch {
            scale: ScaleName::Mixolydian,
            root_note: root,
            match_rate: MODAL_MATCH_RATE,
            matching_chords: modal_chords,
        },
    ]
}
