//! Audio decoding and spectral features for chordscope
//!
//! Implements `chordscope_analysis::FeatureProvider` on top of Symphonia
//! (decoding), rubato (resampling) and rustfft (STFT, chroma, onsets).

mod beats;
mod chroma;
mod hpss;
mod loader;
mod provider;
mod stft;

pub use beats::BeatTracker;
pub use chroma::ChromaExtractor;
pub use hpss::HarmonicPercussiveSeparator;
pub use loader::{downmix, resample, AudioLoader, DecodedAudio, LoadError};
pub use provider::{SignalConfig, SignalProvider};
pub use stft::{hann_window, Spectrogram, Stft};
