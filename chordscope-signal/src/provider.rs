//! `FeatureProvider` backed by the decoders and transforms in this crate

use crate::beats::BeatTracker;
use crate::chroma::ChromaExtractor;
use crate::hpss::HarmonicPercussiveSeparator;
use crate::loader::AudioLoader;
use chordscope_analysis::{ChromaFrame, FeatureProvider, ProviderError};
use std::path::Path;
use tracing::debug;

/// Transform sizes for one provider preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalConfig {
    pub name: &'static str,
    /// STFT size for chroma frames
    pub chroma_fft_size: usize,
    /// STFT size and hop for the harmonic/percussive split
    pub hpss_fft_size: usize,
    pub hpss_hop: usize,
    /// Median filter length (frames and bins)
    pub hpss_kernel: usize,
    /// STFT size and hop for the onset curve
    pub beat_fft_size: usize,
    pub beat_hop: usize,
}

impl SignalConfig {
    /// Default preset
    pub fn standard() -> Self {
        Self {
            name: "standard",
            chroma_fft_size: 4096,
            hpss_fft_size: 2048,
            hpss_hop: 512,
            hpss_kernel: 17,
            beat_fft_size: 2048,
            beat_hop: 512,
        }
    }

    /// Finer frequency resolution and onset timing, several times slower
    pub fn precise() -> Self {
        Self {
            name: "precise",
            chroma_fft_size: 8192,
            hpss_fft_size: 4096,
            hpss_hop: 512,
            hpss_kernel: 31,
            beat_fft_size: 2048,
            beat_hop: 256,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Decodes with Symphonia and computes features with rustfft
pub struct SignalProvider {
    name: &'static str,
    separator: HarmonicPercussiveSeparator,
    chroma: ChromaExtractor,
    beats: BeatTracker,
}

impl SignalProvider {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            name: config.name,
            separator: HarmonicPercussiveSeparator::new(
                config.hpss_fft_size,
                config.hpss_hop,
                config.hpss_kernel,
            ),
            chroma: ChromaExtractor::new(config.chroma_fft_size),
            beats: BeatTracker::new(config.beat_fft_size, config.beat_hop),
        }
    }

    pub fn standard() -> Self {
        Self::new(SignalConfig::standard())
    }

    pub fn precise() -> Self {
        Self::new(SignalConfig::precise())
    }
}

impl FeatureProvider for SignalProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(
        &self,
        path: &Path,
        sample_rate: u32,
        mono: bool,
    ) -> Result<(Vec<f32>, u32), ProviderError> {
        let audio = AudioLoader::new(sample_rate)
            .load(path, mono)
            .map_err(|e| ProviderError::Load(e.to_string()))?;
        debug!(
            "Decoded {} ({} Hz source, {} channel(s), {:.2}s)",
            path.display(),
            audio.source_sample_rate,
            audio.channels,
            audio.duration_secs()
        );
        Ok((audio.samples, audio.sample_rate))
    }

    fn harmonic_percussive_split(
        &self,
        signal: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>), ProviderError> {
        if signal.is_empty() {
            return Err(ProviderError::TooShort("empty signal".into()));
        }
        Ok(self.separator.separate(signal))
    }

    fn chroma_features(
        &self,
        signal: &[f32],
        sample_rate: u32,
        hop_length: usize,
    ) -> Result<Vec<ChromaFrame>, ProviderError> {
        if signal.is_empty() {
            return Err(ProviderError::TooShort("empty signal".into()));
        }
        if sample_rate == 0 || hop_length == 0 {
            return Err(ProviderError::Extraction(format!(
                "invalid sample rate {sample_rate} or hop {hop_length}"
            )));
        }
        Ok(self.chroma.extract(signal, sample_rate, hop_length))
    }

    fn detect_beats(
        &self,
        signal: &[f32],
        sample_rate: u32,
    ) -> Result<(f32, Vec<f64>), ProviderError> {
        self.beats.track(signal, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let standard = SignalConfig::standard();
        let precise = SignalConfig::precise();
        assert_eq!(SignalConfig::default(), standard);
        assert!(precise.chroma_fft_size > standard.chroma_fft_size);
        assert!(precise.beat_hop < standard.beat_hop);
        assert_eq!(SignalProvider::precise().name(), "precise");
    }

    #[test]
    fn test_empty_signal_is_rejected() {
        let provider = SignalProvider::standard();
        assert!(provider.harmonic_percussive_split(&[]).is_err());
        assert!(provider.chroma_features(&[], 22050, 512).is_err());
        assert!(provider.chroma_features(&[0.0; 64], 22050, 0).is_err());
    }
}
