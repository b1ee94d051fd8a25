//! Harmonic/percussive separation by median filtering
//!
//! Sustained tones form horizontal ridges in the magnitude spectrogram and
//! transients form vertical ones. Median filtering along time keeps the
//! former, along frequency the latter; soft masks built from the two
//! filtered spectrograms split the complex STFT before inversion.

use crate::stft::{Spectrogram, Stft};

/// Exponent of the Wiener-style soft mask
const MASK_POWER: i32 = 2;

/// Median-filter HPSS
pub struct HarmonicPercussiveSeparator {
    stft: Stft,
    hop: usize,
    kernel: usize,
}

impl HarmonicPercussiveSeparator {
    /// `kernel` is the median filter length in frames and in bins (made odd)
    pub fn new(fft_size: usize, hop: usize, kernel: usize) -> Self {
        Self {
            stft: Stft::new(fft_size),
            hop: hop.max(1),
            kernel: kernel.max(1) | 1,
        }
    }

    /// Split `signal` into (harmonic, percussive), each of the same length
    ///
    /// Where both filtered magnitudes vanish the energy is shared equally, so
    /// the two parts always add back up to the input.
    pub fn separate(&self, signal: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut spectrogram = self.stft.forward(signal, self.hop);

        let (mut mask, percussive_mag) = {
            let magnitude: Vec<Vec<f32>> = spectrogram
                .iter()
                .map(|frame| frame.iter().map(|c| c.norm()).collect())
                .collect();
            (
                median_over_time(&magnitude, self.kernel),
                median_over_frequency(&magnitude, self.kernel),
            )
        };

        // Harmonic share of each cell, written over the harmonic magnitudes
        for (mask_frame, p_frame) in mask.iter_mut().zip(&percussive_mag) {
            for (m, p) in mask_frame.iter_mut().zip(p_frame) {
                let h = m.powi(MASK_POWER);
                let p = p.powi(MASK_POWER);
                let total = h + p;
                *m = if total > f32::MIN_POSITIVE { h / total } else { 0.5 };
            }
        }
        drop(percussive_mag);

        let percussive = {
            let percussive_spec: Spectrogram = spectrogram
                .iter()
                .zip(&mask)
                .map(|(frame, m)| {
                    frame
                        .iter()
                        .zip(m)
                        .map(|(c, m)| c * (1.0 - *m))
                        .collect()
                })
                .collect();
            self.stft.inverse(&percussive_spec, self.hop, signal.len())
        };

        for (frame, m) in spectrogram.iter_mut().zip(&mask) {
            for (c, m) in frame.iter_mut().zip(m) {
                *c *= *m;
            }
        }
        drop(mask);
        let harmonic = self.stft.inverse(&spectrogram, self.hop, signal.len());

        (harmonic, percussive)
    }
}

/// Median of `values` (reorders the slice)
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median filter along the time axis for every bin
fn median_over_time(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let n_frames = magnitude.len();
    let n_bins = magnitude.first().map_or(0, |f| f.len());
    let half = kernel / 2;

    let mut out = vec![vec![0.0f32; n_bins]; n_frames];
    let mut scratch = Vec::with_capacity(kernel);

    for f in 0..n_bins {
        for t in 0..n_frames {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(n_frames);
            scratch.clear();
            scratch.extend(magnitude[lo..hi].iter().map(|frame| frame[f]));
            out[t][f] = median(&mut scratch);
        }
    }

    out
}

/// Median filter along the frequency axis for every frame
fn median_over_frequency(magnitude: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let half = kernel / 2;
    let mut scratch = Vec::with_capacity(kernel);

    magnitude
        .iter()
        .map(|frame| {
            let n_bins = frame.len();
            (0..n_bins)
                .map(|f| {
                    let lo = f.saturating_sub(half);
                    let hi = (f + half + 1).min(n_bins);
                    scratch.clear();
                    scratch.extend_from_slice(&frame[lo..hi]);
                    median(&mut scratch)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn energy(signal: &[f32]) -> f32 {
        signal.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [5.0]), 5.0);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn test_parts_sum_to_input() {
        let signal: Vec<f32> = (0..8000)
            .map(|i| (i as f32 * 0.05).sin() * 0.3 + if i % 2000 == 0 { 0.8 } else { 0.0 })
            .collect();
        let (h, p) = HarmonicPercussiveSeparator::new(1024, 256, 17).separate(&signal);

        assert_eq!(h.len(), signal.len());
        assert_eq!(p.len(), signal.len());
        for i in 0..signal.len() {
            assert!((h[i] + p[i] - signal[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_steady_tone_is_harmonic() {
        let sr = 22050.0;
        let tone: Vec<f32> = (0..22050)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr).sin() * 0.5)
            .collect();
        let (h, p) = HarmonicPercussiveSeparator::new(1024, 256, 17).separate(&tone);
        assert!(energy(&h) > 4.0 * energy(&p));
    }

    #[test]
    fn test_clicks_are_percussive() {
        let mut clicks = vec![0.0f32; 22050];
        for i in (0..clicks.len()).step_by(5512) {
            clicks[i] = 1.0;
        }
        let (h, p) = HarmonicPercussiveSeparator::new(1024, 256, 17).separate(&clicks);
        assert!(energy(&p) > 4.0 * energy(&h));
    }

    #[test]
    fn test_signal_shorter_than_frame() {
        let signal: Vec<f32> = (0..300).map(|i| (i as f32 * 0.1).sin()).collect();
        let (h, p) = HarmonicPercussiveSeparator::new(1024, 256, 17).separate(&signal);

        assert_eq!(h.len(), 300);
        assert_eq!(p.len(), 300);
        for i in 0..signal.len() {
            assert!((h[i] + p[i] - signal[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_silence_stays_silent() {
        let (h, p) = HarmonicPercussiveSeparator::new(1024, 256, 17).separate(&vec![0.0; 4096]);
        assert!(h.iter().chain(&p).all(|s| *s == 0.0));
    }
}
