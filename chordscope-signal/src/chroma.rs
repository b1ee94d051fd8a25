//! Chroma (pitch-class energy) frames from an STFT
//!
//! Each FFT bin between 55 Hz and 4 kHz is assigned to its nearest pitch
//! class. Bins are weighted by how close they sit to an equal-tempered pitch
//! and attenuated above 500 Hz so upper harmonics do not dominate.

use crate::stft::Stft;
use chordscope_analysis::{ChromaFrame, PITCH_CLASSES};

/// Reference frequency for A4
const A4_FREQ: f32 = 440.0;
/// Lowest frequency mapped to a pitch class (A1)
const MIN_FREQ: f32 = 55.0;
/// Highest frequency mapped to a pitch class
const MAX_FREQ: f32 = 4000.0;

/// STFT chroma extractor
pub struct ChromaExtractor {
    stft: Stft,
}

impl ChromaExtractor {
    pub fn new(fft_size: usize) -> Self {
        Self {
            stft: Stft::new(fft_size),
        }
    }

    /// Pitch class and weight of every bin at `sample_rate`
    fn pitch_class_mapping(&self, sample_rate: u32) -> Vec<Option<(usize, f32)>> {
        let nyquist = sample_rate as f32 / 2.0;

        (0..self.stft.bins())
            .map(|bin| {
                let freq = self.stft.bin_frequency(bin, sample_rate);
                if !(MIN_FREQ..=MAX_FREQ).contains(&freq) || freq >= nyquist {
                    return None;
                }

                // MIDI note number, folded to a pitch class
                let midi_note = 12.0 * (freq / A4_FREQ).log2() + 69.0;
                let exact_note = midi_note.round();
                let pitch_class = (exact_note as i32).rem_euclid(PITCH_CLASSES as i32) as usize;

                // 1.0 on an exact pitch, 0.0 half a semitone away
                let detune = (midi_note - exact_note).abs();
                let tuning_weight = (1.0 - detune.min(0.5) * 2.0).max(0.0);
                let octave_decay = (500.0 / freq.max(500.0)).sqrt();

                Some((pitch_class, tuning_weight * octave_decay))
            })
            .collect()
    }

    /// One chroma frame per hop, each scaled so its largest class is 1
    ///
    /// Frames without any energy stay all-zero.
    pub fn extract(&self, signal: &[f32], sample_rate: u32, hop: usize) -> Vec<ChromaFrame> {
        let mapping = self.pitch_class_mapping(sample_rate);
        let spectrogram = self.stft.forward(signal, hop);

        spectrogram
            .iter()
            .map(|frame| {
                let mut chroma = [0.0f32; PITCH_CLASSES];
                for (bin, c) in frame.iter().enumerate() {
                    if let Some(Some((pitch_class, weight))) = mapping.get(bin) {
                        chroma[*pitch_class] += c.norm_sqr() * weight;
                    }
                }

                let max = chroma.iter().cloned().fold(0.0f32, f32::max);
                if max > 0.0 {
                    for v in &mut chroma {
                        *v /= max;
                    }
                }
                chroma
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 22050;

    fn tone(freqs: &[f32], secs: f32) -> Vec<f32> {
        let len = (secs * SR as f32) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * 0.2
            })
            .collect()
    }

    fn mean_chroma(frames: &[ChromaFrame]) -> [f32; 12] {
        let mut mean = [0.0f32; 12];
        for frame in frames {
            for (m, v) in mean.iter_mut().zip(frame) {
                *m += v / frames.len() as f32;
            }
        }
        mean
    }

    fn strongest(chroma: &[f32; 12]) -> usize {
        chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_a440_maps_to_a() {
        let frames = ChromaExtractor::new(4096).extract(&tone(&[440.0], 1.0), SR, 512);
        assert_eq!(strongest(&mean_chroma(&frames)), 9);
    }

    #[test]
    fn test_c_major_triad() {
        // C4, E4, G4
        let frames =
            ChromaExtractor::new(4096).extract(&tone(&[261.63, 329.63, 392.0], 1.0), SR, 512);
        let chroma = mean_chroma(&frames);
        let mut ranked: Vec<usize> = (0..12).collect();
        ranked.sort_by(|&a, &b| chroma[b].total_cmp(&chroma[a]));
        let mut top: Vec<usize> = ranked[..3].to_vec();
        top.sort();
        assert_eq!(top, vec![0, 4, 7]);
    }

    #[test]
    fn test_frames_follow_hop() {
        let extractor = ChromaExtractor::new(2048);
        assert_eq!(extractor.extract(&vec![0.0; 22050], SR, 256).len(), 1 + 22050 / 256);
        assert_eq!(extractor.extract(&vec![0.0; 22050], SR, 512).len(), 1 + 22050 / 512);
    }

    #[test]
    fn test_silence_is_zero() {
        let frames = ChromaExtractor::new(2048).extract(&vec![0.0; 8192], SR, 512);
        assert!(frames.iter().flatten().all(|v| *v == 0.0));
    }
}
