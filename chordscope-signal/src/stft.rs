//! Short-time Fourier transform with centred Hann frames
//!
//! Frame `t` is centred on sample `t * hop`; the signal is zero-padded by
//! half a frame on both sides, so a signal of `n` samples yields
//! `1 + n / hop` frames.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Complex spectrogram: `[time_frames][freq_bins]`
pub type Spectrogram = Vec<Vec<Complex<f32>>>;

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Forward and inverse STFT for one frame size
pub struct Stft {
    fft_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        Self {
            fft_size,
            window: hann_window(fft_size),
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of positive-frequency bins (DC through Nyquist)
    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Number of frames for a signal of `len` samples
    pub fn frame_count(&self, len: usize, hop: usize) -> usize {
        1 + len / hop.max(1)
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.fft_size as f32
    }

    /// Spectrogram of `signal` with the given hop
    pub fn forward(&self, signal: &[f32], hop: usize) -> Spectrogram {
        let hop = hop.max(1);
        let half = (self.fft_size / 2) as isize;
        let n_frames = self.frame_count(signal.len(), hop);
        let bins = self.bins();

        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];
        let mut spectrogram = Vec::with_capacity(n_frames);

        for t in 0..n_frames {
            let start = (t * hop) as isize - half;
            for (i, (slot, &w)) in buffer.iter_mut().zip(&self.window).enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < signal.len() {
                    signal[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * w, 0.0);
            }

            self.forward.process(&mut buffer);
            spectrogram.push(buffer[..bins].to_vec());
        }

        spectrogram
    }

    /// Reconstruct `len` samples from a spectrogram made with the same hop
    ///
    /// Overlap-add with the synthesis window, normalised by the summed
    /// squared window.
    pub fn inverse(&self, spectrogram: &[Vec<Complex<f32>>], hop: usize, len: usize) -> Vec<f32> {
        let hop = hop.max(1);
        let half = (self.fft_size / 2) as isize;
        let bins = self.bins();
        let scale = 1.0 / self.fft_size as f32;

        let mut output = vec![0.0f32; len];
        let mut window_sum = vec![0.0f32; len];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];

        for (t, frame) in spectrogram.iter().enumerate() {
            for slot in buffer.iter_mut() {
                *slot = Complex::new(0.0, 0.0);
            }
            for (i, &c) in frame.iter().take(bins).enumerate() {
                buffer[i] = c;
            }
            // Conjugate-symmetric upper half
            for i in 1..bins.saturating_sub(1) {
                if i < frame.len() {
                    buffer[self.fft_size - i] = frame[i].conj();
                }
            }

            self.inverse.process(&mut buffer);

            let start = (t * hop) as isize - half;
            for (i, &w) in self.window.iter().enumerate() {
                let idx = start + i as isize;
                if idx < 0 || idx as usize >= len {
                    continue;
                }
                output[idx as usize] += buffer[i].re * scale * w;
                window_sum[idx as usize] += w * w;
            }
        }

        for (sample, &ws) in output.iter_mut().zip(&window_sum) {
            if ws > 1e-8 {
                *sample /= ws;
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_count_is_centred() {
        let stft = Stft::new(1024);
        assert_eq!(stft.forward(&vec![0.0; 2048], 512).len(), 5);
        assert_eq!(stft.forward(&[], 512).len(), 1);
        assert_eq!(stft.bins(), 513);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let sr = 8000;
        let stft = Stft::new(1024);
        let spec = stft.forward(&sine(1000.0, sr, 4096), 256);
        let frame = &spec[spec.len() / 2];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 128);
        assert!((stft.bin_frequency(peak, sr) - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_inverse_reconstructs_signal() {
        let signal = sine(440.0, 22050, 6000);
        let stft = Stft::new(1024);
        let spec = stft.forward(&signal, 256);
        let rebuilt = stft.inverse(&spec, 256, signal.len());

        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max error {max_err}");
    }
}
