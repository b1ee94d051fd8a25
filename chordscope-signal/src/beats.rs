//! Tempo and beat tracking
//!
//! Spectral flux gives an onset strength curve; its autocorrelation gives
//! the beat period and the onset peaks give the phase. Beats are then laid
//! on a regular grid from the first aligned onset to the end of the signal.

use chordscope_analysis::ProviderError;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::stft::hann_window;

/// Slowest tempo considered
const MIN_BPM: f32 = 60.0;
/// Fastest tempo considered
const MAX_BPM: f32 = 200.0;
/// Minimum signal length in seconds
const MIN_SECONDS: f32 = 2.0;

/// Beat tracker over a mono signal
pub struct BeatTracker {
    fft_size: usize,
    hop_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl BeatTracker {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        Self {
            fft_size,
            hop_size: hop_size.max(1),
            fft: planner.plan_fft_forward(fft_size),
            window: hann_window(fft_size),
        }
    }

    /// Tempo in BPM and beat times in seconds
    pub fn track(&self, signal: &[f32], sample_rate: u32) -> Result<(f32, Vec<f64>), ProviderError> {
        let min_samples = (sample_rate as f32 * MIN_SECONDS) as usize;
        if sample_rate == 0 || signal.len() < min_samples.max(self.fft_size) {
            return Err(ProviderError::TooShort(format!(
                "{} samples is too short for beat tracking",
                signal.len()
            )));
        }

        let onset_fn = self.onset_function(signal);
        let frames_per_second = sample_rate as f32 / self.hop_size as f32;

        let raw_period =
            estimate_period(&onset_fn, frames_per_second).ok_or(ProviderError::NoOnsets)?;
        let raw_bpm = 60.0 * frames_per_second / raw_period;
        let bpm = disambiguate_octave(&onset_fn, raw_bpm, frames_per_second);
        let period = 60.0 * frames_per_second / bpm;

        let onsets = find_onset_peaks(&onset_fn, frames_per_second);
        let first = first_beat(&onsets, period).ok_or(ProviderError::NoOnsets)?;

        // Onset value i measures the change into frame i + 1
        let frame_time = |frame: f32| {
            ((frame + 1.0) * self.hop_size as f32 + self.fft_size as f32 / 2.0) as f64
                / sample_rate as f64
        };
        let duration = signal.len() as f64 / sample_rate as f64;
        let beat_secs = period as f64 / frames_per_second as f64;

        let mut beats = Vec::new();
        let mut t = frame_time(first as f32);
        while t < duration {
            beats.push(t);
            t += beat_secs;
        }

        Ok((bpm, beats))
    }

    /// Half-wave rectified spectral flux, scaled to a maximum of 1
    fn onset_function(&self, signal: &[f32]) -> Vec<f32> {
        let bins = self.fft_size / 2;
        let mut onset_fn = Vec::new();
        let mut prev_spectrum: Option<Vec<f32>> = None;
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];

        let mut frame_start = 0;
        while frame_start + self.fft_size <= signal.len() {
            let frame = &signal[frame_start..frame_start + self.fft_size];
            for ((slot, s), w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut buffer);

            let spectrum: Vec<f32> = buffer[..bins].iter().map(|c| c.norm()).collect();

            // Only increases in magnitude mark an onset
            if let Some(ref prev) = prev_spectrum {
                let flux: f32 = spectrum
                    .iter()
                    .zip(prev.iter())
                    .map(|(curr, prev)| (curr - prev).max(0.0))
                    .sum();
                onset_fn.push(flux);
            }

            prev_spectrum = Some(spectrum);
            frame_start += self.hop_size;
        }

        let max = onset_fn.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for v in &mut onset_fn {
                *v /= max;
            }
        }

        onset_fn
    }
}

/// Normalised autocorrelation of the onset curve at one lag
fn correlation_at_lag(onset_fn: &[f32], lag: usize) -> f32 {
    if lag == 0 || lag >= onset_fn.len() {
        return 0.0;
    }

    let mut correlation = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..(onset_fn.len() - lag) {
        correlation += onset_fn[i] * onset_fn[i + lag];
        norm_a += onset_fn[i] * onset_fn[i];
        norm_b += onset_fn[i + lag] * onset_fn[i + lag];
    }

    let norm = (norm_a * norm_b).sqrt();
    if norm > 0.0 {
        correlation / norm
    } else {
        0.0
    }
}

/// Beat period in onset frames (fractional), or None without rhythm
///
/// The lag with the strongest autocorrelation is refined by parabolic
/// interpolation between its neighbours.
fn estimate_period(onset_fn: &[f32], frames_per_second: f32) -> Option<f32> {
    if onset_fn.iter().all(|v| *v <= 0.0) {
        return None;
    }

    let min_lag = ((frames_per_second * 60.0 / MAX_BPM) as usize).max(1);
    let max_lag = (frames_per_second * 60.0 / MIN_BPM).ceil() as usize;
    let max_lag = max_lag.min(onset_fn.len() / 2);
    if max_lag <= min_lag {
        return None;
    }

    let mut best_lag = 0;
    let mut best_correlation = 0.0f32;
    for lag in min_lag..=max_lag {
        let c = correlation_at_lag(onset_fn, lag);
        if c > best_correlation {
            best_correlation = c;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        return None;
    }

    let prev = correlation_at_lag(onset_fn, best_lag - 1);
    let next = correlation_at_lag(onset_fn, best_lag + 1);
    let denom = prev - 2.0 * best_correlation + next;
    let offset = if denom.abs() > f32::EPSILON {
        (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };

    Some(best_lag as f32 + offset)
}

/// Resolve half/double tempo ambiguity
///
/// Very slow estimates are doubled and very fast ones halved. In the
/// 65-95 BPM band the doubled tempo wins when it correlates at least 70% as
/// well as the original.
fn disambiguate_octave(onset_fn: &[f32], raw_bpm: f32, frames_per_second: f32) -> f32 {
    if raw_bpm < 65.0 {
        return raw_bpm * 2.0;
    }
    if raw_bpm > 185.0 {
        return raw_bpm / 2.0;
    }

    if (65.0..=95.0).contains(&raw_bpm) {
        let doubled_bpm = raw_bpm * 2.0;
        let original_lag = (frames_per_second * 60.0 / raw_bpm).round() as usize;
        let doubled_lag = (frames_per_second * 60.0 / doubled_bpm).round() as usize;

        let original_corr = correlation_at_lag(onset_fn, original_lag);
        let doubled_corr = correlation_at_lag(onset_fn, doubled_lag);

        if doubled_corr / original_corr.max(0.001) > 0.7 {
            return doubled_bpm;
        }
    }

    raw_bpm
}

/// Local maxima above an adaptive threshold, at least 50 ms apart
fn find_onset_peaks(onset_fn: &[f32], frames_per_second: f32) -> Vec<usize> {
    if onset_fn.is_empty() {
        return Vec::new();
    }

    let mean: f32 = onset_fn.iter().sum::<f32>() / onset_fn.len() as f32;
    let variance: f32 =
        onset_fn.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / onset_fn.len() as f32;
    let threshold = (mean + 0.5 * variance.sqrt()).max(0.1);

    let min_distance = ((frames_per_second * 0.05) as usize).max(1);

    let mut peaks = Vec::new();
    let mut last_peak: isize = -(min_distance as isize);

    for i in 0..onset_fn.len() {
        let left = if i > 0 { onset_fn[i - 1] } else { 0.0 };
        let right = onset_fn.get(i + 1).copied().unwrap_or(0.0);
        if onset_fn[i] > threshold
            && onset_fn[i] > left
            && onset_fn[i] >= right
            && (i as isize - last_peak) >= min_distance as isize
        {
            peaks.push(i);
            last_peak = i as isize;
        }
    }

    peaks
}

/// Onset that best anchors a grid with the given period
///
/// Each of the first onsets is scored by how many of the following sixteen
/// grid positions land near another onset, earlier beats weighing more.
fn first_beat(onsets: &[usize], period: f32) -> Option<usize> {
    let first = *onsets.first()?;
    if period < 1.0 {
        return Some(first);
    }

    let tolerance = (period / 6.0).max(1.0);
    let candidates = onsets.len().min(32);
    let mut best_onset = first;
    let mut best_score = 0.0f32;

    for &onset in &onsets[..candidates] {
        let mut score = 0.0;
        for beat_num in 0..16 {
            let expected = onset as f32 + beat_num as f32 * period;
            if onsets
                .iter()
                .any(|&actual| (actual as f32 - expected).abs() <= tolerance)
            {
                score += 1.0 / (beat_num as f32 + 1.0);
            }
        }

        if score > best_score {
            best_score = score;
            best_onset = onset;
        }
    }

    Some(best_onset)
}
