//! Loudest-window selection
//!
//! Chord analysis runs on the most energetic stretch of the track, which
//! skips quiet intros and outros and usually lands on a chorus.

use crate::error::{StageError, StageResult};

/// A window inside the original signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_sample: usize,
    pub end_sample: usize,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Segment {
    /// Window covering the first `secs` seconds (or the whole signal if shorter)
    pub fn leading(len: usize, sample_rate: u32, secs: f64) -> Self {
        let end_sample = ((secs * sample_rate as f64) as usize).min(len);
        Self {
            start_sample: 0,
            end_sample,
            start_secs: 0.0,
            end_secs: end_sample as f64 / sample_rate.max(1) as f64,
        }
    }

    /// The samples of `signal` inside this window
    pub fn slice<'a>(&self, signal: &'a [f32]) -> &'a [f32] {
        let end = self.end_sample.min(signal.len());
        let start = self.start_sample.min(end);
        &signal[start..end]
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Picks the window with the highest smoothed RMS energy
#[derive(Debug, Clone)]
pub struct SegmentSelector {
    frame_length: usize,
    hop_length: usize,
}

impl Default for SegmentSelector {
    fn default() -> Self {
        Self::new(2048, 512)
    }
}

impl SegmentSelector {
    pub fn new(frame_length: usize, hop_length: usize) -> Self {
        Self {
            frame_length: frame_length.max(1),
            hop_length: hop_length.max(1),
        }
    }

    /// Select the `target_secs` window with the highest average energy
    pub fn select(
        &self,
        signal: &[f32],
        sample_rate: u32,
        target_secs: f64,
    ) -> StageResult<Segment> {
        if sample_rate == 0 {
            return Err(StageError::InvalidInput("sample rate is zero".into()));
        }
        if !(target_secs > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "target duration must be positive, got {target_secs}"
            )));
        }

        let sr = sample_rate as f64;
        let full_duration = signal.len() as f64 / sr;

        // Short tracks are analysed whole
        if full_duration <= target_secs {
            return Ok(Segment {
                start_sample: 0,
                end_sample: signal.len(),
                start_secs: 0.0,
                end_secs: full_duration,
            });
        }

        let rms = self.frame_rms(signal);
        let window_frames = ((target_secs * sr / self.hop_length as f64) as usize).max(1);
        if window_frames >= rms.len() {
            return Ok(Segment::leading(signal.len(), sample_rate, target_secs));
        }

        let best_frame = argmax_boxcar(&rms, window_frames);

        let mut start_secs = best_frame as f64 * self.hop_length as f64 / sr;
        let mut end_secs = start_secs + target_secs;
        if end_secs > full_duration {
            end_secs = full_duration;
            start_secs = (full_duration - target_secs).max(0.0);
        }

        let start_sample = (start_secs * sr) as usize;
        let end_sample = ((end_secs * sr) as usize).min(signal.len());

        Ok(Segment {
            start_sample,
            end_sample,
            start_secs,
            end_secs,
        })
    }

    /// RMS energy of centred frames, one per hop
    fn frame_rms(&self, signal: &[f32]) -> Vec<f32> {
        let n_frames = 1 + signal.len() / self.hop_length;
        let half = self.frame_length / 2;

        (0..n_frames)
            .map(|frame| {
                let center = frame * self.hop_length;
                let start = center.saturating_sub(half).min(signal.len());
                let end = (center + half).min(signal.len());
                // Out-of-range samples count as zero padding
                let energy: f32 = signal[start..end].iter().map(|s| s * s).sum();
                (energy / self.frame_length as f32).sqrt()
            })
            .collect()
    }
}

/// Index of the maximum of the valid moving average of width `window`
///
/// The first maximum wins.
fn argmax_boxcar(values: &[f32], window: usize) -> usize {
    let mut running: f64 = values[..window].iter().map(|&v| v as f64).sum();
    let mut best_idx = 0;
    let mut best_sum = running;

    for i in 1..=(values.len() - window) {
        running += values[i + window - 1] as f64 - values[i - 1] as f64;
        if running > best_sum {
            best_sum = running;
            best_idx = i;
        }
    }

    best_idx
}
