//! Audio file decoding and resampling

use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

/// Input chunk size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Errors that can occur while decoding a file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("No audio samples could be decoded")]
    NoSamples,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Decoded audio, interleaved when more than one channel is kept
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
    /// Sample rate of the file before resampling
    pub source_sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1);
        frames as f64 / self.sample_rate.max(1) as f64
    }
}

/// Audio file loader using Symphonia
pub struct AudioLoader {
    target_sample_rate: u32,
}

impl Default for AudioLoader {
    fn default() -> Self {
        Self::new(22050)
    }
}

impl AudioLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode a file, optionally averaging channels to mono, and resample
    pub fn load(&self, path: &Path, mono: bool) -> Result<DecodedAudio, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| LoadError::Decode("unknown sample rate".into()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        // Layout of the decoded buffers; containers may not report it
        let mut channels: Option<usize> = None;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    debug!("Stopping decode at {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => {
                    skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count().max(1));
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if skipped_packets > 0 {
            debug!("Skipped {} corrupt packet(s) in {}", skipped_packets, path.display());
        }
        let channels = match channels {
            Some(channels) if !samples.is_empty() => channels,
            _ => return Err(LoadError::NoSamples),
        };
        if let Some(reported) = codec_params.channels.map(|c| c.count()) {
            if reported != channels {
                debug!("Container reports {reported} channel(s), decoder produced {channels}");
            }
        }

        let (samples, channels) = if mono && channels > 1 {
            (downmix(&samples, channels), 1)
        } else {
            (samples, channels)
        };

        let samples = if source_sample_rate != self.target_sample_rate {
            resample(&samples, source_sample_rate, self.target_sample_rate, channels)?
        } else {
            samples
        };

        Ok(DecodedAudio {
            samples,
            sample_rate: self.target_sample_rate,
            channels,
            source_sample_rate,
        })
    }
}

/// Average interleaved channels into one
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample interleaved audio between two rates
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
    channels: usize,
) -> Result<Vec<f32>, LoadError> {
    use rubato::{FftFixedInOut, Resampler};

    let channels = channels.max(1);
    let frames = samples.len() / channels;

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        channels,
    )
    .map_err(|e| LoadError::Resample(e.to_string()))?;

    let deinterleaved: Vec<Vec<f32>> = (0..channels)
        .map(|ch| (0..frames).map(|f| samples[f * channels + ch]).collect())
        .collect();

    let chunk_size = resampler.input_frames_next();
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];

    let mut pos = 0;
    while pos + chunk_size <= frames {
        let input_refs: Vec<&[f32]> = deinterleaved
            .iter()
            .map(|ch| &ch[pos..pos + chunk_size])
            .collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }

        pos += chunk_size;
    }

    // Zero-pad the tail and keep only its proportional share of output
    if pos < frames {
        let remaining = frames - pos;
        let padded: Vec<Vec<f32>> = deinterleaved
            .iter()
            .map(|ch| {
                let mut v = ch[pos..].to_vec();
                v.resize(chunk_size, 0.0);
                v
            })
            .collect();
        let input_refs: Vec<&[f32]> = padded.iter().map(|v| v.as_slice()).collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        let tail_frames = (remaining * target_rate as usize) / source_rate as usize;
        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(&data[..tail_frames.min(data.len())]);
        }
    }

    if channels == 1 {
        return Ok(output.swap_remove(0));
    }

    let output_frames = output[0].len();
    let mut interleaved = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame_idx]);
        }
    }
    Ok(interleaved)
}
