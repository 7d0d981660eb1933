// Sample-layout adjustments between what a source produces and what a session requested.
//
// Integer ratios are decimated. Anything else (a 44.1kHz device feeding a 16kHz
// session) goes through a sinc resampler that keeps state across frames.

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::backend::AudioFrame;

/// Input sample frames per resampler pass
const RESAMPLER_CHUNK: usize = 1024;

/// Converts a stream of frames to one sample rate and channel count
///
/// Each source gets its own converter: the resampler carries the tail of the
/// previous frame into the next one.
pub struct FrameConverter {
    target_sample_rate: u32,
    target_channels: u16,
    resampler: Option<StreamResampler>,
}

impl FrameConverter {
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels,
            resampler: None,
        }
    }

    /// Convert the next frame of the stream
    ///
    /// Returns `None` while the resampler is still buffering a full chunk.
    pub fn convert(&mut self, frame: AudioFrame) -> Result<Option<AudioFrame>> {
        let mut frame = frame;

        if frame.channels != self.target_channels && self.target_channels == 1 {
            frame = downmix_to_mono(frame);
        }

        let target = self.target_sample_rate;
        if frame.sample_rate == target || target == 0 {
            return Ok(Some(frame));
        }
        if frame.sample_rate > target && frame.sample_rate % target == 0 {
            return Ok(Some(downsample_frame(frame, target)));
        }

        let channels = frame.channels.max(1);
        let rebuild = !matches!(
            &self.resampler,
            Some(r) if r.from_rate == frame.sample_rate && r.channels == channels
        );
        if rebuild {
            self.resampler = Some(StreamResampler::new(frame.sample_rate, target, channels)?);
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        let samples = resampler.push(&frame.samples)?;
        if samples.is_empty() {
            return Ok(None);
        }

        Ok(Some(AudioFrame {
            samples,
            sample_rate: target,
            channels,
            ..frame
        }))
    }

    /// Pad out and return whatever the resampler still holds
    pub fn flush(&mut self, timestamp_ms: u64, source: super::AudioStreamSource) -> Result<Option<AudioFrame>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        let samples = resampler.flush()?;
        if samples.is_empty() {
            return Ok(None);
        }

        Ok(Some(AudioFrame {
            samples,
            sample_rate: self.target_sample_rate,
            channels: resampler.channels,
            timestamp_ms,
            source,
        }))
    }
}

struct StreamResampler {
    from_rate: u32,
    channels: u16,
    inner: SincFixedIn<f32>,
    /// De-interleaved input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    fn new(from_rate: u32, to_rate: u32, channels: u16) -> Result<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLER_CHUNK, channels as usize)
            .with_context(|| format!("Failed to build {}Hz -> {}Hz resampler", from_rate, to_rate))?;

        tracing::debug!("Resampling {}Hz -> {}Hz ({} channels)", from_rate, to_rate, channels);

        Ok(Self {
            from_rate,
            channels,
            inner,
            pending: vec![Vec::new(); channels as usize],
        })
    }

    fn push(&mut self, interleaved: &[i16]) -> Result<Vec<i16>> {
        let channels = self.pending.len();
        for sample_frame in interleaved.chunks_exact(channels) {
            for (pending, &sample) in self.pending.iter_mut().zip(sample_frame) {
                pending.push(sample as f32 / 32768.0);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= self.inner.input_frames_next() {
            let needed = self.inner.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|pending| pending.drain(..needed).collect())
                .collect();
            self.process(&chunk, &mut output)?;
        }

        Ok(output)
    }

    fn flush(&mut self) -> Result<Vec<i16>> {
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let needed = self.inner.input_frames_next();
        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|pending| {
                let mut padded: Vec<f32> = pending.drain(..).collect();
                padded.resize(needed, 0.0);
                padded
            })
            .collect();

        let mut output = Vec::new();
        self.process(&chunk, &mut output)?;
        Ok(output)
    }

    fn process(&mut self, chunk: &[Vec<f32>], output: &mut Vec<i16>) -> Result<()> {
        let resampled = self
            .inner
            .process(chunk, None)
            .context("Resampling failed")?;

        let frames = resampled.first().map(Vec::len).unwrap_or(0);
        output.reserve(frames * resampled.len());
        for i in 0..frames {
            for channel in &resampled {
                output.push(f32_to_i16(channel[i]));
            }
        }
        Ok(())
    }
}

/// Downsample audio frame by decimation
///
/// Keeps every Nth sample frame (all channels of it). Rates that are not an
/// integer multiple of the target are left alone.
pub fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 {
        return frame;
    }

    if frame.sample_rate % target_rate != 0 {
        return frame;
    }

    let ratio = (frame.sample_rate / target_rate) as usize;
    if ratio <= 1 {
        return frame; // Can't upsample
    }

    let channels = frame.channels.max(1) as usize;
    let downsampled: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        ..frame
    }
}

/// Average interleaved channels into a single mono channel
pub fn downmix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        channels: 1,
        ..frame
    }
}

/// Convert a normalized float sample to 16-bit PCM
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
