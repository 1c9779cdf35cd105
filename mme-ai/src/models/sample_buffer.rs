//! Decoded PCM audio

/// Immutable decoded audio
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap interleaved samples
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    pub fn new(mut samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Single-channel buffer
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Down-mix to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }

    /// De-interleave one channel
    pub fn channel(&self, index: usize) -> Vec<f32> {
        if index >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect()
    }

    /// De-interleave all channels
    pub fn planar(&self) -> Vec<Vec<f32>> {
        (0..self.channels).map(|c| self.channel(c)).collect()
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Copy of the first `seconds` of audio
    pub fn head(&self, seconds: f64) -> SampleBuffer {
        let max_frames = (seconds.max(0.0) * self.sample_rate as f64) as usize;
        let frames = self.frames().min(max_frames);
        SampleBuffer {
            samples: self.samples[..frames * self.channels].to_vec(),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}
