//! Short-time Fourier transform and time-domain framing
//!
//! Frames are centered: the signal is padded by half a frame on each side
//! so frame `t` is centered on sample `t * hop`.

use rustfft::{num_complex::Complex, FftPlanner};

/// Default analysis frame length (samples)
pub const N_FFT: usize = 2048;

/// Default hop between frames (samples)
pub const HOP_LENGTH: usize = 512;

/// Periodic Hann window
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
        .collect()
}

/// Number of centered frames for a signal
pub fn frame_count(signal_len: usize, hop: usize) -> usize {
    if signal_len == 0 {
        0
    } else {
        1 + signal_len / hop
    }
}

/// Zero-pad `signal` by `pad` samples on each side
pub fn pad_center(signal: &[f32], pad: usize) -> Vec<f32> {
    let mut padded = Vec::with_capacity(signal.len() + 2 * pad);
    padded.resize(pad, 0.0);
    padded.extend_from_slice(signal);
    padded.resize(signal.len() + 2 * pad, 0.0);
    padded
}

/// Edge-replicate `signal` by `pad` samples on each side
pub fn pad_edge(signal: &[f32], pad: usize) -> Vec<f32> {
    let first = signal.first().copied().unwrap_or(0.0);
    let last = signal.last().copied().unwrap_or(0.0);
    let mut padded = Vec::with_capacity(signal.len() + 2 * pad);
    padded.resize(pad, first);
    padded.extend_from_slice(signal);
    padded.resize(signal.len() + 2 * pad, last);
    padded
}

/// Magnitude spectrogram
///
/// Stored frame-major: `frames[t][k]` is the magnitude of bin `k` in
/// frame `t`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    n_fft: usize,
    hop: usize,
    sample_rate: u32,
}

impl Spectrogram {
    /// Compute a centered, Hann-windowed magnitude STFT
    pub fn compute(signal: &[f32], sample_rate: u32, n_fft: usize, hop: usize) -> Self {
        let n_frames = frame_count(signal.len(), hop);
        let padded = pad_center(signal, n_fft / 2);
        let window = hann_window(n_fft);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

        let n_bins = n_fft / 2 + 1;
        let mut frames = Vec::with_capacity(n_frames);

        for t in 0..n_frames {
            let start = t * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let s = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * window[i], 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            frames.push(buffer[..n_bins].iter().map(|c| c.norm()).collect());
        }

        Self {
            frames,
            n_fft,
            hop,
            sample_rate,
        }
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop as f64
    }

    /// Center frequency of bin `k` in Hz
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate as f64 / self.n_fft as f64
    }

    /// Frequencies of all bins
    pub fn bin_frequencies(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|k| self.bin_frequency(k)).collect()
    }
}
