//! Mel filterbank, log-power mel spectrogram and MFCC
//!
//! Uses the Slaney mel scale (linear below 1 kHz, logarithmic above) with
//! area-normalized triangular filters.

use super::stft::Spectrogram;

/// Mel bands used for onset detection and MFCC
pub const N_MELS: usize = 128;

/// Number of cepstral coefficients reported
pub const N_MFCC: usize = 13;

/// Dynamic range kept by [`power_to_db`]
pub const TOP_DB: f32 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular filter, non-zero over `weights.len()` bins from `start`
#[derive(Debug, Clone)]
pub struct MelFilter {
    pub start: usize,
    pub weights: Vec<f32>,
}

impl MelFilter {
    /// Weighted sum of squared magnitudes
    fn apply(&self, magnitudes: &[f32]) -> f32 {
        self.weights
            .iter()
            .zip(&magnitudes[self.start.min(magnitudes.len())..])
            .map(|(w, mag)| w * mag * mag)
            .sum()
    }
}

/// Area-normalized triangular mel filterbank
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<MelFilter> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;
    let mel_max = hz_to_mel(fmax);

    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (upper - lower);
            let dense: Vec<f32> = bin_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    (rising.min(falling).max(0.0) * enorm) as f32
                })
                .collect();
            let start = dense.iter().position(|&w| w > 0.0).unwrap_or(0);
            let end = dense.iter().rposition(|&w| w > 0.0).map_or(start, |e| e + 1);
            MelFilter {
                start,
                weights: dense[start..end].to_vec(),
            }
        })
        .collect()
}

/// Mel power spectrogram, frame-major `[frame][mel]`
pub fn mel_power(spec: &Spectrogram, n_mels: usize) -> Vec<Vec<f32>> {
    let filters = mel_filterbank(spec.sample_rate(), spec.n_fft(), n_mels);
    spec.frames()
        .iter()
        .map(|frame| filters.iter().map(|filter| filter.apply(frame)).collect())
        .collect()
}

/// Convert power to decibels, clipped to `TOP_DB` below the global peak
pub fn power_to_db(power: &[Vec<f32>]) -> Vec<Vec<f32>> {
    const AMIN: f32 = 1e-10;
    let mut db: Vec<Vec<f32>> = power
        .iter()
        .map(|frame| frame.iter().map(|&p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();

    let peak = db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    if peak.is_finite() {
        let floor = peak - TOP_DB;
        for v in db.iter_mut().flat_map(|frame| frame.iter_mut()) {
            *v = v.max(floor);
        }
    }
    db
}

/// Orthonormal DCT-II basis, `rows[k][i]`
#[derive(Debug, Clone)]
pub struct DctBasis {
    rows: Vec<Vec<f32>>,
}

impl DctBasis {
    pub fn new(n_inputs: usize, n_coeffs: usize) -> Self {
        let n = n_inputs.max(1) as f64;
        let rows = (0..n_coeffs)
            .map(|k| {
                let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                (0..n_inputs)
                    .map(|i| {
                        let angle = std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n);
                        (scale * angle.cos()) as f32
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(input).map(|(b, x)| b * x).sum())
            .collect()
    }
}

/// Time-mean MFCC vector from a log-mel spectrogram
pub fn mean_mfcc(mel_db: &[Vec<f32>], n_mfcc: usize) -> Vec<f64> {
    let mut totals = vec![0.0f64; n_mfcc];
    let Some(first) = mel_db.first() else {
        return totals;
    };
    let basis = DctBasis::new(first.len(), n_mfcc);
    for frame in mel_db {
        for (total, c) in totals.iter_mut().zip(basis.apply(frame)) {
            *total += c as f64;
        }
    }
    let n = mel_db.len() as f64;
    totals.iter_mut().for_each(|t| *t /= n);
    totals
}
