//! Core Feature Extractor
//!
//! Computes tempo, beats, key/mode, spectral descriptors, RMS energy,
//! pulse clarity and mean MFCCs over the whole signal.
//!
//! # Algorithm
//! 1. Down-mix to mono, resample to 22.05 kHz
//! 2. Centered Hann STFT (2048 / 512)
//! 3. Spectral centroid, 85% rolloff, bandwidth, zero-crossing rate, RMS
//! 4. Time-averaged chromagram → key root and mode
//! 5. Log-mel spectrogram → onset envelope → tempo, beats, pulse clarity
//! 6. Log-mel spectrogram → DCT → mean of 13 MFCCs
//!
//! All-or-nothing: any failure surfaces as `PipelineError::CoreAnalysis`.

use super::mood_heuristics::detect_moods;
use crate::dsp::chroma::{estimate_key, mean_chroma};
use crate::dsp::mel::{mean_mfcc, mel_power, power_to_db, N_MELS, N_MFCC};
use crate::dsp::rhythm::{estimate_tempo, onset_envelope, pulse_clarity, track_beats};
use crate::dsp::stft::{frame_count, pad_center, pad_edge};
use crate::dsp::{resample_mono, Spectrogram, HOP_LENGTH, N_FFT};
use crate::models::{
    Brightness, CoreFeatures, DynamicRange, EnergyFeatures, RhythmFeatures, SampleBuffer,
    SpectralFeatures,
};
use crate::types::PipelineError;
use crate::utils::round_to;
use tracing::debug;

/// Fraction of spectral energy below the rolloff frequency
const ROLL_PERCENT: f64 = 0.85;

/// Extracts [`CoreFeatures`] from a decoded buffer
#[derive(Debug, Clone)]
pub struct CoreFeatureExtractor {
    target_sample_rate: u32,
}

impl Default for CoreFeatureExtractor {
    fn default() -> Self {
        Self {
            target_sample_rate: 22050,
        }
    }
}

impl CoreFeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze the full buffer
    ///
    /// # Errors
    /// Returns `PipelineError::CoreAnalysis` for empty or non-finite input
    /// and for resampling failures
    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<CoreFeatures, PipelineError> {
        if buffer.is_empty() {
            return Err(PipelineError::CoreAnalysis("Audio buffer is empty".to_string()));
        }

        let mono = buffer.to_mono();
        if mono.iter().any(|s| !s.is_finite()) {
            return Err(PipelineError::CoreAnalysis(
                "Signal contains non-finite samples".to_string(),
            ));
        }

        let sr = self.target_sample_rate;
        let y = resample_mono(mono, buffer.sample_rate(), sr)
            .map_err(|e| PipelineError::CoreAnalysis(format!("{:#}", e)))?;
        if y.is_empty() {
            return Err(PipelineError::CoreAnalysis(
                "Resampled signal is empty".to_string(),
            ));
        }

        let spec = Spectrogram::compute(&y, sr, N_FFT, HOP_LENGTH);
        let freqs = spec.bin_frequencies();

        let (centroid, rolloff, bandwidth) = spectral_means(&spec, &freqs);
        let zcr = mean_zero_crossing_rate(&y, N_FFT, HOP_LENGTH);
        let rms = frame_rms(&y, N_FFT, HOP_LENGTH);
        let (rms_mean, rms_std) = mean_std(&rms);

        let chroma = mean_chroma(&spec);
        let (key, mode) = estimate_key(&chroma);

        let mel_db = power_to_db(&mel_power(&spec, N_MELS));
        let envelope = onset_envelope(&mel_db);
        let frame_rate = spec.frame_rate();
        let bpm = estimate_tempo(&envelope, frame_rate);
        let beats = track_beats(&envelope, frame_rate, bpm);
        let clarity = pulse_clarity(&envelope, frame_rate);
        let mfcc = mean_mfcc(&mel_db, N_MFCC);

        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(PipelineError::CoreAnalysis(format!(
                "Tempo estimate out of range: {}",
                bpm
            )));
        }

        let mut features = CoreFeatures {
            tempo_bpm: bpm,
            key,
            mode,
            full_key: format!("{} {}", key, mode),
            duration_seconds: buffer.duration_seconds(),
            heuristic_moods: Vec::new(),
            spectral: SpectralFeatures {
                centroid,
                rolloff,
                bandwidth,
                zero_crossing_rate: zcr,
                brightness: Brightness::from_centroid(centroid),
            },
            energy: EnergyFeatures {
                mean: rms_mean,
                std: rms_std,
                dynamic_range: DynamicRange::from_rms_std(rms_std),
            },
            rhythm: RhythmFeatures {
                danceability: clarity,
                beat_count: beats.len(),
            },
            timbre_coefficients: mfcc,
        };

        // Rules see the measurements; only the reported values are rounded
        features.heuristic_moods = detect_moods(&features);
        round_reported(&mut features);

        debug!(
            bpm = features.tempo_bpm,
            key = %features.full_key,
            beats = features.rhythm.beat_count,
            centroid = features.spectral.centroid,
            moods = ?features.heuristic_moods,
            "Core features extracted"
        );

        Ok(features)
    }
}

/// Time-mean centroid, rolloff and bandwidth
fn spectral_means(spec: &Spectrogram, freqs: &[f64]) -> (f64, f64, f64) {
    let n = spec.n_frames();
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }

    let (mut centroid_sum, mut rolloff_sum, mut bandwidth_sum) = (0.0, 0.0, 0.0);
    for frame in spec.frames() {
        let total: f64 = frame.iter().map(|&m| m as f64).sum();
        if total <= 0.0 {
            continue;
        }

        let centroid = frame
            .iter()
            .zip(freqs)
            .map(|(&m, &f)| m as f64 * f)
            .sum::<f64>()
            / total;

        let threshold = ROLL_PERCENT * total;
        let mut cumulative = 0.0;
        let mut rolloff = 0.0;
        for (&m, &f) in frame.iter().zip(freqs) {
            cumulative += m as f64;
            if cumulative >= threshold {
                rolloff = f;
                break;
            }
        }

        let bandwidth = frame
            .iter()
            .zip(freqs)
            .map(|(&m, &f)| (m as f64 / total) * (f - centroid).powi(2))
            .sum::<f64>()
            .sqrt();

        centroid_sum += centroid;
        rolloff_sum += rolloff;
        bandwidth_sum += bandwidth;
    }

    let n = n as f64;
    (centroid_sum / n, rolloff_sum / n, bandwidth_sum / n)
}

/// Mean fraction of sign changes per frame (edge-padded, centered frames)
fn mean_zero_crossing_rate(y: &[f32], frame_len: usize, hop: usize) -> f64 {
    let n_frames = frame_count(y.len(), hop);
    if n_frames == 0 {
        return 0.0;
    }
    let padded = pad_edge(y, frame_len / 2);

    let total: f64 = (0..n_frames)
        .map(|t| {
            let start = t * hop;
            let end = (start + frame_len).min(padded.len());
            let frame = &padded[start..end];
            let crossings = frame
                .windows(2)
                .filter(|w| w[0].is_sign_negative() != w[1].is_sign_negative())
                .count();
            crossings as f64 / frame_len as f64
        })
        .sum();
    total / n_frames as f64
}

/// Frame-wise RMS amplitude (zero-padded, centered frames)
fn frame_rms(y: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    let n_frames = frame_count(y.len(), hop);
    let padded = pad_center(y, frame_len / 2);
    (0..n_frames)
        .map(|t| {
            let start = t * hop;
            let end = (start + frame_len).min(padded.len());
            let power: f64 = padded[start..end].iter().map(|&s| (s as f64).powi(2)).sum();
            (power / frame_len as f64).sqrt()
        })
        .collect()
}

/// Population mean and standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn round_reported(features: &mut CoreFeatures) {
    features.tempo_bpm = round_to(features.tempo_bpm, 1);
    features.duration_seconds = round_to(features.duration_seconds, 2);
    let spectral = &mut features.spectral;
    spectral.centroid = round_to(spectral.centroid, 2);
    spectral.rolloff = round_to(spectral.rolloff, 2);
    spectral.bandwidth = round_to(spectral.bandwidth, 2);
    spectral.zero_crossing_rate = round_to(spectral.zero_crossing_rate, 4);
    features.energy.mean = round_to(features.energy.mean, 4);
    features.energy.std = round_to(features.energy.std, 4);
    features.rhythm.danceability = round_to(features.rhythm.danceability, 2);
}
