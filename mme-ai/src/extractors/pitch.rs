//! Pitch Analyzer
//!
//! Monophonic fundamental-frequency tracking over the opening window of
//! the track, used for average pitch, pitch range and vocal presence.
//!
//! # Algorithm
//! 1. First `window_secs` of audio, down-mixed, resampled to 16 kHz
//! 2. Per 10 ms frame: YIN cumulative-mean-normalized difference, first dip
//!    under 0.15 (else global minimum), parabolic refinement
//! 3. Viterbi decoding over 20-cent pitch bins (50 Hz to ~1 kHz): small
//!    steps are cheap, any larger jump pays a flat penalty, so single-frame
//!    octave errors are smoothed away while sustained changes are followed
//! 4. Every frame with confidence above 0.5 counts as voiced; its frequency
//!    is the local estimate where the path confirms it, else the path bin

use crate::dsp::resample_mono;
use crate::dsp::stft::{frame_count, pad_center};
use crate::models::{PitchFeatures, SampleBuffer};
use crate::types::PipelineError;
use crate::utils::round_to;
use tracing::debug;

const SAMPLE_RATE: u32 = 16000;

/// 10 ms hop at 16 kHz
const HOP: usize = 160;

/// YIN integration window
const WINDOW: usize = 512;

/// Lag bounds: 1000 Hz down to 50 Hz
const MIN_TAU: usize = 16;
const MAX_TAU: usize = 320;

const YIN_THRESHOLD: f32 = 0.15;

/// Frames quieter than this RMS are unvoiced
const SILENCE_RMS: f32 = 1e-4;

/// Frames above this confidence are voiced
const CONFIDENCE_THRESHOLD: f64 = 0.5;

const BIN_CENTS: f64 = 20.0;
const N_BINS: usize = 260;
const FMIN_HZ: f64 = 50.0;

/// Largest pitch jump between frames, in bins
const MAX_TRANSITION: usize = 12;

/// Probability mass reserved for jumps beyond `MAX_TRANSITION`
const JUMP_PROB: f64 = 0.01;

/// Local estimates within this many bins of the path are kept as measured
const PATH_TOLERANCE: f64 = 2.0;

/// Emission spread around the measured pitch, in bins
const EMISSION_STD: f64 = 1.5;

const NOTE_NAMES: [&str; 12] = ["A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#"];

/// Nearest equal-tempered note name, e.g. 440 Hz → "A4"
///
/// Piano key `n = 12·log2(f/440) + 49`; names cycle from A and the octave
/// number is `(n + 8) / 12`.
pub fn note_name(freq_hz: f64) -> Option<String> {
    if !(freq_hz.is_finite() && freq_hz > 0.0) {
        return None;
    }
    let key = (12.0 * (freq_hz / 440.0).log2()).round() as i64 + 49;
    let name = NOTE_NAMES[(key - 1).rem_euclid(12) as usize];
    let octave = (key + 8).div_euclid(12);
    Some(format!("{}{}", name, octave))
}

/// Per-frame YIN estimate
#[derive(Debug, Clone, Copy)]
struct Candidate {
    freq_hz: f64,
    confidence: f64,
}

fn bin_of(freq_hz: f64) -> f64 {
    1200.0 * (freq_hz / FMIN_HZ).log2() / BIN_CENTS
}

fn bin_frequency(bin: usize) -> f64 {
    FMIN_HZ * 2f64.powf(bin as f64 * BIN_CENTS / 1200.0)
}

/// YIN over one frame of `WINDOW + MAX_TAU` samples
fn yin(frame: &[f32]) -> Option<Candidate> {
    let head = &frame[..WINDOW];
    let rms = (head.iter().map(|s| s * s).sum::<f32>() / WINDOW as f32).sqrt();
    if rms < SILENCE_RMS {
        return None;
    }

    // Difference function
    let mut diff = vec![0.0f32; MAX_TAU + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = head
            .iter()
            .zip(&frame[tau..tau + WINDOW])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
    }

    // Cumulative mean normalization
    let mut cmnd = vec![1.0f32; MAX_TAU + 1];
    let mut running = 0.0f32;
    for tau in 1..=MAX_TAU {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f32 / running
        } else {
            1.0
        };
    }

    let mut best = (MIN_TAU..=MAX_TAU).find(|&tau| cmnd[tau] < YIN_THRESHOLD);
    if let Some(mut tau) = best {
        while tau < MAX_TAU && cmnd[tau + 1] < cmnd[tau] {
            tau += 1;
        }
        best = Some(tau);
    }
    let tau = best.unwrap_or_else(|| {
        (MIN_TAU..=MAX_TAU)
            .min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
            .unwrap_or(MIN_TAU)
    });

    // Parabolic interpolation around the dip
    let refined = if tau > MIN_TAU && tau < MAX_TAU {
        let (a, b, c) = (cmnd[tau - 1] as f64, cmnd[tau] as f64, cmnd[tau + 1] as f64);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            tau as f64 + 0.5 * (a - c) / denom
        } else {
            tau as f64
        }
    } else {
        tau as f64
    };

    Some(Candidate {
        freq_hz: SAMPLE_RATE as f64 / refined,
        confidence: (1.0 - cmnd[tau] as f64).clamp(0.0, 1.0),
    })
}

/// Most likely bin sequence given per-frame candidates
fn viterbi(candidates: &[Option<Candidate>]) -> Vec<usize> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let uniform = 1.0 / N_BINS as f64;
    let emission = |c: &Option<Candidate>| -> Vec<f64> {
        match c {
            Some(c) => {
                let center = bin_of(c.freq_hz);
                (0..N_BINS)
                    .map(|s| {
                        let z = (s as f64 - center) / EMISSION_STD;
                        let peak = (-0.5 * z * z).exp() / (EMISSION_STD * (2.0 * std::f64::consts::PI).sqrt());
                        (c.confidence * peak + (1.0 - c.confidence) * uniform).max(1e-12).ln()
                    })
                    .collect()
            }
            None => vec![uniform.ln(); N_BINS],
        }
    };

    // Triangular transition weights, normalized per source bin
    let log_weights: Vec<f64> = (0..=MAX_TRANSITION)
        .map(|d| ((MAX_TRANSITION + 1 - d) as f64 * (1.0 - JUMP_PROB)).ln())
        .collect();
    let log_jump = (JUMP_PROB / N_BINS as f64).ln();
    let log_norms: Vec<f64> = (0..N_BINS)
        .map(|from| {
            let lo = from.saturating_sub(MAX_TRANSITION);
            let hi = (from + MAX_TRANSITION).min(N_BINS - 1);
            (lo..=hi)
                .map(|s| (MAX_TRANSITION + 1 - from.abs_diff(s)) as f64)
                .sum::<f64>()
                .ln()
        })
        .collect();
    let log_transition =
        |from: usize, to: usize| -> f64 { log_weights[from.abs_diff(to)] - log_norms[from] };

    let mut score = emission(&candidates[0]);
    let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(candidates.len());

    for c in &candidates[1..] {
        let emit = emission(c);
        let best_from = (0..N_BINS)
            .max_by(|&a, &b| score[a].total_cmp(&score[b]))
            .unwrap_or(0);
        let jump_score = score[best_from] + log_jump;
        let mut next = vec![jump_score; N_BINS];
        let mut back = vec![best_from; N_BINS];
        for to in 0..N_BINS {
            let lo = to.saturating_sub(MAX_TRANSITION);
            let hi = (to + MAX_TRANSITION).min(N_BINS - 1);
            for from in lo..=hi {
                let s = score[from] + log_transition(from, to);
                if s > next[to] {
                    next[to] = s;
                    back[to] = from;
                }
            }
            next[to] += emit[to];
        }
        backpointers.push(back);
        score = next;
    }

    let mut state = (0..N_BINS)
        .max_by(|&a, &b| score[a].total_cmp(&score[b]))
        .unwrap_or(0);
    let mut path = vec![state; candidates.len()];
    for (t, back) in backpointers.iter().enumerate().rev() {
        state = back[state];
        path[t] = state;
    }
    path
}

/// Pitch analyzer over a bounded opening window
#[derive(Debug, Clone)]
pub struct PitchAnalyzer {
    window_secs: f64,
}

impl Default for PitchAnalyzer {
    fn default() -> Self {
        Self { window_secs: 60.0 }
    }
}

impl PitchAnalyzer {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs: window_secs.max(0.0),
        }
    }

    /// Track pitch over the first `window_secs` of `buffer`
    ///
    /// # Errors
    /// Returns `PipelineError::Pitch` for non-finite input or resampling failure
    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<PitchFeatures, PipelineError> {
        let window = buffer.head(self.window_secs);
        let mono = window.to_mono();
        if mono.iter().any(|s| !s.is_finite()) {
            return Err(PipelineError::Pitch("Signal contains non-finite samples".to_string()));
        }
        let y = resample_mono(mono, window.sample_rate(), SAMPLE_RATE)
            .map_err(|e| PipelineError::Pitch(format!("{:#}", e)))?;

        let n_frames = frame_count(y.len(), HOP);
        if n_frames == 0 {
            return Ok(PitchFeatures::unvoiced());
        }

        let frame_len = WINDOW + MAX_TAU;
        let mut padded = pad_center(&y, WINDOW / 2);
        padded.resize(padded.len() + frame_len, 0.0);

        let candidates: Vec<Option<Candidate>> = (0..n_frames)
            .map(|t| yin(&padded[t * HOP..t * HOP + frame_len]))
            .collect();
        let path = viterbi(&candidates);

        let voiced: Vec<f64> = candidates
            .iter()
            .zip(&path)
            .filter_map(|(c, &bin)| {
                let c = (*c).filter(|c| c.confidence > CONFIDENCE_THRESHOLD)?;
                if (bin_of(c.freq_hz) - bin as f64).abs() <= PATH_TOLERANCE {
                    Some(c.freq_hz)
                } else {
                    Some(bin_frequency(bin))
                }
            })
            .collect();

        debug!(
            frames = n_frames,
            voiced = voiced.len(),
            "Pitch tracking complete"
        );

        if voiced.is_empty() {
            return Ok(PitchFeatures::unvoiced());
        }

        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        let max = voiced.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = voiced.iter().copied().fold(f64::INFINITY, f64::min);

        Ok(PitchFeatures {
            average_pitch_hz: Some(round_to(mean, 2)),
            average_note: note_name(mean),
            pitch_range_hz: Some(round_to(max - min, 2)),
            vocal_presence: round_to(voiced.len() as f64 / n_frames as f64, 3),
            note: None,
        })
    }
}
