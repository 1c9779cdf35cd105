//! Onset strength, tempo estimation, beat tracking, and pulse clarity
//!
//! **Algorithm:**
//! 1. Onset envelope: mean positive first difference of the log-mel
//!    spectrogram across bands
//! 2. Tempo: autocorrelation of the Gaussian-smoothed envelope weighted by a
//!    log-normal prior centered on 120 BPM, refined by parabolic
//!    interpolation. Smoothing keeps periods that fall between two frames
//!    (140 BPM is 18.46 frames) from splitting their peak across two lags.
//! 3. Beats: dynamic programming over the envelope with a log-interval
//!    tightness penalty
//! 4. Pulse clarity: predominant local pulse (PLP) from a Fourier tempogram

use super::stft::{hann_window, pad_center};
use rustfft::{num_complex::Complex, FftPlanner};

/// Prior center and fallback tempo
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Prior width in octaves
const TEMPO_STD_OCTAVES: f64 = 1.0;

/// Tempo search range
const MIN_TEMPO_BPM: f64 = 30.0;
const MAX_TEMPO_BPM: f64 = 320.0;

/// Longest lag considered, in envelope frames
const AC_WINDOW: usize = 384;

/// Envelope smoothing before autocorrelation, in frames
const TEMPO_SMOOTHING_SIGMA: f64 = 1.0;

/// Beat tracker tightness
const TIGHTNESS: f64 = 100.0;

/// Tempogram window and tempo band for PLP
const PLP_WINDOW: usize = 384;
const PLP_MIN_BPM: f64 = 30.0;
const PLP_MAX_BPM: f64 = 300.0;

/// Onset strength envelope from a log-mel spectrogram (`[frame][mel]`)
///
/// Frame 0 has no predecessor and is zero.
pub fn onset_envelope(mel_db: &[Vec<f32>]) -> Vec<f32> {
    let mut env = Vec::with_capacity(mel_db.len());
    if mel_db.is_empty() {
        return env;
    }
    env.push(0.0);
    for pair in mel_db.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let n = cur.len().max(1) as f32;
        let flux: f32 = cur
            .iter()
            .zip(prev)
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        env.push(flux / n);
    }
    env
}

/// Autocorrelation of `signal` for lags `0..max_lag` via FFT
pub fn autocorrelate(signal: &[f32], max_lag: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return vec![0.0; max_lag];
    }
    let size = (2 * n).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&s| Complex::new(s as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    (0..max_lag)
        .map(|lag| buffer.get(lag).map_or(0.0, |c| c.re / size as f64))
        .collect()
}

/// Convolve with a normalized Gaussian of `sigma` frames (zero outside the signal)
fn gaussian_smooth(signal: &[f32], sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();
    let n = signal.len() as isize;
    (0..n)
        .map(|i| {
            let acc: f64 = kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + k as isize - radius;
                    (0..n).contains(&j).then(|| w * signal[j as usize] as f64)
                })
                .sum();
            (acc / norm) as f32
        })
        .collect()
}

fn tempo_prior(bpm: f64) -> f64 {
    let z = (bpm.log2() - DEFAULT_TEMPO_BPM.log2()) / TEMPO_STD_OCTAVES;
    (-0.5 * z * z).exp()
}

/// Estimate a single tempo in BPM
///
/// Always returns a positive value: an envelope with no periodic energy
/// yields [`DEFAULT_TEMPO_BPM`].
pub fn estimate_tempo(envelope: &[f32], frame_rate: f64) -> f64 {
    let max_lag = AC_WINDOW.min(envelope.len());
    if max_lag < 3 || frame_rate <= 0.0 {
        return DEFAULT_TEMPO_BPM;
    }

    let smoothed = gaussian_smooth(envelope, TEMPO_SMOOTHING_SIGMA);
    let mean = smoothed.iter().map(|&v| v as f64).sum::<f64>() / smoothed.len() as f64;
    let centered: Vec<f32> = smoothed.iter().map(|&v| (v as f64 - mean) as f32).collect();
    let ac = autocorrelate(&centered, max_lag);
    if ac[0] <= 0.0 {
        return DEFAULT_TEMPO_BPM;
    }

    let min_lag = ((60.0 * frame_rate / MAX_TEMPO_BPM).floor() as usize).max(1);
    let max_lag_bpm = ((60.0 * frame_rate / MIN_TEMPO_BPM).ceil() as usize).min(max_lag - 1);

    let score = |lag: usize| -> f64 {
        let bpm = 60.0 * frame_rate / lag as f64;
        (ac[lag] / ac[0]).max(0.0) * tempo_prior(bpm)
    };

    let mut best_lag = 0;
    let mut best_score = 0.0;
    for lag in min_lag..=max_lag_bpm {
        let s = score(lag);
        if s > best_score {
            best_score = s;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        return DEFAULT_TEMPO_BPM;
    }

    // Parabolic refinement of the peak lag
    let mut lag = best_lag as f64;
    if best_lag > min_lag && best_lag < max_lag_bpm {
        let (a, b, c) = (score(best_lag - 1), best_score, score(best_lag + 1));
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            let offset = 0.5 * (a - c) / denom;
            if offset.abs() <= 0.5 {
                lag += offset;
            }
        }
    }

    60.0 * frame_rate / lag
}

/// Track beats at a given tempo
///
/// Returns beat positions in envelope frames. Weak beats at the edges are
/// trimmed; an envelope without onsets yields no beats.
pub fn track_beats(envelope: &[f32], frame_rate: f64, bpm: f64) -> Vec<usize> {
    let n = envelope.len();
    if n == 0 || bpm <= 0.0 || !envelope.iter().any(|&v| v > 0.0) {
        return Vec::new();
    }

    let period = 60.0 * frame_rate / bpm;
    if period < 1.0 {
        return Vec::new();
    }

    // Normalize by standard deviation
    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = envelope
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    let std = var.sqrt().max(1e-12);
    let onset: Vec<f64> = envelope.iter().map(|&v| v as f64 / std).collect();

    // Smooth with a Gaussian about one period wide
    let half = period.round() as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|x| (-0.5 * (x as f64 * 32.0 / period).powi(2)).exp())
        .collect();
    let local: Vec<f64> = (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + k as isize - half;
                    (j >= 0 && (j as usize) < n).then(|| w * onset[j as usize])
                })
                .sum()
        })
        .collect();

    let mut cumulative = vec![0.0f64; n];
    let mut backlink = vec![-1isize; n];
    let window_start = (2.0 * period).round() as isize;
    let window_end = (period / 2.0).round().max(1.0) as isize;
    let max_local = local.iter().copied().fold(0.0, f64::max);
    let mut started = false;

    for i in 0..n {
        let mut best = f64::NEG_INFINITY;
        let mut best_j = -1isize;
        let lo = i as isize - window_start;
        let hi = i as isize - window_end;
        let mut j = lo.max(0);
        while j <= hi {
            let interval = (i as isize - j) as f64;
            let penalty = -TIGHTNESS * (interval / period).ln().powi(2);
            let candidate = cumulative[j as usize] + penalty;
            if candidate > best {
                best = candidate;
                best_j = j;
            }
            j += 1;
        }

        // Beats before the first meaningful onset have no predecessor
        if !started && local[i] >= 0.01 * max_local {
            started = true;
        }
        if best_j >= 0 && started {
            cumulative[i] = local[i] + best;
            backlink[i] = best_j;
        } else {
            cumulative[i] = local[i];
        }
    }

    // Last beat: the final local maximum above half the median peak
    let peaks: Vec<usize> = (0..n)
        .filter(|&i| {
            let left = if i == 0 { f64::NEG_INFINITY } else { cumulative[i - 1] };
            let right = if i + 1 == n { f64::NEG_INFINITY } else { cumulative[i + 1] };
            cumulative[i] > left && cumulative[i] >= right
        })
        .collect();
    if peaks.is_empty() {
        return Vec::new();
    }
    let mut peak_values: Vec<f64> = peaks.iter().map(|&i| cumulative[i]).collect();
    peak_values.sort_by(|a, b| a.total_cmp(b));
    let median = peak_values[peak_values.len() / 2];
    let Some(&tail) = peaks.iter().rev().find(|&&i| cumulative[i] >= 0.5 * median) else {
        return Vec::new();
    };

    let mut beats = vec![tail];
    let mut cursor = backlink[tail];
    while cursor >= 0 {
        beats.push(cursor as usize);
        cursor = backlink[cursor as usize];
    }
    beats.reverse();

    // Trim weak leading and trailing beats
    let rms = (local.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
    let threshold = 0.5 * rms;
    while beats.first().is_some_and(|&b| local[b] < threshold) {
        beats.remove(0);
    }
    while beats.last().is_some_and(|&b| local[b] < threshold) {
        beats.pop();
    }
    beats
}

/// Mean predominant local pulse strength in `[0, 1]`
///
/// Each tempogram frame keeps only its strongest tempo component inside
/// the tempo band. Overlap-adding those sinusoids gives the pulse curve,
/// which is half-wave rectified and peak-normalized before averaging.
pub fn pulse_clarity(envelope: &[f32], frame_rate: f64) -> f64 {
    let n = envelope.len();
    if n == 0 || !envelope.iter().any(|&v| v > 0.0) {
        return 0.0;
    }

    let win = PLP_WINDOW;
    let half = win / 2;
    let window = hann_window(win);
    let padded = pad_center(envelope, half);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(win);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); win];

    let bin_bpm = |k: usize| k as f64 * 60.0 * frame_rate / win as f64;
    let band: Vec<usize> = (1..win / 2)
        .filter(|&k| (PLP_MIN_BPM..=PLP_MAX_BPM).contains(&bin_bpm(k)))
        .collect();
    if band.is_empty() {
        return 0.0;
    }

    let mut pulse = vec![0.0f64; n];
    let mut norm = vec![0.0f64; n];

    for t in 0..n {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(padded[t + i] * window[i], 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);

        let Some(&peak) = band
            .iter()
            .max_by(|&&a, &&b| buffer[a].norm().total_cmp(&buffer[b].norm()))
        else {
            continue;
        };
        let mag = buffer[peak].norm();
        if mag <= 0.0 {
            continue;
        }
        let phase = buffer[peak] / mag;

        // Synthesize the unit-magnitude component over this frame
        for (m, &w) in window.iter().enumerate() {
            let pos = t as isize + m as isize - half as isize;
            if pos < 0 || pos as usize >= n {
                continue;
            }
            let angle = 2.0 * std::f32::consts::PI * peak as f32 * m as f32 / win as f32;
            let rotated = phase * Complex::new(angle.cos(), angle.sin());
            let sample = 2.0 * rotated.re as f64 / win as f64;
            pulse[pos as usize] += w as f64 * sample;
            norm[pos as usize] += (w as f64).powi(2);
        }
    }

    for (p, w) in pulse.iter_mut().zip(&norm) {
        *p = if *w > 1e-10 { (*p / w).max(0.0) } else { 0.0 };
    }
    let peak = pulse.iter().copied().fold(0.0, f64::max);
    if peak <= 0.0 {
        return 0.0;
    }
    pulse.iter().map(|p| p / peak).sum::<f64>() / n as f64
}
