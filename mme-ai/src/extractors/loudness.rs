//! Loudness Analyzer
//!
//! Gated integrated loudness (ITU-R BS.1770), sample peak, a segment-based
//! loudness range and a normalization recommendation against -14 LUFS.
//!
//! Mono input is duplicated to two channels before measurement, so a mono
//! file reads the same as the equivalent dual-mono stereo file.

use crate::models::{LoudnessFeatures, Normalization, SampleBuffer};
use crate::types::PipelineError;
use crate::utils::round_to;
use tracing::debug;

/// Gating block length (seconds)
const BLOCK_SECS: f64 = 0.4;

/// Block overlap fraction
const BLOCK_OVERLAP: f64 = 0.75;

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;

/// Default loudness-range segment length (seconds)
const SEGMENT_SECS: f64 = 3.0;

/// Two-stage K-weighting pre-filter, transposed direct form II
#[derive(Debug, Clone)]
struct KWeightingFilter {
    shelf: Biquad,
    high_pass: Biquad,
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

impl KWeightingFilter {
    fn new(fs: f64) -> Self {
        Self {
            shelf: Self::high_shelf(fs),
            high_pass: Self::high_pass(fs),
        }
    }

    /// +4 dB high shelf modelling the acoustic effect of the head
    fn high_shelf(fs: f64) -> Biquad {
        let gain_db = 4.0;
        let f0 = 1681.974450955533;
        let q = 0.7071752369554196;

        let k = (std::f64::consts::PI * f0 / fs).tan();
        let vh = 10.0_f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let norm = 1.0 / (1.0 + k / q + k * k);

        Biquad::new(
            (vh + vb * k / q + k * k) * norm,
            2.0 * (k * k - vh) * norm,
            (vh - vb * k / q + k * k) * norm,
            2.0 * (k * k - 1.0) * norm,
            (1.0 - k / q + k * k) * norm,
        )
    }

    /// RLB high-pass; numerator is left unnormalized as in BS.1770
    fn high_pass(fs: f64) -> Biquad {
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (std::f64::consts::PI * f0 / fs).tan();
        let norm = 1.0 / (1.0 + k / q + k * k);

        Biquad::new(
            1.0,
            -2.0,
            1.0,
            2.0 * (k * k - 1.0) * norm,
            (1.0 - k / q + k * k) * norm,
        )
    }

    /// Filter a whole channel from rest
    fn apply(mut self, samples: &[f32]) -> Vec<f64> {
        samples
            .iter()
            .map(|&x| self.high_pass.process(self.shelf.process(x as f64)))
            .collect()
    }
}

/// Per-channel weighting: surround channels (index 3 and up) get +1.5 dB
fn channel_weight(index: usize) -> f64 {
    if index >= 3 {
        1.41
    } else {
        1.0
    }
}

/// Gated integrated loudness of planar channels
///
/// Returns `Ok(f64::NEG_INFINITY)` when every block is gated out (silence).
///
/// # Errors
/// Returns `PipelineError::Loudness` when the signal is shorter than one
/// 400 ms gating block
pub fn integrated_loudness(channels: &[&[f32]], sample_rate: u32) -> Result<f64, PipelineError> {
    let rate = sample_rate as f64;
    let n = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let block_len = BLOCK_SECS * rate;
    if channels.is_empty() || sample_rate == 0 || (n as f64) < block_len {
        return Err(PipelineError::Loudness(format!(
            "Audio must be at least {} ms long",
            (BLOCK_SECS * 1000.0) as u32
        )));
    }

    let duration = n as f64 / rate;
    let step = 1.0 - BLOCK_OVERLAP;
    let n_blocks = ((duration - BLOCK_SECS) / (BLOCK_SECS * step)).round() as usize + 1;

    // Prefix sums of squared K-weighted samples per channel
    let prefix: Vec<Vec<f64>> = channels
        .iter()
        .map(|c| {
            let filtered = KWeightingFilter::new(rate).apply(&c[..n]);
            let mut acc = Vec::with_capacity(n + 1);
            acc.push(0.0);
            let mut sum = 0.0;
            for v in filtered {
                sum += v * v;
                acc.push(sum);
            }
            acc
        })
        .collect();

    // z[j][i]: mean square of block j on channel i
    let blocks: Vec<Vec<f64>> = (0..n_blocks)
        .map(|j| {
            let lo = ((BLOCK_SECS * j as f64 * step * rate) as usize).min(n);
            let hi = ((BLOCK_SECS * (j as f64 * step + 1.0) * rate) as usize).min(n);
            prefix
                .iter()
                .map(|p| (p[hi] - p[lo]) / block_len)
                .collect()
        })
        .collect();

    let block_loudness = |z: &[f64]| -> f64 {
        let weighted: f64 = z.iter().enumerate().map(|(i, v)| channel_weight(i) * v).sum();
        -0.691 + 10.0 * weighted.log10()
    };
    let loudness: Vec<f64> = blocks.iter().map(|z| block_loudness(z)).collect();

    let gated_mean = |keep: &dyn Fn(f64) -> bool| -> Option<Vec<f64>> {
        let selected: Vec<&Vec<f64>> = blocks
            .iter()
            .zip(&loudness)
            .filter(|(_, l)| keep(**l))
            .map(|(z, _)| z)
            .collect();
        if selected.is_empty() {
            return None;
        }
        let count = selected.len() as f64;
        Some(
            (0..channels.len())
                .map(|i| selected.iter().map(|z| z[i]).sum::<f64>() / count)
                .collect(),
        )
    };

    let Some(abs_mean) = gated_mean(&|l| l >= ABSOLUTE_GATE_LUFS) else {
        return Ok(f64::NEG_INFINITY);
    };
    let relative_gate = block_loudness(&abs_mean) + RELATIVE_GATE_LU;

    match gated_mean(&|l| l > relative_gate && l > ABSOLUTE_GATE_LUFS) {
        Some(mean) => Ok(block_loudness(&mean)),
        None => Ok(f64::NEG_INFINITY),
    }
}

/// Loudness analyzer over the full buffer
#[derive(Debug, Clone)]
pub struct LoudnessAnalyzer {
    segment_secs: f64,
}

impl Default for LoudnessAnalyzer {
    fn default() -> Self {
        Self {
            segment_secs: SEGMENT_SECS,
        }
    }
}

impl LoudnessAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure loudness features
    ///
    /// Silence yields `lufs = None` and `true_peak_db = None`, never an error.
    ///
    /// # Errors
    /// Returns `PipelineError::Loudness` for input shorter than one gating block
    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<LoudnessFeatures, PipelineError> {
        let mut planar = buffer.planar();
        if planar.len() == 1 {
            planar.push(planar[0].clone());
        }
        let rate = buffer.sample_rate();
        let views: Vec<&[f32]> = planar.iter().map(Vec::as_slice).collect();

        let lufs = integrated_loudness(&views, rate)?;
        let lufs = lufs.is_finite().then(|| round_to(lufs, 2));

        let peak = buffer.peak() as f64;
        let true_peak_db = (peak > 0.0).then(|| 20.0 * peak.log10());

        let range = self.loudness_range(&views, rate);

        debug!(
            lufs = ?lufs,
            true_peak_db = ?true_peak_db,
            loudness_range_lu = range,
            "Loudness measured"
        );

        Ok(LoudnessFeatures {
            lufs,
            true_peak_db: true_peak_db.map(|p| round_to(p, 2)),
            loudness_range_lu: round_to(range, 2),
            normalization: Normalization::from_lufs(lufs),
        })
    }

    /// Max minus min loudness over full fixed-length segments
    ///
    /// Segments with unmeasurable loudness are ignored; no valid segment
    /// gives 0.
    fn loudness_range(&self, channels: &[&[f32]], sample_rate: u32) -> f64 {
        let seg_len = (self.segment_secs * sample_rate as f64) as usize;
        let n = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        if seg_len == 0 {
            return 0.0;
        }

        let values: Vec<f64> = (0..n / seg_len)
            .filter_map(|s| {
                let segment: Vec<&[f32]> = channels
                    .iter()
                    .map(|c| &c[s * seg_len..(s + 1) * seg_len])
                    .collect();
                integrated_loudness(&segment, sample_rate)
                    .ok()
                    .filter(|l| l.is_finite())
            })
            .collect();

        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        if values.is_empty() {
            0.0
        } else {
            max - min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amp: f32, sr: u32, seconds: f32) -> Vec<f32> {
        (0..(sr as f32 * seconds) as usize)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_k_weighting_matches_published_48k_coefficients() {
        let shelf = KWeightingFilter::high_shelf(48000.0);
        assert!((shelf.b0 - 1.53512485958697).abs() < 1e-4);
        assert!((shelf.b1 + 2.69169618940638).abs() < 1e-4);
        assert!((shelf.b2 - 1.19839281085285).abs() < 1e-4);
        assert!((shelf.a1 + 1.69065929318241).abs() < 1e-4);
        assert!((shelf.a2 - 0.73248077421585).abs() < 1e-4);
        let hp = KWeightingFilter::high_pass(48000.0);
        assert_eq!((hp.b0, hp.b1, hp.b2), (1.0, -2.0, 1.0));
        assert!((hp.a1 + 1.99004745483398).abs() < 1e-4);
        assert!((hp.a2 - 0.99007225036621).abs() < 1e-4);
    }

    #[test]
    fn test_minus_20_dbfs_sine_reads_minus_20_lufs() {
        // 1 kHz at -20 dBFS on both channels
        let buf = SampleBuffer::from_mono(sine(1000.0, 0.1, 48000, 5.0), 48000);
        let l = LoudnessAnalyzer::new().analyze(&buf).unwrap();

        let lufs = l.lufs.unwrap();
        assert!((lufs + 20.0).abs() < 0.3, "lufs {}", lufs);
        assert!((l.true_peak_db.unwrap() + 20.0).abs() < 0.05);
        assert!(l.loudness_range_lu < 0.1);
        assert!((l.normalization.gain_needed_db - 6.0).abs() < 0.3);
        assert!(!l.normalization.is_compliant);
    }

    #[test]
    fn test_silence_reports_null_loudness() {
        let buf = SampleBuffer::from_mono(vec![0.0; 44100 * 4], 44100);
        let l = LoudnessAnalyzer::new().analyze(&buf).unwrap();
        assert_eq!(l.lufs, None);
        assert_eq!(l.true_peak_db, None);
        assert_eq!(l.loudness_range_lu, 0.0);
        assert_eq!(l.normalization.gain_needed_db, 0.0);
        assert!(l.normalization.is_compliant);

        let json = serde_json::to_value(&l).unwrap();
        assert!(json["lufs"].is_null());
    }

    #[test]
    fn test_loudness_range_spans_segments() {
        let mut samples = sine(1000.0, 0.1, 44100, 3.0);
        samples.extend(sine(1000.0, 0.01, 44100, 3.0));
        let buf = SampleBuffer::from_mono(samples, 44100);
        let l = LoudnessAnalyzer::new().analyze(&buf).unwrap();
        assert!((l.loudness_range_lu - 20.0).abs() < 0.5, "range {}", l.loudness_range_lu);
    }

    #[test]
    fn test_too_short_is_loudness_error() {
        let buf = SampleBuffer::from_mono(sine(1000.0, 0.1, 44100, 0.2), 44100);
        let err = LoudnessAnalyzer::new().analyze(&buf).unwrap_err();
        assert!(matches!(err, PipelineError::Loudness(_)));
        assert!(!err.is_fatal());
    }
}
