//! 12-bin chromagram and key/mode estimation

use super::stft::Spectrogram;
use crate::models::{Mode, PitchClass};

/// Lowest frequency folded into the chromagram (A0)
const CHROMA_FMIN: f64 = 27.5;

/// Highest frequency folded into the chromagram
const CHROMA_FMAX: f64 = 8000.0;

/// Pitch class index (C = 0) nearest to `freq_hz`
pub fn pitch_class_of(freq_hz: f64) -> usize {
    // A4 = 440 Hz sits at index 9
    let semitones_from_a4 = (12.0 * (freq_hz / 440.0).log2()).round() as i64;
    (semitones_from_a4 + 9).rem_euclid(12) as usize
}

/// Time-averaged chroma energy
///
/// Each frame's power is folded into pitch classes, normalized so the
/// loudest class is 1.0, then averaged across frames. Silent frames
/// contribute zeros.
pub fn mean_chroma(spec: &Spectrogram) -> [f64; 12] {
    let bin_classes: Vec<Option<usize>> = (0..spec.n_bins())
        .map(|k| {
            let f = spec.bin_frequency(k);
            (CHROMA_FMIN..=CHROMA_FMAX.min(spec.sample_rate() as f64 / 2.0))
                .contains(&f)
                .then(|| pitch_class_of(f))
        })
        .collect();

    let mut totals = [0.0f64; 12];
    if spec.n_frames() == 0 {
        return totals;
    }

    for frame in spec.frames() {
        let mut chroma = [0.0f64; 12];
        for (mag, class) in frame.iter().zip(&bin_classes) {
            if let Some(c) = class {
                chroma[*c] += (*mag as f64) * (*mag as f64);
            }
        }
        let peak = chroma.iter().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            for (total, c) in totals.iter_mut().zip(chroma) {
                *total += c / peak;
            }
        }
    }

    let n = spec.n_frames() as f64;
    totals.iter_mut().for_each(|t| *t /= n);
    totals
}

/// Key root and mode from mean chroma
///
/// The root is the strongest pitch class (first wins on ties). Mode is
/// Major when the major third above the root carries more energy than the
/// minor third.
pub fn estimate_key(chroma: &[f64; 12]) -> (PitchClass, Mode) {
    let mut root = 0;
    for (i, &v) in chroma.iter().enumerate() {
        if v > chroma[root] {
            root = i;
        }
    }
    let major_third = chroma[(root + 4) % 12];
    let minor_third = chroma[(root + 3) % 12];
    let mode = if major_third > minor_third {
        Mode::Major
    } else {
        Mode::Minor
    };
    (PitchClass::from_index(root), mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::stft::{HOP_LENGTH, N_FFT};

    fn tones(freqs: &[(f32, f32)], sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                freqs
                    .iter()
                    .map(|(f, a)| a * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_pitch_class_of_reference_tones() {
        assert_eq!(pitch_class_of(440.0), 9);
        assert_eq!(pitch_class_of(261.63), 0);
        assert_eq!(pitch_class_of(329.63), 4);
        assert_eq!(pitch_class_of(30.87), 11);
    }

    #[test]
    fn test_c_major_dyad() {
        let signal = tones(&[(261.63, 0.5), (329.63, 0.2)], 22050, 2.0);
        let spec = Spectrogram::compute(&signal, 22050, N_FFT, HOP_LENGTH);
        let chroma = mean_chroma(&spec);
        assert_eq!(estimate_key(&chroma), (PitchClass::C, Mode::Major));
    }

    #[test]
    fn test_a_minor_dyad() {
        let signal = tones(&[(440.0, 0.5), (523.25, 0.2)], 22050, 2.0);
        let spec = Spectrogram::compute(&signal, 22050, N_FFT, HOP_LENGTH);
        let chroma = mean_chroma(&spec);
        assert_eq!(estimate_key(&chroma), (PitchClass::A, Mode::Minor));
    }

    #[test]
    fn test_silence_is_all_zero() {
        let spec = Spectrogram::compute(&vec![0.0; 4096], 22050, N_FFT, HOP_LENGTH);
        assert_eq!(mean_chroma(&spec), [0.0; 12]);
        // Ties resolve to the first class
        assert_eq!(estimate_key(&[0.0; 12]), (PitchClass::C, Mode::Minor));
    }
}
