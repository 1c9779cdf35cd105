//! Mood Heuristics
//!
//! Fixed threshold rules over [`CoreFeatures`]. Every rule is evaluated
//! independently, so a track may carry several labels.

use crate::models::{CoreFeatures, Mode};

/// A single threshold rule
struct MoodRule {
    label: &'static str,
    applies: fn(&CoreFeatures) -> bool,
}

const RULES: &[MoodRule] = &[
    MoodRule {
        label: "Energetic",
        applies: |f| f.energy.mean > 0.1 && f.tempo_bpm > 120.0,
    },
    MoodRule {
        label: "Calm",
        applies: |f| f.energy.mean < 0.05 && f.tempo_bpm < 100.0,
    },
    MoodRule {
        label: "Happy",
        applies: |f| f.mode == Mode::Major && f.tempo_bpm > 110.0,
    },
    MoodRule {
        label: "Melancholic",
        applies: |f| f.mode == Mode::Minor && f.tempo_bpm < 110.0,
    },
    MoodRule {
        label: "Danceable",
        applies: |f| f.rhythm.danceability > 1.2,
    },
    MoodRule {
        label: "Dark",
        applies: |f| f.spectral.centroid < 1500.0,
    },
    MoodRule {
        label: "Bright",
        applies: |f| f.spectral.centroid > 3500.0,
    },
];

/// Mood labels matched by `features`, in rule order
pub fn detect_moods(features: &CoreFeatures) -> Vec<String> {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(features))
        .map(|rule| rule.label.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Brightness, DynamicRange, EnergyFeatures, PitchClass, RhythmFeatures, SpectralFeatures,
    };

    fn features(bpm: f64, mode: Mode, centroid: f64, energy: f64) -> CoreFeatures {
        CoreFeatures {
            tempo_bpm: bpm,
            key: PitchClass::C,
            mode,
            full_key: format!("C {}", mode),
            duration_seconds: 180.0,
            heuristic_moods: Vec::new(),
            spectral: SpectralFeatures {
                centroid,
                rolloff: 6000.0,
                bandwidth: 2500.0,
                zero_crossing_rate: 0.08,
                brightness: Brightness::from_centroid(centroid),
            },
            energy: EnergyFeatures {
                mean: energy,
                std: 0.03,
                dynamic_range: DynamicRange::Compressed,
            },
            rhythm: RhythmFeatures {
                danceability: 0.4,
                beat_count: 300,
            },
            timbre_coefficients: vec![0.0; 13],
        }
    }

    #[test]
    fn test_bright_upbeat_major_track() {
        let moods = detect_moods(&features(123.0, Mode::Major, 4000.0, 0.15));
        assert_eq!(moods, vec!["Energetic", "Happy", "Bright"]);
    }

    #[test]
    fn test_energetic_threshold_is_exclusive() {
        // The tempo bound is strict: a track measured at exactly 120 BPM is
        // not Energetic, so upbeat scenarios are exercised at 123 BPM above
        let moods = detect_moods(&features(120.0, Mode::Major, 4000.0, 0.15));
        assert!(!moods.contains(&"Energetic".to_string()));
        assert!(moods.contains(&"Happy".to_string()));
    }

    #[test]
    fn test_quiet_slow_minor_track() {
        let moods = detect_moods(&features(80.0, Mode::Minor, 1200.0, 0.02));
        assert_eq!(moods, vec!["Calm", "Melancholic", "Dark"]);
    }

    #[test]
    fn test_middle_of_the_road_matches_nothing() {
        let moods = detect_moods(&features(110.0, Mode::Major, 2500.0, 0.07));
        assert!(moods.is_empty());
    }

    #[test]
    fn test_danceable() {
        let mut f = features(100.0, Mode::Major, 2500.0, 0.07);
        f.rhythm.danceability = 1.5;
        assert_eq!(detect_moods(&f), vec!["Danceable"]);
    }
}
