//! Measured audio features
//!
//! Field names follow the JSON returned by `/analysis/local-only`, so
//! serde renames map internal names onto the wire names (`tempo_bpm` is
//! reported as `bpm`, `timbre_coefficients` as `mfcc`).

use crate::utils::round_to;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Streaming-platform loudness reference
pub const TARGET_LUFS: f64 = -14.0;

/// One of the twelve equal-tempered pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C#")]
    CSharp,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D#")]
    DSharp,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F#")]
    FSharp,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G#")]
    GSharp,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A#")]
    ASharp,
    #[serde(rename = "B")]
    B,
}

impl PitchClass {
    /// Chromatic order starting at C
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Pitch class for a chroma index (wraps modulo 12)
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    /// Chroma index, C = 0
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tonal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => f.write_str("Major"),
            Mode::Minor => f.write_str("Minor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brightness {
    Bright,
    Warm,
}

impl Brightness {
    /// "bright" above 3000 Hz spectral centroid
    pub fn from_centroid(centroid_hz: f64) -> Self {
        if centroid_hz > 3000.0 {
            Brightness::Bright
        } else {
            Brightness::Warm
        }
    }
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Brightness::Bright => f.write_str("bright"),
            Brightness::Warm => f.write_str("warm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicRange {
    High,
    Compressed,
}

impl DynamicRange {
    /// "high" when frame RMS standard deviation exceeds 0.05
    pub fn from_rms_std(std: f64) -> Self {
        if std > 0.05 {
            DynamicRange::High
        } else {
            DynamicRange::Compressed
        }
    }
}

impl fmt::Display for DynamicRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicRange::High => f.write_str("high"),
            DynamicRange::Compressed => f.write_str("compressed"),
        }
    }
}

/// Time-mean spectral descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeatures {
    /// Spectral centroid (Hz)
    pub centroid: f64,
    /// 85% energy rolloff frequency (Hz)
    pub rolloff: f64,
    /// Second-order spectral bandwidth (Hz)
    pub bandwidth: f64,
    /// Fraction of sign changes per frame
    pub zero_crossing_rate: f64,
    pub brightness: Brightness,
}

/// Frame RMS statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyFeatures {
    pub mean: f64,
    pub std: f64,
    pub dynamic_range: DynamicRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmFeatures {
    /// Mean predominant-local-pulse strength
    pub danceability: f64,
    pub beat_count: usize,
}

/// Output of the core feature extractor
///
/// Numbers are stored at reporting precision so the values handed to the
/// reconciler are exactly the values returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreFeatures {
    /// Tempo in BPM, always positive
    #[serde(rename = "bpm")]
    pub tempo_bpm: f64,
    pub key: PitchClass,
    pub mode: Mode,
    pub full_key: String,
    pub duration_seconds: f64,
    /// Heuristic mood labels in rule order, no duplicates
    #[serde(rename = "moods")]
    pub heuristic_moods: Vec<String>,
    pub spectral: SpectralFeatures,
    pub energy: EnergyFeatures,
    pub rhythm: RhythmFeatures,
    /// Mean of the first 13 MFCCs
    #[serde(rename = "mfcc")]
    pub timbre_coefficients: Vec<f64>,
}

/// Loudness normalization recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub target_lufs: f64,
    pub gain_needed_db: f64,
    /// `|gain_needed_db| < 1`
    pub is_compliant: bool,
}

impl Normalization {
    /// Recommendation for a measured integrated loudness
    ///
    /// Unmeasurable loudness (silence) needs no gain.
    pub fn from_lufs(lufs: Option<f64>) -> Self {
        let gain_needed_db = round_to(lufs.map(|l| TARGET_LUFS - l).unwrap_or(0.0), 2);
        Self {
            target_lufs: TARGET_LUFS,
            gain_needed_db,
            is_compliant: gain_needed_db.abs() < 1.0,
        }
    }
}

/// Output of the loudness analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessFeatures {
    /// Integrated loudness; `None` when non-finite (silence)
    pub lufs: Option<f64>,
    /// Sample peak in dBFS; `None` for digital silence
    pub true_peak_db: Option<f64>,
    pub loudness_range_lu: f64,
    pub normalization: Normalization,
}

/// Output of the pitch analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchFeatures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_pitch_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_range_hz: Option<f64>,
    /// Fraction of frames with a confident pitch, in `[0, 1]`
    pub vocal_presence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PitchFeatures {
    /// Result when no frame carries a confident pitch
    pub fn unvoiced() -> Self {
        Self {
            average_pitch_hz: None,
            average_note: None,
            pitch_range_hz: None,
            vocal_presence: 0.0,
            note: Some("Instrumental/No clear vocals".to_string()),
        }
    }
}

/// Tags and stream properties already present in the container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExistingTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    /// kbps
    pub bitrate: Option<u32>,
    pub samplerate: Option<u32>,
    pub channels: Option<u8>,
    pub has_cover: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_class_wire_names() {
        assert_eq!(serde_json::to_value(PitchClass::CSharp).unwrap(), "C#");
        assert_eq!(PitchClass::from_index(13), PitchClass::CSharp);
        assert_eq!(PitchClass::B.index(), 11);
        assert_eq!(serde_json::to_value(Mode::Minor).unwrap(), "Minor");
    }

    #[test]
    fn test_labels() {
        assert_eq!(Brightness::from_centroid(3000.0), Brightness::Warm);
        assert_eq!(Brightness::from_centroid(3000.1), Brightness::Bright);
        assert_eq!(DynamicRange::from_rms_std(0.05), DynamicRange::Compressed);
        assert_eq!(DynamicRange::from_rms_std(0.06), DynamicRange::High);
    }

    #[test]
    fn test_compliance_boundary_is_exclusive() {
        let at_boundary = Normalization::from_lufs(Some(-15.0));
        assert_eq!(at_boundary.gain_needed_db, 1.0);
        assert!(!at_boundary.is_compliant);

        let over = Normalization::from_lufs(Some(-13.0));
        assert_eq!(over.gain_needed_db, -1.0);
        assert!(!over.is_compliant);

        let inside = Normalization::from_lufs(Some(-14.6));
        assert!(inside.is_compliant);
    }

    #[test]
    fn test_compliance_matches_gain_for_any_lufs() {
        let mut lufs = -40.0;
        while lufs < 0.0 {
            let n = Normalization::from_lufs(Some(lufs));
            assert_eq!(n.is_compliant, (TARGET_LUFS - lufs).abs() < 1.0, "lufs {}", lufs);
            lufs += 0.25;
        }
    }

    #[test]
    fn test_compliance_follows_reported_gain_near_boundary() {
        for lufs in [-14.996, -13.004, -14.994, -13.006, -15.004, -12.996] {
            let n = Normalization::from_lufs(Some(lufs));
            assert_eq!(
                n.is_compliant,
                n.gain_needed_db.abs() < 1.0,
                "lufs {} gain {}",
                lufs,
                n.gain_needed_db
            );
        }
        assert!(!Normalization::from_lufs(Some(-14.996)).is_compliant);
        assert!(!Normalization::from_lufs(Some(-13.004)).is_compliant);
        assert!(Normalization::from_lufs(Some(-14.994)).is_compliant);
    }

    #[test]
    fn test_unmeasured_loudness_needs_no_gain() {
        let n = Normalization::from_lufs(None);
        assert_eq!(n.gain_needed_db, 0.0);
        assert!(n.is_compliant);
    }
}
