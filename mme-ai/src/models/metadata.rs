//! Transcription, synthesized, and reconciled metadata

use super::features::{
    CoreFeatures, EnergyFeatures, ExistingTags, LoudnessFeatures, Mode, PitchClass,
    PitchFeatures, RhythmFeatures, SpectralFeatures,
};
use crate::types::Measured;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timed span of transcribed speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Speech-to-text result
///
/// A failed transcription has an empty `text` and a populated `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Transcription {
    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            language: None,
            segments: Vec::new(),
            error: Some(cause.into()),
        }
    }

    /// True when transcription succeeded and produced text
    pub fn has_text(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// Raw metadata proposed by the LLM
///
/// Parsed leniently: scalar fields accept strings or numbers, and list
/// fields keep their raw JSON entries so the reconciler can drop
/// non-text items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesizedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub main_genre: Option<String>,
    pub additional_genres: Vec<Value>,
    pub moods: Vec<Value>,
    pub instrumentation: Vec<Value>,
    pub bpm: Option<Value>,
    pub key: Option<String>,
    pub mode: Option<String>,
    pub energy_level: Option<String>,
    pub track_description: Option<String>,
    pub keywords: Vec<Value>,
    pub lyrics: Option<String>,
}

impl SynthesizedMetadata {
    /// Build from a JSON object returned by the generator
    pub fn from_value(value: &Value) -> Self {
        Self {
            title: text_field(value, "title"),
            artist: text_field(value, "artist"),
            album: text_field(value, "album"),
            year: text_field(value, "year"),
            main_genre: text_field(value, "mainGenre"),
            additional_genres: list_field(value, "additionalGenres"),
            moods: list_field(value, "moods"),
            instrumentation: list_field(value, "instrumentation"),
            bpm: value.get("bpm").filter(|v| !v.is_null()).cloned(),
            key: text_field(value, "key"),
            mode: text_field(value, "mode"),
            energy_level: text_field(value, "energyLevel"),
            track_description: text_field(value, "trackDescription"),
            keywords: list_field(value, "keywords"),
            lyrics: text_field(value, "lyrics"),
        }
    }
}

fn text_field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn list_field(value: &Value, name: &str) -> Vec<Value> {
    match value.get(name) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// `technical` block of the final metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSummary {
    #[serde(flatten)]
    pub spectral: SpectralFeatures,
    pub rhythm: RhythmFeatures,
    pub energy: EnergyFeatures,
}

impl TechnicalSummary {
    pub fn from_core(core: &CoreFeatures) -> Self {
        Self {
            spectral: core.spectral.clone(),
            rhythm: core.rhythm.clone(),
            energy: core.energy.clone(),
        }
    }
}

/// Reconciled metadata returned to callers
///
/// `bpm`, `key` and `mode` always come from [`CoreFeatures`]. List fields
/// hold trimmed, non-empty, first-seen-unique strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub bpm: f64,
    pub key: PitchClass,
    pub mode: Mode,
    pub main_genre: String,
    pub additional_genres: Vec<String>,
    pub moods: Vec<String>,
    pub instrumentation: Vec<String>,
    pub technical: TechnicalSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness: Option<Measured<LoudnessFeatures>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<String>,
    pub track_description: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    /// Present only on degraded output
    #[serde(rename = "_note", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Output of a local-only run
#[derive(Debug, Clone, Serialize)]
pub struct LocalAnalysis {
    pub core: CoreFeatures,
    pub loudness: Measured<LoudnessFeatures>,
    pub pitch: Measured<PitchFeatures>,
    pub existing_metadata: Measured<ExistingTags>,
}
