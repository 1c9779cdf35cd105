//! Reconciliation of measured facts and synthesized metadata
//!
//! # Precedence
//! - `bpm`, `key`, `mode`: always the locally measured values
//! - moods: AI moods, or heuristic moods when the AI gave none
//!   ([`MoodMergePolicy::Union`] keeps both)
//! - `mainGenre`: AI genre in vocabulary spelling, else the existing tag
//!   genre if it is in the vocabulary, else "Unknown"
//! - title/artist/album: AI value, else existing tag, else a placeholder
//! - list fields: trimmed, non-empty strings, first occurrence kept

use super::vocabulary::Vocabulary;
use crate::models::{
    CoreFeatures, ExistingTags, FinalMetadata, LoudnessFeatures, Mode, PitchClass,
    SynthesizedMetadata, TechnicalSummary, Transcription,
};
use crate::types::Measured;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Note attached to output built without an LLM
pub const AI_UNAVAILABLE_NOTE: &str =
    "AI metadata generation unavailable. Configure GROQ_API_KEY for full features.";

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const DEFAULT_ALBUM: &str = "Single";
pub const UNKNOWN_GENRE: &str = "Unknown";

/// How heuristic and AI moods combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodMergePolicy {
    /// AI moods when present, heuristic moods otherwise
    #[default]
    AiFirst,
    /// AI moods followed by heuristic moods
    Union,
}

impl std::str::FromStr for MoodMergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai_first" | "ai-first" | "" => Ok(MoodMergePolicy::AiFirst),
            "union" | "both" => Ok(MoodMergePolicy::Union),
            other => Err(format!("Unknown mood policy: {}", other)),
        }
    }
}

/// Facts that local measurement owns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredFacts {
    pub bpm: f64,
    pub key: PitchClass,
    pub mode: Mode,
}

impl MeasuredFacts {
    /// Take bpm/key/mode from `core`, logging any AI disagreement
    pub fn resolve(core: &CoreFeatures, synthesized: &SynthesizedMetadata) -> Self {
        let ai_bpm = synthesized.bpm.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        });
        if let Some(bpm) = ai_bpm.filter(|b| (b - core.tempo_bpm).abs() > 0.05) {
            debug!(measured = core.tempo_bpm, synthesized = bpm, "Overriding AI bpm");
        }
        if let Some(key) = synthesized.key.as_deref().filter(|k| *k != core.key.as_str()) {
            debug!(measured = %core.key, synthesized = key, "Overriding AI key");
        }
        if let Some(mode) = synthesized
            .mode
            .as_deref()
            .filter(|m| !m.eq_ignore_ascii_case(&core.mode.to_string()))
        {
            debug!(measured = %core.mode, synthesized = mode, "Overriding AI mode");
        }

        Self {
            bpm: core.tempo_bpm,
            key: core.key,
            mode: core.mode,
        }
    }
}

/// Deduplicate raw JSON list entries
///
/// Keeps string entries only, trimmed; drops empties; first occurrence wins.
pub fn dedup_list(items: &[Value]) -> Vec<String> {
    let strings: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    dedup_strings(&strings)
}

/// Trim, drop empties and keep first occurrences, preserving order
pub fn dedup_strings(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Combine heuristic and AI moods per `policy`
pub fn merge_moods(heuristic: &[String], ai: &[Value], policy: MoodMergePolicy) -> Vec<String> {
    let ai = dedup_list(ai);
    if ai.is_empty() {
        return dedup_strings(heuristic);
    }
    match policy {
        MoodMergePolicy::AiFirst => ai,
        MoodMergePolicy::Union => {
            let mut all = ai;
            all.extend(heuristic.iter().cloned());
            dedup_strings(&all)
        }
    }
}

/// Local results shared by the full and degraded outputs
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInputs<'a> {
    pub core: &'a CoreFeatures,
    pub loudness: &'a Measured<LoudnessFeatures>,
    pub existing: Option<&'a ExistingTags>,
    pub transcription: Option<&'a Transcription>,
    /// Uploaded filename, last-resort title
    pub source_name: &'a str,
}

impl ReconcileInputs<'_> {
    fn existing_title(&self) -> String {
        self.existing
            .and_then(|t| t.title.clone())
            .unwrap_or_else(|| self.source_name.to_string())
    }

    fn existing_artist(&self) -> String {
        self.existing
            .and_then(|t| t.artist.clone())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string())
    }

    fn existing_album(&self) -> String {
        self.existing
            .and_then(|t| t.album.clone())
            .unwrap_or_else(|| DEFAULT_ALBUM.to_string())
    }

    fn template_description(&self) -> String {
        format!(
            "Audio track at {:.1} BPM in {}",
            self.core.tempo_bpm, self.core.full_key
        )
    }
}

fn main_genre(synthesized: Option<&str>, existing: Option<&str>, vocab: &Vocabulary) -> String {
    synthesized
        .and_then(|g| vocab.canonical_genre(g))
        .or_else(|| existing.and_then(|g| vocab.canonical_genre(g)))
        .unwrap_or(UNKNOWN_GENRE)
        .to_string()
}

/// Merge AI output with local measurements
pub fn reconcile(
    synthesized: SynthesizedMetadata,
    inputs: &ReconcileInputs<'_>,
    policy: MoodMergePolicy,
    vocab: &Vocabulary,
) -> FinalMetadata {
    let facts = MeasuredFacts::resolve(inputs.core, &synthesized);

    let lyrics = synthesized.lyrics.clone().or_else(|| {
        inputs
            .transcription
            .filter(|t| t.has_text())
            .map(|t| t.text.trim().to_string())
    });

    FinalMetadata {
        title: synthesized.title.clone().unwrap_or_else(|| inputs.existing_title()),
        artist: synthesized.artist.clone().unwrap_or_else(|| inputs.existing_artist()),
        album: synthesized.album.clone().unwrap_or_else(|| inputs.existing_album()),
        year: synthesized
            .year
            .clone()
            .or_else(|| inputs.existing.and_then(|t| t.year.clone())),
        bpm: facts.bpm,
        key: facts.key,
        mode: facts.mode,
        main_genre: main_genre(
            synthesized.main_genre.as_deref(),
            inputs.existing.and_then(|t| t.genre.as_deref()),
            vocab,
        ),
        additional_genres: dedup_list(&synthesized.additional_genres),
        moods: merge_moods(&inputs.core.heuristic_moods, &synthesized.moods, policy),
        instrumentation: dedup_list(&synthesized.instrumentation),
        technical: TechnicalSummary::from_core(inputs.core),
        loudness: inputs
            .loudness
            .is_available()
            .then(|| inputs.loudness.clone()),
        energy_level: synthesized.energy_level.clone(),
        track_description: synthesized
            .track_description
            .clone()
            .unwrap_or_else(|| inputs.template_description()),
        keywords: dedup_list(&synthesized.keywords),
        lyrics,
        note: None,
    }
}

/// Output built from local analysis alone
pub fn build_degraded(inputs: &ReconcileInputs<'_>, note: &str) -> FinalMetadata {
    FinalMetadata {
        title: inputs.existing_title(),
        artist: inputs.existing_artist(),
        album: inputs.existing_album(),
        year: inputs.existing.and_then(|t| t.year.clone()),
        bpm: inputs.core.tempo_bpm,
        key: inputs.core.key,
        mode: inputs.core.mode,
        main_genre: inputs
            .existing
            .and_then(|t| t.genre.clone())
            .unwrap_or_else(|| UNKNOWN_GENRE.to_string()),
        additional_genres: Vec::new(),
        moods: dedup_strings(&inputs.core.heuristic_moods),
        instrumentation: Vec::new(),
        technical: TechnicalSummary::from_core(inputs.core),
        loudness: Some(inputs.loudness.clone()),
        energy_level: None,
        track_description: inputs.template_description(),
        keywords: Vec::new(),
        lyrics: None,
        note: Some(note.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Brightness, DynamicRange, EnergyFeatures, Normalization, RhythmFeatures,
        SpectralFeatures,
    };
    use serde_json::json;

    fn core() -> CoreFeatures {
        CoreFeatures {
            tempo_bpm: 128.0,
            key: PitchClass::G,
            mode: Mode::Major,
            full_key: "G Major".to_string(),
            duration_seconds: 210.0,
            heuristic_moods: vec!["Energetic".to_string(), "Happy".to_string()],
            spectral: SpectralFeatures {
                centroid: 3200.0,
                rolloff: 6000.0,
                bandwidth: 2500.0,
                zero_crossing_rate: 0.09,
                brightness: Brightness::Bright,
            },
            energy: EnergyFeatures {
                mean: 0.2,
                std: 0.04,
                dynamic_range: DynamicRange::Compressed,
            },
            rhythm: RhythmFeatures {
                danceability: 1.3,
                beat_count: 440,
            },
            timbre_coefficients: vec![0.0; 13],
        }
    }

    fn loudness() -> Measured<LoudnessFeatures> {
        Measured::Value(LoudnessFeatures {
            lufs: Some(-8.2),
            true_peak_db: Some(-0.1),
            loudness_range_lu: 3.1,
            normalization: Normalization::from_lufs(Some(-8.2)),
        })
    }

    #[test]
    fn test_measured_facts_override_ai() {
        let core = core();
        let loudness = loudness();
        let synthesized = SynthesizedMetadata::from_value(&json!({
            "bpm": 90, "key": "D", "mode": "Minor", "mainGenre": "house"
        }));
        let inputs = ReconcileInputs {
            core: &core,
            loudness: &loudness,
            existing: None,
            transcription: None,
            source_name: "track.mp3",
        };
        let out = reconcile(synthesized, &inputs, MoodMergePolicy::AiFirst, &Vocabulary::builtin());
        assert_eq!(out.bpm, 128.0);
        assert_eq!(out.key, PitchClass::G);
        assert_eq!(out.mode, Mode::Major);
        assert_eq!(out.main_genre, "House");
        assert_eq!(out.title, "track.mp3");
        assert_eq!(out.artist, UNKNOWN_ARTIST);
        assert_eq!(out.track_description, "Audio track at 128.0 BPM in G Major");
        assert!(out.loudness.is_some());
        assert!(out.note.is_none());
    }

    #[test]
    fn test_mood_policies() {
        let heuristic = vec!["Energetic".to_string(), "Happy".to_string()];
        let ai = vec![json!("Upbeat"), json!("Energetic"), json!(3), json!(" ")];

        assert_eq!(
            merge_moods(&heuristic, &ai, MoodMergePolicy::AiFirst),
            vec!["Upbeat", "Energetic"]
        );
        assert_eq!(
            merge_moods(&heuristic, &ai, MoodMergePolicy::Union),
            vec!["Upbeat", "Energetic", "Happy"]
        );
        assert_eq!(
            merge_moods(&heuristic, &[], MoodMergePolicy::AiFirst),
            vec!["Energetic", "Happy"]
        );
    }

    #[test]
    fn test_dedup_is_idempotent_and_keeps_order() {
        let raw = vec![
            json!(" Rock "),
            json!("Pop"),
            json!("Rock"),
            json!(null),
            json!(""),
            json!(["nested"]),
            json!("rock"),
        ];
        let once = dedup_list(&raw);
        assert_eq!(once, vec!["Rock", "Pop", "rock"]);
        assert_eq!(dedup_strings(&once), once);
    }

    #[test]
    fn test_unknown_genre_falls_back_to_existing_tag() {
        let vocab = Vocabulary::builtin();
        assert_eq!(main_genre(Some("Vaporwave"), Some("jazz"), &vocab), "Jazz");
        assert_eq!(main_genre(Some("Vaporwave"), Some("Polka"), &vocab), UNKNOWN_GENRE);
        assert_eq!(main_genre(None, None, &vocab), UNKNOWN_GENRE);
    }

    #[test]
    fn test_lyrics_fall_back_to_transcription() {
        let core = core();
        let loudness = loudness();
        let transcription = Transcription {
            text: " la la la ".to_string(),
            ..Transcription::default()
        };
        let inputs = ReconcileInputs {
            core: &core,
            loudness: &loudness,
            existing: None,
            transcription: Some(&transcription),
            source_name: "a.wav",
        };
        let out = reconcile(
            SynthesizedMetadata::default(),
            &inputs,
            MoodMergePolicy::AiFirst,
            &Vocabulary::builtin(),
        );
        assert_eq!(out.lyrics.as_deref(), Some("la la la"));
    }

    #[test]
    fn test_failed_loudness_is_omitted_from_full_output() {
        let core = core();
        let loudness: Measured<LoudnessFeatures> = Measured::failed("too short");
        let inputs = ReconcileInputs {
            core: &core,
            loudness: &loudness,
            existing: None,
            transcription: None,
            source_name: "a.wav",
        };
        let out = reconcile(
            SynthesizedMetadata::default(),
            &inputs,
            MoodMergePolicy::AiFirst,
            &Vocabulary::builtin(),
        );
        assert!(out.loudness.is_none());

        let degraded = build_degraded(&inputs, AI_UNAVAILABLE_NOTE);
        assert_eq!(
            serde_json::to_value(&degraded).unwrap()["loudness"],
            json!({"error": "too short"})
        );
    }

    #[test]
    fn test_degraded_shape() {
        let core = core();
        let loudness = loudness();
        let tags = ExistingTags {
            title: Some("Sunrise".to_string()),
            genre: Some("Synthwave".to_string()),
            ..ExistingTags::default()
        };
        let inputs = ReconcileInputs {
            core: &core,
            loudness: &loudness,
            existing: Some(&tags),
            transcription: None,
            source_name: "sunrise.flac",
        };
        let out = build_degraded(&inputs, AI_UNAVAILABLE_NOTE);
        let json = serde_json::to_value(&out).unwrap();

        assert_eq!(json["title"], "Sunrise");
        assert_eq!(json["artist"], UNKNOWN_ARTIST);
        assert_eq!(json["album"], DEFAULT_ALBUM);
        assert_eq!(json["mainGenre"], "Synthwave");
        assert_eq!(json["bpm"], 128.0);
        assert_eq!(json["key"], "G");
        assert_eq!(json["moods"], json!(["Energetic", "Happy"]));
        assert_eq!(json["instrumentation"], json!([]));
        assert_eq!(json["technical"]["centroid"], 3200.0);
        assert_eq!(json["technical"]["rhythm"]["beat_count"], 440);
        assert_eq!(json["_note"], AI_UNAVAILABLE_NOTE);
    }

    #[test]
    fn test_mood_policy_parse() {
        assert_eq!("union".parse::<MoodMergePolicy>(), Ok(MoodMergePolicy::Union));
        assert_eq!("AI_FIRST".parse::<MoodMergePolicy>(), Ok(MoodMergePolicy::AiFirst));
        assert!("random".parse::<MoodMergePolicy>().is_err());
    }
}
