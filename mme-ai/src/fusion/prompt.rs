//! Prompt construction for metadata synthesis

use super::vocabulary::Vocabulary;
use crate::models::{CoreFeatures, ExistingTags, LoudnessFeatures};
use crate::utils::{sanitize_ascii, truncate_chars};
use std::fmt::Write;

/// Transcribed text beyond this many characters is dropped
pub const MAX_TRANSCRIPT_CHARS: usize = 2000;

/// Everything the prompt is built from
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub core: &'a CoreFeatures,
    pub loudness: Option<&'a LoudnessFeatures>,
    pub transcript: Option<&'a str>,
    pub existing: Option<&'a ExistingTags>,
}

fn or_unknown(value: Option<&str>) -> String {
    sanitize_ascii(value.unwrap_or("Unknown"))
}

/// Build the ASCII-only user prompt
pub fn build_prompt(inputs: &PromptInputs<'_>, vocab: &Vocabulary) -> String {
    let core = inputs.core;
    let lufs = inputs
        .loudness
        .and_then(|l| l.lufs)
        .map(|l| l.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let mut prompt = String::from(
        "You are the Music Metadata Engine. Analyze the provided data and generate professional music metadata.\n\n",
    );

    // Writing to a String cannot fail
    let _ = writeln!(prompt, "AUDIO ANALYSIS DATA (from local analysis):");
    let _ = writeln!(prompt, "- BPM: {}", core.tempo_bpm);
    let _ = writeln!(prompt, "- Key: {}", core.full_key);
    let _ = writeln!(prompt, "- Duration: {} seconds", core.duration_seconds);
    let _ = writeln!(prompt, "- Spectral Brightness: {}", core.spectral.brightness);
    let _ = writeln!(prompt, "- Danceability: {}", core.rhythm.danceability);
    let _ = writeln!(prompt, "- Dynamic Range: {}", core.energy.dynamic_range);
    let _ = writeln!(prompt, "- LUFS: {}", lufs);

    if let Some(text) = inputs.transcript.map(str::trim).filter(|t| !t.is_empty()) {
        let _ = writeln!(prompt, "\nLYRICS/VOCALS (transcribed):");
        let _ = writeln!(prompt, "{}", truncate_chars(text, MAX_TRANSCRIPT_CHARS));
    }

    if let Some(tags) = inputs.existing {
        let _ = writeln!(prompt, "\nEXISTING FILE METADATA:");
        let _ = writeln!(prompt, "- Title: {}", or_unknown(tags.title.as_deref()));
        let _ = writeln!(prompt, "- Artist: {}", or_unknown(tags.artist.as_deref()));
        let _ = writeln!(prompt, "- Album: {}", or_unknown(tags.album.as_deref()));
        let _ = writeln!(prompt, "- Genre: {}", or_unknown(tags.genre.as_deref()));
    }

    let _ = writeln!(prompt, "\nVOCABULARY RULES:");
    let _ = writeln!(prompt, "- Main Genre: Pick ONE from: {}", vocab.genres().join(", "));
    let _ = writeln!(prompt, "- Moods: Pick 3-5 from: {}", vocab.moods().join(", "));
    let _ = writeln!(
        prompt,
        "- Instruments: List detected from: {}",
        vocab.instruments().join(", ")
    );

    sanitize_ascii(&prompt)
}

/// JSON template the reply must follow, seeded with measured facts
pub fn schema_hint(core: &CoreFeatures) -> String {
    let template = serde_json::json!({
        "title": "Suggested title based on mood/content",
        "artist": "Keep existing or suggest 'Unknown Artist'",
        "album": "Keep existing or suggest 'Single'",
        "year": "Release year if known",
        "mainGenre": "ONE genre from list",
        "additionalGenres": ["genre1", "genre2"],
        "moods": ["mood1", "mood2", "mood3"],
        "instrumentation": ["instrument1", "instrument2"],
        "bpm": core.tempo_bpm,
        "key": core.key,
        "mode": core.mode,
        "energyLevel": "Low/Medium/High",
        "trackDescription": "2-3 sentence professional description",
        "keywords": ["tag1", "tag2", "tag3"],
        "lyrics": "Transcribed or empty string"
    });
    serde_json::to_string_pretty(&template).unwrap_or_else(|_| template.to_string())
}
