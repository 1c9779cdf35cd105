//! End-to-end pipeline tests with recording collaborators

mod helpers;

use helpers::{generate_test_wav, AudioConfig, MockGenerator, MockTranscriber};
use mme_ai::extractors::LoftyTagReader;
use mme_ai::fusion::{dedup_strings, MoodMergePolicy, AI_UNAVAILABLE_NOTE};
use mme_ai::services::DisabledTranscriber;
use mme_ai::types::{PipelineError, SynthesisError, Transcriber};
use mme_ai::workflow::{
    PipelineOptions, PipelineOrchestrator, PipelineSettings, PipelineStage, PipelineVariant,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn fixture(dir: &TempDir, name: &str, config: &AudioConfig) -> PathBuf {
    generate_test_wav(&dir.path().join(name), config).unwrap()
}

fn orchestrator(
    generator: Arc<MockGenerator>,
    transcriber: Arc<dyn Transcriber>,
    settings: PipelineSettings,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        Arc::new(LoftyTagReader::new()),
        transcriber,
        generator,
        settings,
    )
}

const AI_REPLY: &str = r#"Here is the metadata you asked for:
{
  "title": "Clockwork",
  "artist": "The Metronomes",
  "bpm": 61,
  "key": "D#",
  "mode": "Minor",
  "mainGenre": "electronic",
  "additionalGenres": ["Techno", "Techno", ""],
  "moods": ["Energetic", " Upbeat ", "Energetic", 7],
  "instrumentation": ["Drums", "Percussion", "Drums"],
  "energyLevel": "High",
  "trackDescription": "A relentless pulse.",
  "keywords": ["clicks", "minimal", "clicks"]
}
Let me know if you need anything else."#;

#[tokio::test]
async fn test_degraded_run_never_calls_generator() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(440.0, 4.0));
    let generator = Arc::new(MockGenerator::unavailable());
    let pipeline = orchestrator(
        generator.clone(),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );
    assert_eq!(pipeline.variant(), PipelineVariant::Degraded);

    let outcome = pipeline
        .run(&path, "tone.wav", &PipelineOptions::default())
        .await
        .unwrap();

    assert_eq!(generator.calls(), 0);
    let json = serde_json::to_value(&outcome.metadata).unwrap();
    assert_eq!(json["_note"], AI_UNAVAILABLE_NOTE);
    assert_eq!(json["title"], "tone.wav");
    assert_eq!(json["artist"], "Unknown Artist");
    assert_eq!(json["album"], "Single");
    assert_eq!(json["mainGenre"], "Unknown");
    assert!(json["bpm"].as_f64().unwrap() > 0.0);
    assert!(json["technical"].get("rhythm").is_some());
    assert!(json["trackDescription"]
        .as_str()
        .unwrap()
        .starts_with("Audio track at "));
    assert!(!outcome.report.reached(PipelineStage::Synthesized));
}

#[tokio::test]
async fn test_full_run_keeps_local_facts_and_dedups_lists() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "clicks.wav", &AudioConfig::click_track(120.0, 6.0));
    let generator = Arc::new(MockGenerator::replying(AI_REPLY));
    let pipeline = orchestrator(
        generator.clone(),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );

    let local = pipeline.analyze_local(&path).await.unwrap();
    let outcome = pipeline
        .run(&path, "clicks.wav", &PipelineOptions::default())
        .await
        .unwrap();
    let meta = &outcome.metadata;

    assert_eq!(generator.calls(), 1);
    assert_eq!(meta.bpm, local.core.tempo_bpm);
    assert_eq!(meta.key, local.core.key);
    assert_eq!(meta.mode, local.core.mode);

    assert_eq!(meta.title, "Clockwork");
    assert_eq!(meta.main_genre, "Electronic");
    assert_eq!(meta.additional_genres, vec!["Techno"]);
    assert_eq!(meta.moods, vec!["Energetic", "Upbeat"]);
    assert_eq!(meta.instrumentation, vec!["Drums", "Percussion"]);
    assert_eq!(meta.keywords, vec!["clicks", "minimal"]);
    assert!(meta.note.is_none());

    for list in [&meta.moods, &meta.instrumentation, &meta.keywords, &meta.additional_genres] {
        assert_eq!(&dedup_strings(list), list);
    }

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.is_ascii());
    assert!(prompt.contains(&format!("- BPM: {}", local.core.tempo_bpm)));
    assert!(outcome.report.reached(PipelineStage::Reconciled));
}

#[tokio::test]
async fn test_union_policy_keeps_heuristic_moods() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(440.0, 4.0));
    let generator = Arc::new(MockGenerator::replying(r#"{"moods": ["Serene"]}"#));
    let pipeline = orchestrator(
        generator,
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );
    let local = pipeline.analyze_local(&path).await.unwrap();

    let options = PipelineOptions {
        mood_policy: MoodMergePolicy::Union,
        ..PipelineOptions::default()
    };
    let meta = pipeline.run(&path, "tone.wav", &options).await.unwrap().metadata;

    assert_eq!(meta.moods[0], "Serene");
    for mood in &local.core.heuristic_moods {
        assert!(meta.moods.contains(mood));
    }
}

#[tokio::test]
async fn test_synthesis_failure_is_distinct_from_decode_failure() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(440.0, 3.0));
    let generator = Arc::new(MockGenerator::failing(SynthesisError::Service(
        "HTTP 503".to_string(),
    )));
    let settings = PipelineSettings {
        synthesis_attempts: 3,
        ..PipelineSettings::default()
    };
    let pipeline = orchestrator(generator.clone(), Arc::new(DisabledTranscriber), settings);

    let err = pipeline
        .run(&path, "tone.wav", &PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SynthesisService(_)));
    assert_eq!(err.stage(), "synthesis");
    assert!(!err.is_fatal());
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_synthesis_failure_degrades_when_enabled() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(440.0, 3.0));
    let generator = Arc::new(MockGenerator::replying("no json here"));
    let settings = PipelineSettings {
        degrade_on_synthesis_failure: true,
        ..PipelineSettings::default()
    };
    let pipeline = orchestrator(generator.clone(), Arc::new(DisabledTranscriber), settings);

    let outcome = pipeline
        .run(&path, "tone.wav", &PipelineOptions::default())
        .await
        .unwrap();

    assert_eq!(generator.calls(), 1);
    let note = outcome.metadata.note.unwrap();
    assert!(note.contains("failed"));
    assert!(outcome.report.degraded_reason.is_some());
    assert_eq!(outcome.report.failed_stages(), vec![PipelineStage::Synthesized]);
}

#[tokio::test]
async fn test_transcription_needs_transcribe_and_pro_mode() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(440.0, 3.0));
    let transcriber = Arc::new(MockTranscriber::new("hello hello"));
    let generator = Arc::new(MockGenerator::replying(r#"{"title": "Hello"}"#));
    let pipeline = orchestrator(
        generator.clone(),
        transcriber.clone(),
        PipelineSettings::default(),
    );

    let transcribe_only = PipelineOptions {
        transcribe: true,
        ..PipelineOptions::default()
    };
    let meta = pipeline.run(&path, "tone.wav", &transcribe_only).await.unwrap().metadata;
    assert_eq!(transcriber.calls(), 0);
    assert!(meta.lyrics.is_none());

    let pro = PipelineOptions {
        transcribe: true,
        pro_mode: true,
        ..PipelineOptions::default()
    };
    let meta = pipeline.run(&path, "tone.wav", &pro).await.unwrap().metadata;
    assert_eq!(transcriber.calls(), 1);
    assert_eq!(meta.lyrics.as_deref(), Some("hello hello"));
    assert!(generator.last_prompt().unwrap().contains("hello hello"));
}

#[tokio::test]
async fn test_undecodable_input_aborts_before_synthesis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.mp3");
    std::fs::write(&path, b"definitely not audio").unwrap();
    let generator = Arc::new(MockGenerator::replying("{}"));
    let pipeline = orchestrator(
        generator.clone(),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );

    let err = pipeline
        .run(&path, "broken.mp3", &PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)));
    assert!(err.is_fatal());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_local_analysis_reports_every_section() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "tone.wav", &AudioConfig::sine(220.0, 4.0));
    let pipeline = orchestrator(
        Arc::new(MockGenerator::unavailable()),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );

    let local = pipeline.analyze_local(&path).await.unwrap();
    assert!(local.core.tempo_bpm > 0.0);
    assert!(local.loudness.is_available());
    assert!(local.existing_metadata.is_available());

    let pitch = local.pitch.value().unwrap();
    assert_eq!(pitch.average_note.as_deref(), Some("A3"));

    let json = serde_json::to_value(&local).unwrap();
    for key in ["core", "loudness", "pitch", "existing_metadata"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}

#[tokio::test]
async fn test_silent_input_reports_null_loudness() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "silence.wav", &AudioConfig::silence(3.0));
    let pipeline = orchestrator(
        Arc::new(MockGenerator::unavailable()),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    );

    let local = pipeline.analyze_local(&path).await.unwrap();
    let loudness = local.loudness.value().unwrap();
    assert!(loudness.lufs.is_none());
    assert_eq!(local.pitch.value().unwrap().vocal_presence, 0.0);
    assert!(local.core.tempo_bpm > 0.0);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let dir = TempDir::new().unwrap();
    let low = fixture(&dir, "low.wav", &AudioConfig::sine(220.0, 3.0));
    let high = fixture(&dir, "high.wav", &AudioConfig::sine(880.0, 3.0));
    let pipeline = Arc::new(orchestrator(
        Arc::new(MockGenerator::unavailable()),
        Arc::new(DisabledTranscriber),
        PipelineSettings::default(),
    ));

    let mut handles = Vec::new();
    for (path, name) in [(low.clone(), "low.wav"), (high.clone(), "high.wav")]
        .into_iter()
        .cycle()
        .take(4)
    {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .run(&path, name, &PipelineOptions::default())
                .await
                .map(|o| (name, o.metadata))
        }));
    }

    for handle in handles {
        let (name, meta) = handle.await.unwrap().unwrap();
        assert_eq!(meta.title, name);
        let expected_bright = name == "high.wav";
        assert_eq!(
            meta.technical.spectral.centroid > 600.0,
            expected_bright,
            "centroid {} for {}",
            meta.technical.spectral.centroid,
            name
        );
    }
}
