//! Pipeline Orchestrator
//!
//! Drives one analysis run from an audio file to [`FinalMetadata`].
//!
//! # Stages
//! `Loaded → CoreAnalyzed → {LoudnessAnalyzed, PitchAnalyzed, TagsRead}
//!  → [Transcribed | TranscriptionSkipped] → Synthesized → Reconciled → Done`
//!
//! # Error Handling
//! - Decode and core analysis failures abort the run
//! - Loudness, pitch, tags and transcription degrade to error placeholders
//! - Synthesis failure aborts the full variant unless degradation is enabled
//!
//! # Variants
//! The variant is fixed when the orchestrator is built: [`PipelineVariant::Full`]
//! when the metadata generator is available, [`PipelineVariant::Degraded`]
//! otherwise. A degraded orchestrator never calls the generator.
//!
//! # Example
//! ```rust,ignore
//! let orchestrator = PipelineOrchestrator::from_config(&config, api_key).await;
//! let outcome = orchestrator.run(path, "song.mp3", &PipelineOptions::default()).await?;
//! ```

use crate::extractors::{
    CoreFeatureExtractor, LoftyTagReader, LoudnessAnalyzer, PitchAnalyzer, SignalLoader,
};
use crate::fusion::{
    build_degraded, init_vocabulary, reconcile, vocabulary, MetadataSynthesizer, MoodMergePolicy,
    PromptInputs, ReconcileInputs, Vocabulary, AI_UNAVAILABLE_NOTE,
};
use crate::models::{
    CoreFeatures, ExistingTags, FinalMetadata, LocalAnalysis, LoudnessFeatures, PitchFeatures,
    SampleBuffer, Transcription,
};
use crate::services::{
    DisabledTranscriber, GroqChatGenerator, UnavailableGenerator, WhisperCliTranscriber,
};
use crate::types::{Measured, MetadataGenerator, PipelineError, SynthesisError, TagReader, Transcriber};
use mme_common::config::{AnalysisConfig, TomlConfig, TranscriptionConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-request switches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    /// Caller asked for lyrics transcription
    pub transcribe: bool,
    /// Transcription only runs when this is also set
    pub pro_mode: bool,
    pub mood_policy: MoodMergePolicy,
    /// Transcription model size; configured default when `None`
    pub model_size: Option<String>,
}

impl PipelineOptions {
    pub fn wants_transcription(&self) -> bool {
        self.transcribe && self.pro_mode
    }
}

/// Orchestrator tuning, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub pitch_window_secs: f64,
    /// Synthesis attempts per run, at least 1
    pub synthesis_attempts: u32,
    pub degrade_on_synthesis_failure: bool,
    /// Bound on each blocking analysis stage
    pub stage_timeout: Duration,
    pub default_model_size: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default(), &TranscriptionConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(analysis: &AnalysisConfig, transcription: &TranscriptionConfig) -> Self {
        Self {
            pitch_window_secs: analysis.pitch_window_secs,
            synthesis_attempts: analysis.synthesis_attempts.max(1),
            degrade_on_synthesis_failure: analysis.degrade_on_synthesis_failure,
            stage_timeout: Duration::from_secs(analysis.stage_timeout_secs.max(1)),
            default_model_size: transcription.model_size.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// Local analysis plus LLM synthesis
    Full,
    /// Local analysis only
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Loaded,
    CoreAnalyzed,
    LoudnessAnalyzed,
    PitchAnalyzed,
    TagsRead,
    Transcribed,
    TranscriptionSkipped,
    Synthesized,
    Reconciled,
    Done,
}

/// One stage transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub ok: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stage history of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub variant: PipelineVariant,
    pub stages: Vec<StageRecord>,
    pub synthesis_attempts: u32,
    /// Set when the output was built without synthesis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl PipelineReport {
    fn new(variant: PipelineVariant) -> Self {
        Self {
            variant,
            stages: Vec::new(),
            synthesis_attempts: 0,
            degraded_reason: None,
        }
    }

    fn record(&mut self, stage: PipelineStage, started: Instant, error: Option<String>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &error {
            Some(e) => debug!(stage = ?stage, elapsed_ms, error = %e, "Stage failed"),
            None => debug!(stage = ?stage, elapsed_ms, "Stage complete"),
        }
        self.stages.push(StageRecord {
            stage,
            ok: error.is_none(),
            elapsed_ms,
            error,
        });
    }

    /// True if `stage` was reached
    pub fn reached(&self, stage: PipelineStage) -> bool {
        self.stages.iter().any(|r| r.stage == stage)
    }

    /// Stages that completed with an error placeholder
    pub fn failed_stages(&self) -> Vec<PipelineStage> {
        self.stages.iter().filter(|r| !r.ok).map(|r| r.stage).collect()
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub metadata: FinalMetadata,
    pub report: PipelineReport,
}

/// Local measurements of one run
struct Measurements {
    core: CoreFeatures,
    loudness: Measured<LoudnessFeatures>,
    pitch: Measured<PitchFeatures>,
    tags: Measured<ExistingTags>,
    transcription: Option<Transcription>,
}

/// Coordinates the analysis stages and collaborators
#[derive(Clone)]
pub struct PipelineOrchestrator {
    loader: SignalLoader,
    core: CoreFeatureExtractor,
    loudness: LoudnessAnalyzer,
    pitch: PitchAnalyzer,
    tags: Arc<dyn TagReader>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: MetadataSynthesizer,
    vocabulary: &'static Vocabulary,
    settings: PipelineSettings,
    variant: PipelineVariant,
}

impl PipelineOrchestrator {
    /// Build from explicit collaborators
    ///
    /// The variant is decided here from `generator.is_available()`.
    pub fn new(
        tags: Arc<dyn TagReader>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn MetadataGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        let variant = if generator.is_available() {
            PipelineVariant::Full
        } else {
            PipelineVariant::Degraded
        };

        info!(
            variant = ?variant,
            generator = generator.name(),
            tag_reader = tags.name(),
            transcriber = transcriber.name(),
            transcription_available = transcriber.is_available(),
            "Pipeline orchestrator ready"
        );

        Self {
            loader: SignalLoader::new(),
            core: CoreFeatureExtractor::new(),
            loudness: LoudnessAnalyzer::new(),
            pitch: PitchAnalyzer::new(settings.pitch_window_secs),
            tags,
            transcriber,
            synthesizer: MetadataSynthesizer::new(generator),
            vocabulary: vocabulary(),
            settings,
            variant,
        }
    }

    /// Select collaborators from configuration and probe their availability
    pub async fn from_config(config: &TomlConfig, api_key: Option<String>) -> Self {
        init_vocabulary(config.analysis.vocabulary_file.as_deref());

        let generator: Arc<dyn MetadataGenerator> = match api_key {
            Some(key) => match GroqChatGenerator::new(&config.ai, key) {
                Ok(generator) => Arc::new(generator),
                Err(e) => {
                    warn!(error = %e, "LLM client construction failed, running degraded");
                    Arc::new(UnavailableGenerator)
                }
            },
            None => {
                info!("No AI API key configured, running degraded");
                Arc::new(UnavailableGenerator)
            }
        };

        let transcriber: Arc<dyn Transcriber> = if config.transcription.enabled {
            let whisper = WhisperCliTranscriber::probe(&config.transcription).await;
            if whisper.is_available() {
                Arc::new(whisper)
            } else {
                warn!(binary = %config.transcription.binary, "Transcription binary unavailable");
                Arc::new(DisabledTranscriber)
            }
        } else {
            Arc::new(DisabledTranscriber)
        };

        Self::new(
            Arc::new(LoftyTagReader::new()),
            transcriber,
            generator,
            PipelineSettings::from_config(&config.analysis, &config.transcription),
        )
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    pub fn ai_available(&self) -> bool {
        self.variant == PipelineVariant::Full
    }

    pub fn transcription_available(&self) -> bool {
        self.transcriber.is_available()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Standalone transcription
    ///
    /// # Errors
    /// `PipelineError::Transcription` if no transcriber is available or it failed
    pub async fn transcribe(
        &self,
        path: &Path,
        model_size: Option<&str>,
    ) -> Result<Transcription, PipelineError> {
        if !self.transcriber.is_available() {
            return Err(PipelineError::Transcription(
                "Transcription service not available".to_string(),
            ));
        }
        let model = model_size.unwrap_or(&self.settings.default_model_size);
        let transcription = self.transcriber.transcribe(path, model).await;
        match transcription.error {
            Some(e) => Err(PipelineError::Transcription(e)),
            None => Ok(transcription),
        }
    }

    /// Local analysis without transcription or synthesis
    ///
    /// # Errors
    /// Decode and core analysis failures only
    pub async fn analyze_local(&self, path: &Path) -> Result<LocalAnalysis, PipelineError> {
        let mut report = PipelineReport::new(PipelineVariant::Degraded);
        let measured = self.measure(path, None, &mut report).await?;

        info!(
            path = %path.display(),
            failed = ?report.failed_stages(),
            "Local analysis complete"
        );

        Ok(LocalAnalysis {
            core: measured.core,
            loudness: measured.loudness,
            pitch: measured.pitch,
            existing_metadata: measured.tags,
        })
    }

    /// Full or degraded run producing reconciled metadata
    ///
    /// # Arguments
    /// * `path` - Audio file on local disk
    /// * `source_name` - Client filename, last-resort title
    /// * `options` - Per-request switches
    ///
    /// # Errors
    /// * `Decode` / `CoreAnalysis` - in every variant
    /// * `SynthesisFormat` / `SynthesisService` - full variant, degradation disabled
    pub async fn run(
        &self,
        path: &Path,
        source_name: &str,
        options: &PipelineOptions,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_started = Instant::now();
        let mut report = PipelineReport::new(self.variant);

        let model_size = match self.variant {
            PipelineVariant::Full
                if options.wants_transcription() && self.transcriber.is_available() =>
            {
                Some(
                    options
                        .model_size
                        .clone()
                        .unwrap_or_else(|| self.settings.default_model_size.clone()),
                )
            }
            _ => None,
        };

        let measured = self.measure(path, model_size.as_deref(), &mut report).await?;
        let inputs = ReconcileInputs {
            core: &measured.core,
            loudness: &measured.loudness,
            existing: measured.tags.value(),
            transcription: measured.transcription.as_ref(),
            source_name,
        };

        let metadata = match self.variant {
            PipelineVariant::Degraded => {
                report.degraded_reason = Some("AI generator unavailable".to_string());
                build_degraded(&inputs, AI_UNAVAILABLE_NOTE)
            }
            PipelineVariant::Full => {
                let prompt_inputs = PromptInputs {
                    core: &measured.core,
                    loudness: measured.loudness.value(),
                    transcript: measured
                        .transcription
                        .as_ref()
                        .filter(|t| t.has_text())
                        .map(|t| t.text.as_str()),
                    existing: measured.tags.value(),
                };

                match self.synthesize(&prompt_inputs, &mut report).await {
                    Ok(synthesized) => {
                        let started = Instant::now();
                        let metadata =
                            reconcile(synthesized, &inputs, options.mood_policy, self.vocabulary);
                        report.record(PipelineStage::Reconciled, started, None);
                        metadata
                    }
                    Err(e) if self.settings.degrade_on_synthesis_failure => {
                        warn!(error = %e, "Synthesis failed, returning degraded metadata");
                        report.degraded_reason = Some(e.to_string());
                        build_degraded(&inputs, &synthesis_failed_note(&e))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        report.record(PipelineStage::Done, run_started, None);
        info!(
            path = %path.display(),
            variant = ?report.variant,
            degraded = report.degraded_reason.is_some(),
            failed = ?report.failed_stages(),
            synthesis_attempts = report.synthesis_attempts,
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(PipelineOutcome { metadata, report })
    }

    async fn synthesize(
        &self,
        inputs: &PromptInputs<'_>,
        report: &mut PipelineReport,
    ) -> Result<crate::models::SynthesizedMetadata, SynthesisError> {
        let mut last_error = SynthesisError::Service("Synthesis not attempted".to_string());

        for attempt in 1..=self.settings.synthesis_attempts {
            let started = Instant::now();
            report.synthesis_attempts = attempt;

            match self.synthesizer.synthesize(inputs, self.vocabulary).await {
                Ok(synthesized) => {
                    report.record(PipelineStage::Synthesized, started, None);
                    return Ok(synthesized);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.settings.synthesis_attempts,
                        generator = self.synthesizer.generator_name(),
                        error = %e,
                        "Synthesis attempt failed"
                    );
                    report.record(PipelineStage::Synthesized, started, Some(e.to_string()));
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Decode once, then run the independent analyses concurrently
    async fn measure(
        &self,
        path: &Path,
        transcription_model: Option<&str>,
        report: &mut PipelineReport,
    ) -> Result<Measurements, PipelineError> {
        let timeout = self.settings.stage_timeout;

        let started = Instant::now();
        let loader = self.loader.clone();
        let owned_path = path.to_path_buf();
        let buffer = run_blocking(timeout, PipelineError::Decode, move || {
            loader.load_path(&owned_path)
        })
        .await
        .map(Arc::new)?;
        report.record(PipelineStage::Loaded, started, None);
        debug!(
            path = %path.display(),
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            duration_seconds = buffer.duration_seconds(),
            "Audio decoded"
        );

        let core_fut = timed(self.spawn_core(buffer.clone(), timeout));
        let loudness_fut = timed(self.spawn_loudness(buffer.clone(), timeout));
        let pitch_fut = timed(self.spawn_pitch(buffer.clone(), timeout));
        let tags_fut = timed(self.spawn_tags(path.to_path_buf(), timeout));
        let transcription_fut = timed(async {
            match transcription_model {
                Some(model) => Some(self.transcriber.transcribe(path, model).await),
                None => None,
            }
        });

        let (core, loudness, pitch, tags, transcription) =
            tokio::join!(core_fut, loudness_fut, pitch_fut, tags_fut, transcription_fut);

        let (core, core_started) = core;
        let core = core.map_err(|e| {
            report.record(PipelineStage::CoreAnalyzed, core_started, Some(e.to_string()));
            e
        })?;
        report.record(PipelineStage::CoreAnalyzed, core_started, None);

        let loudness = record_measured(report, PipelineStage::LoudnessAnalyzed, loudness);
        let pitch = record_measured(report, PipelineStage::PitchAnalyzed, pitch);
        let tags = record_measured(report, PipelineStage::TagsRead, tags);

        let (transcription, transcription_started) = transcription;
        match &transcription {
            Some(t) => {
                if let Some(e) = &t.error {
                    warn!(error = %e, "Transcription failed, continuing without lyrics");
                }
                report.record(PipelineStage::Transcribed, transcription_started, t.error.clone());
            }
            None => report.record(PipelineStage::TranscriptionSkipped, transcription_started, None),
        }

        Ok(Measurements {
            core,
            loudness,
            pitch,
            tags,
            transcription,
        })
    }

    async fn spawn_core(
        &self,
        buffer: Arc<SampleBuffer>,
        timeout: Duration,
    ) -> Result<CoreFeatures, PipelineError> {
        let extractor = self.core.clone();
        run_blocking(timeout, PipelineError::CoreAnalysis, move || extractor.analyze(&buffer)).await
    }

    async fn spawn_loudness(
        &self,
        buffer: Arc<SampleBuffer>,
        timeout: Duration,
    ) -> Result<LoudnessFeatures, PipelineError> {
        let analyzer = self.loudness.clone();
        run_blocking(timeout, PipelineError::Loudness, move || analyzer.analyze(&buffer)).await
    }

    async fn spawn_pitch(
        &self,
        buffer: Arc<SampleBuffer>,
        timeout: Duration,
    ) -> Result<PitchFeatures, PipelineError> {
        let analyzer = self.pitch.clone();
        run_blocking(timeout, PipelineError::Pitch, move || analyzer.analyze(&buffer)).await
    }

    async fn spawn_tags(
        &self,
        path: PathBuf,
        timeout: Duration,
    ) -> Result<ExistingTags, PipelineError> {
        let reader = self.tags.clone();
        run_blocking(timeout, PipelineError::TagRead, move || reader.read(&path)).await
    }
}

fn synthesis_failed_note(err: &SynthesisError) -> String {
    format!("AI metadata generation failed: {}. Showing local analysis only.", err)
}

async fn timed<F: std::future::Future>(fut: F) -> (F::Output, Instant) {
    let started = Instant::now();
    (fut.await, started)
}

fn record_measured<T>(
    report: &mut PipelineReport,
    stage: PipelineStage,
    (result, started): (Result<T, PipelineError>, Instant),
) -> Measured<T> {
    if let Err(e) = &result {
        warn!(stage = ?stage, error = %e, "Analysis stage degraded");
    }
    report.record(stage, started, result.as_ref().err().map(|e| e.to_string()));
    Measured::from(result)
}

/// Run CPU-bound work on the blocking pool with a deadline
///
/// Timeouts and panics are reported through `stage_error` so they land in
/// the same taxonomy slot as the stage's own failures.
async fn run_blocking<T, F>(
    timeout: Duration,
    stage_error: fn(String) -> PipelineError,
    work: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(stage_error(format!("Analysis task failed: {}", join_error))),
        Err(_) => Err(stage_error(format!(
            "Timed out after {} seconds",
            timeout.as_secs()
        ))),
    }
}
