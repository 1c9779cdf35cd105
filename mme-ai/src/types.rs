//! Core Types and Trait Definitions for mme-ai
//!
//! Defines the error taxonomy shared by every analysis stage and the
//! collaborator traits the pipeline depends on:
//! - **TagReader:** container tag extraction
//! - **Transcriber:** speech-to-text engine
//! - **MetadataGenerator:** LLM returning structured JSON
//!
//! # Failure as data
//! Only decode and core-analysis failures abort a run. Every other stage
//! reports failure through [`Measured::Unavailable`], which serializes as
//! `{"error": "<message>"}` in place of the stage's result.

use crate::models::{ExistingTags, Transcription};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Errors raised by pipeline stages
///
/// Each variant names the stage it came from so callers can tell a decode
/// failure from a synthesis failure and decide whether to retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Unreadable or corrupt audio (fatal)
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Tempo/key/spectral analysis failed (fatal)
    #[error("Core analysis failed: {0}")]
    CoreAnalysis(String),

    #[error("Loudness analysis failed: {0}")]
    Loudness(String),

    #[error("Pitch analysis failed: {0}")]
    Pitch(String),

    #[error("Tag read failed: {0}")]
    TagRead(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// LLM returned text that is not a JSON object
    #[error("Synthesis returned malformed output: {0}")]
    SynthesisFormat(String),

    /// LLM service unreachable, rejected the request, or timed out
    #[error("Synthesis service error: {0}")]
    SynthesisService(String),
}

impl PipelineError {
    /// Stage name reported to callers
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode",
            PipelineError::CoreAnalysis(_) => "core_analysis",
            PipelineError::Loudness(_) => "loudness",
            PipelineError::Pitch(_) => "pitch",
            PipelineError::TagRead(_) => "tags",
            PipelineError::Transcription(_) => "transcription",
            PipelineError::SynthesisFormat(_) | PipelineError::SynthesisService(_) => "synthesis",
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "DECODE_ERROR",
            PipelineError::CoreAnalysis(_) => "CORE_ANALYSIS_ERROR",
            PipelineError::Loudness(_) => "LOUDNESS_ERROR",
            PipelineError::Pitch(_) => "PITCH_ERROR",
            PipelineError::TagRead(_) => "TAG_READ_ERROR",
            PipelineError::Transcription(_) => "TRANSCRIPTION_ERROR",
            PipelineError::SynthesisFormat(_) => "SYNTHESIS_FORMAT_ERROR",
            PipelineError::SynthesisService(_) => "SYNTHESIS_SERVICE_ERROR",
        }
    }

    /// True for failures that abort every pipeline variant
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Decode(_) | PipelineError::CoreAnalysis(_))
    }

    /// True for failures of the synthesis step
    pub fn is_synthesis(&self) -> bool {
        matches!(
            self,
            PipelineError::SynthesisFormat(_) | PipelineError::SynthesisService(_)
        )
    }
}

/// Errors crossing the LLM service boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthesisError {
    /// Response text contained no parseable JSON object
    #[error("{0}")]
    Format(String),

    /// Transport, HTTP status, or missing-choice failure
    #[error("{0}")]
    Service(String),
}

impl From<SynthesisError> for PipelineError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Format(msg) => PipelineError::SynthesisFormat(msg),
            SynthesisError::Service(msg) => PipelineError::SynthesisService(msg),
        }
    }
}

// ============================================================================
// Measured<T>
// ============================================================================

/// Result of a best-effort stage
///
/// Serializes as the value itself, or as `{"error": "..."}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measured<T> {
    /// Stage failed; carries the cause
    Unavailable { error: String },
    /// Stage succeeded
    Value(T),
}

impl<T> Measured<T> {
    /// Build an error-carrying placeholder
    pub fn failed(cause: impl fmt::Display) -> Self {
        Measured::Unavailable {
            error: cause.to_string(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::Unavailable { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::Unavailable { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Measured::Value(_) => None,
            Measured::Unavailable { error } => Some(error),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Measured::Value(_))
    }
}

impl<T> From<Result<T, PipelineError>> for Measured<T> {
    fn from(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(v) => Measured::Value(v),
            Err(e) => Measured::failed(e),
        }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Container tag reader
///
/// Implementations must be cheap to share across concurrent runs.
pub trait TagReader: Send + Sync {
    /// Reader name for logging
    fn name(&self) -> &'static str;

    /// Read embedded tags and stream properties
    ///
    /// # Errors
    /// Returns `PipelineError::TagRead` if the container cannot be parsed
    fn read(&self, path: &Path) -> Result<ExistingTags, PipelineError>;
}

/// Speech-to-text engine
///
/// Never fails across the boundary: errors are carried inside the
/// returned [`Transcription`].
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcriber name for logging
    fn name(&self) -> &'static str;

    /// Capability check, evaluated once when the implementation is built
    fn is_available(&self) -> bool;

    /// Transcribe the audio file at `path`
    ///
    /// # Arguments
    /// * `path` - Audio file on local disk
    /// * `model_size` - Engine model size (tiny, base, small, medium, large)
    async fn transcribe(&self, path: &Path, model_size: &str) -> Transcription;
}

/// LLM metadata generator
///
/// Implementors supply [`generate_raw`](MetadataGenerator::generate_raw);
/// [`generate_json`](MetadataGenerator::generate_json) parses the reply and
/// makes one extraction attempt when the reply wraps JSON in prose.
#[async_trait::async_trait]
pub trait MetadataGenerator: Send + Sync {
    /// Generator name for logging
    fn name(&self) -> &'static str;

    /// Capability check, evaluated once when the implementation is built
    fn is_available(&self) -> bool;

    /// Send the prompt and return the model's raw reply text
    ///
    /// # Errors
    /// Returns `SynthesisError::Service` on transport or HTTP failures
    async fn generate_raw(&self, prompt: &str, schema_hint: &str) -> Result<String, SynthesisError>;

    /// Send the prompt and return the parsed JSON object
    ///
    /// # Errors
    /// * `SynthesisError::Service` from [`generate_raw`](MetadataGenerator::generate_raw)
    /// * `SynthesisError::Format` if no JSON object can be recovered from the reply
    async fn generate_json(
        &self,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<serde_json::Value, SynthesisError> {
        let raw = self.generate_raw(prompt, schema_hint).await?;
        crate::services::llm_client::parse_json_response(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measured_serializes_error_object() {
        let failed: Measured<u32> = Measured::failed("no audio");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"error": "no audio"})
        );

        let ok: Measured<u32> = Measured::Value(7);
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!(7));
    }

    #[test]
    fn test_only_decode_and_core_are_fatal() {
        assert!(PipelineError::Decode("x".into()).is_fatal());
        assert!(PipelineError::CoreAnalysis("x".into()).is_fatal());
        assert!(!PipelineError::Loudness("x".into()).is_fatal());
        assert!(!PipelineError::Pitch("x".into()).is_fatal());
        assert!(!PipelineError::TagRead("x".into()).is_fatal());
        assert!(!PipelineError::Transcription("x".into()).is_fatal());
        assert!(!PipelineError::SynthesisFormat("x".into()).is_fatal());
    }

    #[test]
    fn test_synthesis_error_maps_to_stage() {
        let format: PipelineError = SynthesisError::Format("bad".into()).into();
        let service: PipelineError = SynthesisError::Service("down".into()).into();
        assert_eq!(format.stage(), "synthesis");
        assert_eq!(format.code(), "SYNTHESIS_FORMAT_ERROR");
        assert_eq!(service.code(), "SYNTHESIS_SERVICE_ERROR");
        assert!(service.is_synthesis());
    }
}
