//! Whisper CLI transcriber
//!
//! Runs the `whisper` command-line tool as a subprocess and reads its JSON
//! output. This is an **optional** collaborator: when the binary is not
//! installed the pipeline simply skips transcription.
//!
//! # Requirements
//! - `whisper` (openai-whisper) on `PATH`, or a configured binary path
//! - Writable temporary directory for the JSON output

use crate::models::{TranscriptSegment, Transcription};
use crate::types::Transcriber;
use async_trait::async_trait;
use mme_common::config::TranscriptionConfig;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Availability probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Whisper `--output_format json` document
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: String,
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

impl From<WhisperOutput> for Transcription {
    fn from(out: WhisperOutput) -> Self {
        Transcription {
            text: out.text.trim().to_string(),
            language: Some(out.language.unwrap_or_else(|| "unknown".to_string())),
            segments: out
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
            error: None,
        }
    }
}

/// [`Transcriber`] backed by the whisper CLI
#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    binary: String,
    timeout: Duration,
    available: bool,
}

impl WhisperCliTranscriber {
    /// Probe the configured binary once and build the transcriber
    pub async fn probe(config: &TranscriptionConfig) -> Self {
        let available = Self::check_binary(&config.binary).await;
        info!(
            binary = %config.binary,
            available,
            "Whisper availability check"
        );
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            available,
        }
    }

    async fn check_binary(binary: &str) -> bool {
        let status = Command::new(binary)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, status).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    async fn run(&self, path: &Path, model_size: &str) -> Result<Transcription, String> {
        let out_dir = tempfile::Builder::new()
            .prefix("mme-whisper-")
            .tempdir()
            .map_err(|e| format!("Failed to create output directory: {}", e))?;

        let mut command = Command::new(&self.binary);
        command
            .arg(path)
            .args(["--model", model_size, "--output_format", "json", "--output_dir"])
            .arg(out_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(path = %path.display(), model_size, "Running whisper");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| format!("Transcription timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("Failed to execute whisper: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(format!("whisper exited with {}: {}", output.status, last_line));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let json_path = out_dir.path().join(format!("{}.json", stem));
        let contents = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", json_path.display(), e))?;

        let parsed: WhisperOutput = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse whisper output: {}", e))?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    fn name(&self) -> &'static str {
        "whisper-cli"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn transcribe(&self, path: &Path, model_size: &str) -> Transcription {
        if !self.available {
            return Transcription::failed(format!("Transcriber binary '{}' not available", self.binary));
        }
        match self.run(path, model_size).await {
            Ok(t) => {
                info!(
                    language = ?t.language,
                    segments = t.segments.len(),
                    "Transcription complete"
                );
                t
            }
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                Transcription::failed(e)
            }
        }
    }
}

/// Placeholder used when transcription is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn transcribe(&self, _path: &Path, _model_size: &str) -> Transcription {
        Transcription::failed("Transcription is disabled")
    }
}
