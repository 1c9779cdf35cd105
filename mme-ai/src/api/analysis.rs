//! Analysis API handlers
//!
//! POST /analysis/generate, POST /analysis/local-only, POST /analysis/transcribe
//!
//! Every handler takes a multipart upload with a `file` part. The upload is
//! written into a scoped temporary directory that is removed when the
//! handler returns, whatever the outcome.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    fusion::MoodMergePolicy,
    models::{FinalMetadata, LocalAnalysis, Transcription},
    utils::ScopedUpload,
    workflow::PipelineOptions,
    AppState,
};

/// Parsed multipart body
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    file: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Consume the form, returning the file bytes or a 400
    fn take_file(&mut self) -> ApiResult<Vec<u8>> {
        let bytes = self
            .file
            .take()
            .ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty.".to_string()));
        }
        Ok(bytes)
    }

    fn flag(&self, name: &str) -> ApiResult<bool> {
        match self.fields.get(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(ApiError::BadRequest(format!(
                    "Invalid boolean for {}: {}",
                    name, other
                ))),
            },
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            form.file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            form.file = Some(bytes.to_vec());
        } else if !name.is_empty() {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

async fn write_upload(form: &mut UploadForm) -> ApiResult<ScopedUpload> {
    let bytes = form.take_file()?;
    Ok(ScopedUpload::write(form.file_name.as_deref(), &bytes).await?)
}

/// POST /analysis/generate
///
/// Full pipeline when the LLM is configured, degraded output otherwise.
///
/// Form fields: `file`, `transcribe`, `proMode`, `moodPolicy`, `model_size`
pub async fn generate_metadata(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<FinalMetadata>> {
    let mut form = read_form(multipart).await?;

    let mood_policy = match form.text("moodPolicy") {
        Some(raw) => raw.parse::<MoodMergePolicy>().map_err(ApiError::BadRequest)?,
        None => MoodMergePolicy::default(),
    };
    let options = PipelineOptions {
        transcribe: form.flag("transcribe")?,
        pro_mode: form.flag("proMode")?,
        mood_policy,
        model_size: form.text("model_size").map(str::to_string),
    };

    let upload = write_upload(&mut form).await?;
    let run_id = Uuid::new_v4();
    info!(
        run_id = %run_id,
        file = %upload.original_name(),
        transcribe = options.wants_transcription(),
        mood_policy = ?options.mood_policy,
        "Metadata generation requested"
    );

    match state
        .orchestrator
        .run(upload.path(), upload.original_name(), &options)
        .await
    {
        Ok(outcome) => {
            info!(
                run_id = %run_id,
                variant = ?outcome.report.variant,
                degraded = outcome.report.degraded_reason.is_some(),
                "Metadata generation complete"
            );
            Ok(Json(outcome.metadata))
        }
        Err(e) => {
            warn!(run_id = %run_id, stage = e.stage(), error = %e, "Metadata generation failed");
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

/// POST /analysis/local-only
///
/// Local measurements without transcription or synthesis.
pub async fn analyze_local(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<LocalAnalysis>> {
    let mut form = read_form(multipart).await?;
    let upload = write_upload(&mut form).await?;

    match state.orchestrator.analyze_local(upload.path()).await {
        Ok(analysis) => Ok(Json(analysis)),
        Err(e) => {
            warn!(file = %upload.original_name(), stage = e.stage(), error = %e, "Local analysis failed");
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

/// POST /analysis/transcribe
///
/// Form fields: `file`, `model_size` (default from config)
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Transcription>> {
    let mut form = read_form(multipart).await?;

    if !state.orchestrator.transcription_available() {
        return Err(ApiError::ServiceUnavailable(
            "Transcription service not available".to_string(),
        ));
    }

    let upload = write_upload(&mut form).await?;
    match state
        .orchestrator
        .transcribe(upload.path(), form.text("model_size"))
        .await
    {
        Ok(transcription) => Ok(Json(transcription)),
        Err(e) => {
            warn!(file = %upload.original_name(), error = %e, "Transcription failed");
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/generate", post(generate_metadata))
        .route("/analysis/local-only", post(analyze_local))
        .route("/analysis/transcribe", post(transcribe))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        UploadForm {
            file_name: None,
            file: None,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_flag_parsing() {
        let f = form(&[("transcribe", "True"), ("proMode", "0"), ("bad", "maybe")]);
        assert!(f.flag("transcribe").unwrap());
        assert!(!f.flag("proMode").unwrap());
        assert!(!f.flag("absent").unwrap());
        assert!(matches!(f.flag("bad"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_take_file_rejects_missing_and_empty() {
        let mut f = form(&[]);
        assert!(matches!(f.take_file(), Err(ApiError::BadRequest(msg)) if msg == "No file provided"));

        f.file = Some(Vec::new());
        assert!(
            matches!(f.take_file(), Err(ApiError::BadRequest(msg)) if msg == "Uploaded file is empty.")
        );

        f.file = Some(vec![1, 2, 3]);
        assert_eq!(f.take_file().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_blank_text_fields_are_absent() {
        let f = form(&[("model_size", "  "), ("moodPolicy", "union")]);
        assert_eq!(f.text("model_size"), None);
        assert_eq!(f.text("moodPolicy"), Some("union"));
    }
}
