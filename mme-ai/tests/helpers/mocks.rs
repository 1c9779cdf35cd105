//! Recording collaborator doubles

use async_trait::async_trait;
use mme_ai::models::Transcription;
use mme_ai::types::{MetadataGenerator, SynthesisError, Transcriber};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Generator returning a canned reply and counting calls
pub struct MockGenerator {
    available: bool,
    reply: Result<String, SynthesisError>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            available: true,
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: SynthesisError) -> Self {
        Self {
            available: true,
            reply: Err(err),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reports itself unavailable but still counts any call
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::replying("{}")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MetadataGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate_raw(&self, prompt: &str, _schema_hint: &str) -> Result<String, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// Transcriber returning fixed text and counting calls
pub struct MockTranscriber {
    text: String,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(&self, _path: &Path, _model_size: &str) -> Transcription {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Transcription {
            text: self.text.clone(),
            language: Some("en".to_string()),
            ..Transcription::default()
        }
    }
}
