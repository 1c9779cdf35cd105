//! Metadata synthesis through an LLM collaborator
//!
//! Builds the prompt and schema hint from local analysis, hands them to a
//! [`MetadataGenerator`], and parses the reply. Retries belong to the
//! orchestrator; one call here is one attempt.

use super::prompt::{build_prompt, schema_hint, PromptInputs};
use super::vocabulary::Vocabulary;
use crate::models::SynthesizedMetadata;
use crate::types::{MetadataGenerator, SynthesisError};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Prompt builder bound to a generator
#[derive(Clone)]
pub struct MetadataSynthesizer {
    generator: Arc<dyn MetadataGenerator>,
}

impl MetadataSynthesizer {
    pub fn new(generator: Arc<dyn MetadataGenerator>) -> Self {
        Self { generator }
    }

    /// Capability flag of the wrapped generator
    pub fn is_available(&self) -> bool {
        self.generator.is_available()
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Run one synthesis attempt
    ///
    /// # Errors
    /// * `SynthesisError::Service` - generator unreachable or rejected the call
    /// * `SynthesisError::Format` - reply held no JSON object
    pub async fn synthesize(
        &self,
        inputs: &PromptInputs<'_>,
        vocab: &Vocabulary,
    ) -> Result<SynthesizedMetadata, SynthesisError> {
        let prompt = build_prompt(inputs, vocab);
        let hint = schema_hint(inputs.core);
        let started = Instant::now();

        let value = self.generator.generate_json(&prompt, &hint).await?;
        if !value.is_object() {
            return Err(SynthesisError::Format(
                "Generator returned JSON that is not an object".to_string(),
            ));
        }

        debug!(
            generator = self.generator.name(),
            prompt_chars = prompt.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synthesis reply parsed"
        );

        Ok(SynthesizedMetadata::from_value(&value))
    }
}
