//! Fusion of local analysis and LLM synthesis
//!
//! - [`vocabulary`]: closed label sets shared by every run
//! - [`prompt`]: prompt and schema hint construction
//! - [`synthesizer`]: one synthesis attempt against a generator
//! - [`reconciler`]: precedence rules producing [`FinalMetadata`](crate::models::FinalMetadata)

pub mod prompt;
pub mod reconciler;
pub mod synthesizer;
pub mod vocabulary;

pub use prompt::{build_prompt, schema_hint, PromptInputs};
pub use reconciler::{
    build_degraded, dedup_list, dedup_strings, merge_moods, reconcile, MeasuredFacts,
    MoodMergePolicy, ReconcileInputs, AI_UNAVAILABLE_NOTE,
};
pub use synthesizer::MetadataSynthesizer;
pub use vocabulary::{init_vocabulary, vocabulary, Vocabulary};
