//! External service clients
//!
//! Implementations of the collaborator traits in [`crate::types`] that
//! talk to processes or services outside this crate.

pub mod llm_client;
pub mod whisper_client;

pub use llm_client::{parse_json_response, GroqChatGenerator, UnavailableGenerator};
pub use whisper_client::{DisabledTranscriber, WhisperCliTranscriber};
