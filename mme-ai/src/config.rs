//! Configuration resolution for mme-ai
//!
//! Resolves the LLM API key with Environment → TOML priority.

use mme_common::config::{is_valid_key, TomlConfig};
use tracing::{info, warn};

/// Environment variables checked for the LLM API key, highest priority first
pub const API_KEY_ENV_VARS: [&str; 2] = ["MME_GROQ_API_KEY", "GROQ_API_KEY"];

/// Resolve the LLM API key
///
/// **Priority:** `MME_GROQ_API_KEY` → `GROQ_API_KEY` → TOML `[ai].api_key`
///
/// Returns `None` when no source holds a valid key; the service then runs
/// the degraded pipeline.
pub fn resolve_ai_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_keys: Vec<(&str, Option<String>)> = API_KEY_ENV_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();
    let toml_key = toml_config.ai.api_key.as_ref();

    let mut sources: Vec<&str> = env_keys
        .iter()
        .filter(|(_, key)| key.as_deref().is_some_and(is_valid_key))
        .map(|(name, _)| *name)
        .collect();
    if toml_key.is_some_and(|k| is_valid_key(k)) {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "AI API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (name, key) in env_keys {
        if let Some(key) = key.filter(|k| is_valid_key(k)) {
            info!("AI API key loaded from environment variable {}", name);
            return Some(key.trim().to_string());
        }
    }

    if let Some(key) = toml_key.filter(|k| is_valid_key(k)) {
        info!("AI API key loaded from TOML config");
        return Some(key.trim().to_string());
    }

    info!("No AI API key configured");
    None
}
