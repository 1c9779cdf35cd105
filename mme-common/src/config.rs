//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/mme/config.toml` on Linux)
//! 4. System config (`/etc/mme/config.toml`, Linux only)
//!
//! A missing file is not an error: every field has a built-in default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from TOML file
///
/// Read once at startup. The service must restart to pick up changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// LLM metadata synthesis settings
    #[serde(default)]
    pub ai: AiConfig,

    /// Speech-to-text settings
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Pipeline tuning
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            logging: LoggingConfig::default(),
            ai: AiConfig::default(),
            transcription: TranscriptionConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// LLM client configuration (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API key; environment variables take priority over this value
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

/// Transcription engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Master switch; when false the transcriber is never probed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name or path of the whisper command-line binary
    #[serde(default = "default_whisper_binary")]
    pub binary: String,

    /// Default model size when the request does not name one
    #[serde(default = "default_model_size")]
    pub model_size: String,

    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: default_whisper_binary(),
            model_size: default_model_size(),
            timeout_secs: default_transcription_timeout(),
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Length of the audio prefix handed to pitch tracking
    #[serde(default = "default_pitch_window")]
    pub pitch_window_secs: f64,

    /// Number of synthesis attempts before the run fails (minimum 1)
    #[serde(default = "default_synthesis_attempts")]
    pub synthesis_attempts: u32,

    /// Return degraded output instead of an error when synthesis fails
    #[serde(default)]
    pub degrade_on_synthesis_failure: bool,

    /// Optional TOML file overriding the built-in vocabularies
    #[serde(default)]
    pub vocabulary_file: Option<PathBuf>,

    /// Upper bound for each local analysis stage
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pitch_window_secs: default_pitch_window(),
            synthesis_attempts: default_synthesis_attempts(),
            degrade_on_synthesis_failure: false,
            vocabulary_file: None,
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5730".to_string()
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_ai_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_whisper_binary() -> String {
    "whisper".to_string()
}

fn default_model_size() -> String {
    "base".to_string()
}

fn default_transcription_timeout() -> u64 {
    600
}

fn default_pitch_window() -> f64 {
    60.0
}

fn default_synthesis_attempts() -> u32 {
    1
}

fn default_stage_timeout() -> u64 {
    300
}

/// Resolve the config file path
///
/// Returns `None` when no candidate exists; callers then use defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    let user_config = dirs::config_dir().map(|d| d.join("mme").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mme/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load TOML configuration
///
/// # Arguments
/// * `path` - Resolved config path, or `None` for built-in defaults
///
/// # Errors
/// * `Error::Config` if an explicitly named file is missing or malformed
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        tracing::debug!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;

    tracing::info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = load_toml_config(None).unwrap();
        assert_eq!(config.bind, "127.0.0.1:5730");
        assert_eq!(config.ai.model, "llama3-70b-8192");
        assert_eq!(config.ai.max_tokens, 2000);
        assert_eq!(config.transcription.model_size, "base");
        assert_eq!(config.analysis.synthesis_attempts, 1);
        assert!(!config.analysis.degrade_on_synthesis_failure);
        assert!((config.analysis.pitch_window_secs - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "bind = \"0.0.0.0:9000\"").unwrap();
        writeln!(file, "[ai]").unwrap();
        writeln!(file, "model = \"other-model\"").unwrap();
        writeln!(file, "[analysis]").unwrap();
        writeln!(file, "synthesis_attempts = 3").unwrap();

        let config = load_toml_config(Some(&path)).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.ai.model, "other-model");
        assert_eq!(config.ai.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.analysis.synthesis_attempts, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_toml_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "bind = [").unwrap();
        assert!(matches!(load_toml_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_cli_arg_beats_env() {
        std::env::set_var("MME_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), "MME_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));

        let resolved = resolve_config_path(None, "MME_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var("MME_TEST_CONFIG");
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("gsk_abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   \t"));
    }
}
