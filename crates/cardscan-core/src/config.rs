//! Cardscan Configuration Management
//!
//! Handles configuration from environment variables and config files with
//! sensible defaults for development. The pipeline receives configuration
//! by value; there is no global configuration state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// OCR engine configuration
    pub ocr: OcrConfig,

    /// AI parser configuration
    pub ai: AiConfig,

    /// Pipeline behavior configuration
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // OCR
        if let Ok(lang) = std::env::var("CARDSCAN_OCR_LANG") {
            config.ocr.language = lang;
        }
        if let Ok(path) = std::env::var("CARDSCAN_TESSERACT_PATH") {
            config.ocr.executable_path = Some(path);
        }
        if let Ok(max) = std::env::var("CARDSCAN_MAX_IMAGE_BYTES") {
            config.ocr.max_image_bytes = max.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CARDSCAN_MAX_IMAGE_BYTES".to_string(),
                value: max,
            })?;
        }

        // AI
        if let Ok(provider) = std::env::var("CARDSCAN_AI_PROVIDER") {
            config.ai.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.ai.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("CARDSCAN_AI_BASE_URL") {
            config.ai.base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.ai.ollama_url = url;
        }
        if let Ok(model) = std::env::var("CARDSCAN_AI_MODEL") {
            config.ai.model = model;
        }

        // Pipeline
        if let Ok(threshold) = std::env::var("CARDSCAN_CONFIDENCE_THRESHOLD") {
            config.pipeline.confidence_threshold =
                threshold.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CARDSCAN_CONFIDENCE_THRESHOLD".to_string(),
                    value: threshold,
                })?;
        }
        if let Ok(concurrency) = std::env::var("CARDSCAN_BATCH_CONCURRENCY") {
            config.pipeline.batch_concurrency =
                concurrency.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CARDSCAN_BATCH_CONCURRENCY".to_string(),
                    value: concurrency,
                })?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before any pipeline sees them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.confidence_threshold".to_string(),
                value: self.pipeline.confidence_threshold.to_string(),
            });
        }
        if self.pipeline.batch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.batch_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// OCR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Language code(s) for recognition
    pub language: String,

    /// Path to the OCR executable, when not on PATH
    pub executable_path: Option<String>,

    /// Per-call recognition timeout in seconds
    pub timeout_secs: u64,

    /// Maximum accepted image size in bytes
    pub max_image_bytes: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng+chi_tra".to_string(),
            executable_path: None,
            timeout_secs: 30,
            max_image_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// AI parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// AI provider to use
    pub provider: AiProvider,

    /// API key for hosted providers
    pub api_key: Option<String>,

    /// API base URL override (for compatible gateways)
    pub base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Per-call request timeout in seconds
    pub timeout_secs: u64,

    /// Cache parse responses keyed by (text, hints)
    pub cache_enabled: bool,

    /// Maximum cached responses
    pub cache_capacity: u64,

    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::OpenAi,
            api_key: None,
            base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 30,
            cache_enabled: true,
            cache_capacity: 1_000,
            cache_ttl_secs: 300,
        }
    }
}

/// Supported AI providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for AiProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "CARDSCAN_AI_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// OCR confidence below this value attaches a warning
    pub confidence_threshold: f32,

    /// Default bound on in-flight batch items
    pub batch_concurrency: usize,

    /// Per-item persistence timeout in seconds
    pub persist_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            batch_concurrency: 4,
            persist_timeout_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.confidence_threshold, 0.7);
        assert_eq!(config.ocr.max_image_bytes, 10 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ai_provider_parse() {
        assert_eq!("openai".parse::<AiProvider>().unwrap(), AiProvider::OpenAi);
        assert_eq!("ollama".parse::<AiProvider>().unwrap(), AiProvider::Ollama);
        assert!("invalid".parse::<AiProvider>().is_err());
    }

    #[test]
    fn test_threshold_range_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.confidence_threshold = 1.2;
        assert!(config.validate().is_err());

        config.pipeline.confidence_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.batch_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
