//! Cardscan AI - Remote parsing adapters
//!
//! Sends recognized card text to a language-model API and maps the JSON
//! reply into a `ParsedCandidate` with `source = Ai`. Two backends are
//! provided: an OpenAI-compatible chat API and Ollama. Remote failures map
//! onto the core error taxonomy so callers can tell quota, rate-limit, and
//! outage apart.

pub mod cache;

pub use cache::{CacheStats, ResponseCache};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use cardscan_core::{
    clamp_confidence, AiConfig, AiParser, AiProvider, CandidateSource, CardScanError,
    ParseHints, ParsedCandidate, Result,
};

// ============================================================================
// Prompting and response parsing
// ============================================================================

const SYSTEM_PROMPT: &str = "You extract contact fields from business card text. \
Reply with a single JSON object and nothing else, using exactly these keys: \
name, company, job_title, email, phone, mobile, address, website, notes, confidence. \
Use null for fields that are absent. confidence is a number between 0 and 1.";

/// Build the user prompt, folding optional hints in.
fn build_prompt(text: &str, hints: Option<&ParseHints>) -> String {
    let mut prompt = String::new();

    if let Some(hints) = hints {
        let mut lines = Vec::new();
        if let Some(language) = &hints.language {
            lines.push(format!("language: {language}"));
        }
        if let Some(country) = &hints.country {
            lines.push(format!("country: {country}"));
        }
        if let Some(card_type) = &hints.card_type {
            lines.push(format!("card type: {card_type}"));
        }
        if let Some(industry) = &hints.industry {
            lines.push(format!("industry: {industry}"));
        }
        if !lines.is_empty() {
            prompt.push_str("Context:\n");
            prompt.push_str(&lines.join("\n"));
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("Card text:\n");
    prompt.push_str(text);
    prompt
}

/// Field structure expected in the model reply.
#[derive(Debug, Default, Deserialize)]
struct AiCardReply {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default, alias = "jobTitle", alias = "title")]
    job_title: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a model reply into a candidate.
///
/// Models wrap JSON in code fences often enough that the parser scans for
/// the outermost object instead of trusting the whole body.
fn candidate_from_reply(body: &str) -> Result<ParsedCandidate> {
    let start = body.find('{');
    let end = body.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &body[s..=e],
        _ => {
            // Not retryable: the service responded, it just talked garbage
            return Err(CardScanError::InvalidInput(
                "AI reply carried no JSON object".to_string(),
            ));
        }
    };

    let reply: AiCardReply = serde_json::from_str(json)
        .map_err(|e| CardScanError::InvalidInput(format!("malformed AI JSON reply: {e}")))?;

    let mut candidate = ParsedCandidate::empty(CandidateSource::Ai);
    candidate.name = non_empty(reply.name);
    candidate.company = non_empty(reply.company);
    candidate.job_title = non_empty(reply.job_title);
    candidate.email = non_empty(reply.email);
    candidate.phone = non_empty(reply.phone);
    candidate.mobile = non_empty(reply.mobile);
    candidate.address = non_empty(reply.address);
    candidate.website = non_empty(reply.website);
    candidate.notes = non_empty(reply.notes);
    candidate.confidence = clamp_confidence(reply.confidence.unwrap_or(0.8));
    candidate.parsed_at = Utc::now();
    Ok(candidate)
}

// ============================================================================
// HTTP error mapping
// ============================================================================

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Map a non-success API status onto the error taxonomy.
async fn map_status_error(service: &str, response: reqwest::Response) -> CardScanError {
    let status = response.status();
    let retry_after = retry_after_secs(&response);
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            if body.contains("insufficient_quota") || body.contains("quota") {
                CardScanError::QuotaExceeded {
                    reset_at: retry_after
                        .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
                }
            } else {
                CardScanError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CardScanError::InvalidInput(format!("{service} rejected the request: {body}"))
        }
        _ => CardScanError::ServiceUnavailable {
            service: service.to_string(),
            reason: format!("{status}: {body}"),
        },
    }
}

fn map_transport_error(service: &str, timeout: Duration, error: reqwest::Error) -> CardScanError {
    if error.is_timeout() {
        CardScanError::Timeout {
            stage: "AI text parsing".to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        }
    } else {
        CardScanError::ServiceUnavailable {
            service: service.to_string(),
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// OpenAI-compatible parser
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// AI parser backed by an OpenAI-compatible chat completion API.
pub struct OpenAiParser {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    cache: Option<ResponseCache>,
}

impl OpenAiParser {
    /// Create from config; the API key is required
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = config.api_key.as_ref().ok_or_else(|| {
            CardScanError::ConfigError("AI API key required for the openai provider".to_string())
        })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardScanError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            cache: config.cache_enabled.then(|| ResponseCache::from_config(config)),
        })
    }

    /// Set custom base URL (for gateways and compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl AiParser for OpenAiParser {
    async fn parse_card(
        &self,
        text: &str,
        hints: Option<&ParseHints>,
    ) -> Result<ParsedCandidate> {
        if text.trim().is_empty() {
            return Err(CardScanError::InvalidInput(
                "cannot parse empty card text".to_string(),
            ));
        }

        let key = ResponseCache::key(text, hints);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key).await {
                tracing::debug!("AI parse served from cache");
                return Ok(hit);
            }
        }

        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: build_prompt(text, hints),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(self.id(), self.timeout, e))?;

        if !response.status().is_success() {
            return Err(map_status_error(self.id(), response).await);
        }

        let result: OpenAiResponse =
            response
                .json()
                .await
                .map_err(|e| CardScanError::ServiceUnavailable {
                    service: self.id().to_string(),
                    reason: format!("failed to parse response: {e}"),
                })?;

        let content = result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| CardScanError::ServiceUnavailable {
                service: self.id().to_string(),
                reason: "no completion generated".to_string(),
            })?;

        let candidate = candidate_from_reply(&content)?;
        if let Some(cache) = &self.cache {
            cache.insert(key, candidate.clone()).await;
        }
        Ok(candidate)
    }

    fn id(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Ollama parser
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// AI parser backed by a local Ollama server.
pub struct OllamaParser {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    cache: Option<ResponseCache>,
}

impl OllamaParser {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardScanError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.ollama_url.clone(),
            model: config.model.clone(),
            timeout,
            cache: config.cache_enabled.then(|| ResponseCache::from_config(config)),
        })
    }
}

#[async_trait]
impl AiParser for OllamaParser {
    async fn parse_card(
        &self,
        text: &str,
        hints: Option<&ParseHints>,
    ) -> Result<ParsedCandidate> {
        if text.trim().is_empty() {
            return Err(CardScanError::InvalidInput(
                "cannot parse empty card text".to_string(),
            ));
        }

        let key = ResponseCache::key(text, hints);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key).await {
                return Ok(hit);
            }
        }

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: build_prompt(text, hints),
            system: SYSTEM_PROMPT.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(self.id(), self.timeout, e))?;

        if !response.status().is_success() {
            return Err(map_status_error(self.id(), response).await);
        }

        let result: OllamaResponse =
            response
                .json()
                .await
                .map_err(|e| CardScanError::ServiceUnavailable {
                    service: self.id().to_string(),
                    reason: format!("failed to parse response: {e}"),
                })?;

        let candidate = candidate_from_reply(&result.response)?;
        if let Some(cache) = &self.cache {
            cache.insert(key, candidate.clone()).await;
        }
        Ok(candidate)
    }

    fn id(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create an AI parser from config.
pub fn create_ai_parser(config: &AiConfig) -> Result<Arc<dyn AiParser>> {
    match config.provider {
        AiProvider::OpenAi => Ok(Arc::new(OpenAiParser::from_config(config)?)),
        AiProvider::Ollama => Ok(Arc::new(OllamaParser::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_hints_and_text() {
        let hints = ParseHints {
            language: Some("zh-TW".to_string()),
            country: Some("TW".to_string()),
            ..Default::default()
        };

        let prompt = build_prompt("王小明\n工程師", Some(&hints));
        assert!(prompt.contains("language: zh-TW"));
        assert!(prompt.contains("country: TW"));
        assert!(prompt.contains("王小明"));

        let bare = build_prompt("text", None);
        assert!(!bare.contains("Context:"));
    }

    #[test]
    fn test_reply_parsing_plain_json() {
        let body = r#"{"name": "Jane Doe", "email": "jane@acme.com", "confidence": 0.92}"#;
        let candidate = candidate_from_reply(body).unwrap();

        assert_eq!(candidate.name.as_deref(), Some("Jane Doe"));
        assert_eq!(candidate.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(candidate.source, CandidateSource::Ai);
        assert!((candidate.confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_reply_parsing_fenced_json() {
        let body = "Here you go:\n```json\n{\"name\": \"Jane\", \"jobTitle\": \"Engineer\"}\n```";
        let candidate = candidate_from_reply(body).unwrap();

        assert_eq!(candidate.name.as_deref(), Some("Jane"));
        assert_eq!(candidate.job_title.as_deref(), Some("Engineer"));
        // missing confidence falls back to a usable default
        assert!((candidate.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_reply_empty_strings_become_none() {
        let body = r#"{"name": "Jane", "company": "", "phone": "  "}"#;
        let candidate = candidate_from_reply(body).unwrap();
        assert!(candidate.company.is_none());
        assert!(candidate.phone.is_none());
    }

    #[test]
    fn test_reply_confidence_clamped() {
        let body = r#"{"name": "Jane", "confidence": 3.5}"#;
        assert_eq!(candidate_from_reply(body).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_reply_without_json_fails() {
        assert!(candidate_from_reply("I could not parse this card").is_err());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = AiConfig::default();
        assert!(matches!(
            OpenAiParser::from_config(&config),
            Err(CardScanError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let config = AiConfig {
            provider: AiProvider::Ollama,
            ..Default::default()
        };
        let parser = OllamaParser::from_config(&config).unwrap();

        let err = parser.parse_card("   ", None).await.unwrap_err();
        assert!(matches!(err, CardScanError::InvalidInput(_)));
    }
}
