//! Cardscan Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the cardscan
//! pipeline:
//! - Recognition and parsing models (OCR results, parsed candidates, cards)
//! - Common error taxonomy
//! - Collaborator traits (OCR engine, AI parser, card store, content screen)
//! - Configuration management

pub mod config;

pub use config::{
    AiConfig, AiProvider, AppConfig, ConfigError, LoggingConfig, OcrConfig, PipelineConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Fatal error kinds for cardscan operations.
///
/// Non-fatal issues (per-field format problems, low OCR confidence) never
/// appear here; they accumulate as warning strings on a processing result.
#[derive(Error, Debug)]
pub enum CardScanError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Image too large: {size} bytes (max {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Service unavailable: {service}: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("AI quota exceeded (resets at {reset_at:?})")]
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },

    #[error("Rate limited (retry after {retry_after_secs:?} seconds)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Timeout in {stage} after {elapsed_ms}ms")]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CardScanError {
    /// Whether a caller may reasonably retry the operation later.
    ///
    /// The pipeline itself never retries; this exposes the hint to callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. }
                | Self::QuotaExceeded { .. }
                | Self::RateLimited { .. }
                | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CardScanError>;

/// Clamp a confidence score into [0, 1].
///
/// NaN collapses to 0.0 so a misbehaving adapter can never poison
/// downstream comparisons.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// OCR Models
// ============================================================================

/// Result of one OCR pass over a card image. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Unique identifier
    pub id: Uuid,

    /// Raw recognized text
    pub raw_text: String,

    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,

    /// Wall-clock recognition time in milliseconds
    pub processing_time_ms: u64,

    /// When recognition finished
    pub processed_at: DateTime<Utc>,

    /// Identifier of the engine that produced this result
    pub engine_id: String,
}

impl OcrResult {
    /// Create a new OCR result
    pub fn new(raw_text: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_text: raw_text.into(),
            confidence: 1.0,
            processing_time_ms: 0,
            processed_at: Utc::now(),
            engine_id: engine_id.into(),
        }
    }

    /// Set confidence score (clamped to [0, 1])
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    /// Set processing time
    pub fn with_processing_time_ms(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }
}

/// Preprocessing hints forwarded to the OCR engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PreprocessHints {
    pub contrast: bool,
    pub brightness: bool,
    pub sharpen: bool,
}

/// Options for a single OCR invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Language code(s) for recognition (e.g., "eng", "chi_tra", "eng+chi_tra")
    pub language: String,

    /// Optional preprocessing hints
    pub preprocess: Option<PreprocessHints>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            preprocess: None,
        }
    }
}

impl OcrOptions {
    /// Set language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set preprocessing hints
    pub fn with_preprocess(mut self, hints: PreprocessHints) -> Self {
        self.preprocess = Some(hints);
        self
    }
}

// ============================================================================
// Parsing Models
// ============================================================================

/// Provenance of a parsed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    /// Produced by local heuristics only
    Local,
    /// Every populated field supplied by the AI parser
    Ai,
    /// AI result completed with fields from local heuristics
    Hybrid,
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ai => write!(f, "ai"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// An intermediate parse of card text. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCandidate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,

    /// Parse confidence (0.0 - 1.0)
    pub confidence: f32,

    /// Where the populated fields came from
    pub source: CandidateSource,

    /// When this candidate was produced
    pub parsed_at: DateTime<Utc>,
}

impl ParsedCandidate {
    /// All-empty candidate from the given source with confidence 0.0
    pub fn empty(source: CandidateSource) -> Self {
        Self {
            name: None,
            company: None,
            job_title: None,
            email: None,
            phone: None,
            mobile: None,
            address: None,
            website: None,
            notes: None,
            confidence: 0.0,
            source,
            parsed_at: Utc::now(),
        }
    }

    /// Set confidence score (clamped to [0, 1])
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    /// Number of populated fields (notes excluded)
    pub fn populated_field_count(&self) -> usize {
        [
            &self.name,
            &self.company,
            &self.job_title,
            &self.email,
            &self.phone,
            &self.mobile,
            &self.address,
            &self.website,
        ]
        .iter()
        .filter(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
        .count()
    }

    /// Whether no field at all is populated
    pub fn is_empty(&self) -> bool {
        self.populated_field_count() == 0 && self.notes.is_none()
    }
}

/// Optional bias signals for the AI parser. Never used by local heuristics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseHints {
    /// Expected language of the card text (e.g., "zh-TW")
    pub language: Option<String>,

    /// Country issuing context (affects phone formats)
    pub country: Option<String>,

    /// Card type (e.g., "corporate", "personal")
    pub card_type: Option<String>,

    /// Industry context
    pub industry: Option<String>,
}

// ============================================================================
// Card Models
// ============================================================================

/// Identifier prefix for cards produced by a dry run.
pub const PREVIEW_ID_PREFIX: &str = "preview-";

/// A finished business card entity.
///
/// A real identifier is assigned by the card store; dry runs carry a
/// `preview-` placeholder that no store will ever see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessCard {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,

    /// Reference to the scanned image (path or URL)
    pub image_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessCard {
    /// Build a card from a validated candidate.
    ///
    /// Fails with `InvalidInput` when the candidate carries no usable name;
    /// a card is never persisted nameless.
    pub fn from_candidate(candidate: &ParsedCandidate) -> Result<Self> {
        let name = candidate
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CardScanError::InvalidInput("card name is empty".to_string()))?;

        let now = Utc::now();
        Ok(Self {
            id: format!("{PREVIEW_ID_PREFIX}{}", Uuid::new_v4()),
            name: name.to_string(),
            company: candidate.company.clone(),
            job_title: candidate.job_title.clone(),
            email: candidate.email.clone(),
            phone: candidate.phone.clone(),
            mobile: candidate.mobile.clone(),
            address: candidate.address.clone(),
            website: candidate.website.clone(),
            notes: candidate.notes.clone(),
            image_ref: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Set image reference
    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Whether this card still carries a dry-run placeholder identifier
    pub fn is_preview(&self) -> bool {
        self.id.starts_with(PREVIEW_ID_PREFIX)
    }
}

// ============================================================================
// Pipeline Result Models
// ============================================================================

/// Duration of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetric {
    pub name: String,
    pub duration_ms: u64,
}

/// Timing breakdown for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_ms: u64,
    pub stages: Vec<StageMetric>,
}

impl PipelineMetrics {
    /// start <= end for the run, and no stage outlasts the whole run
    pub fn is_monotonic(&self) -> bool {
        self.started_at <= self.finished_at
            && self.stages.iter().all(|s| s.duration_ms <= self.total_ms)
    }
}

/// Everything a caller gets back from one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// The finished card (persisted unless the run was dry)
    pub card: BusinessCard,

    /// The OCR result, when the run started from an image
    pub ocr_result: Option<OcrResult>,

    /// The arbitrated, validated candidate the card was built from
    pub parsed: ParsedCandidate,

    /// Ordered non-fatal warnings accumulated during the run
    pub warnings: Vec<String>,

    /// Human-readable labels of every executed stage, in order
    pub processing_steps: Vec<String>,

    /// Timing breakdown, when metrics tracking was requested
    pub metrics: Option<PipelineMetrics>,
}

impl ProcessingResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A failure for one item of a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Index of the item in the input batch
    pub index: usize,
    pub error: CardScanError,
}

/// Outcome of a batch run. One item's failure never hides its siblings.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub successful: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

// An empty result must not require `T: Default`, so no derive here
impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// Total items accounted for
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_complete(&self, input_len: usize) -> bool {
        self.total() == input_len
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Trait for OCR engines. The engine itself is a black box; the pipeline
/// only sees raw text plus a confidence.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an image buffer
    async fn recognize(&self, image: &[u8], options: &OcrOptions) -> Result<OcrResult>;

    /// Engine identifier for logging and `OcrResult::engine_id`
    fn id(&self) -> &str;

    /// Whether the engine can currently serve requests
    fn is_available(&self) -> bool {
        true
    }
}

/// Trait for remote AI card parsers.
#[async_trait::async_trait]
pub trait AiParser: Send + Sync {
    /// Parse card text into a structured candidate
    async fn parse_card(
        &self,
        text: &str,
        hints: Option<&ParseHints>,
    ) -> Result<ParsedCandidate>;

    /// Parser identifier for logging
    fn id(&self) -> &str;
}

/// Trait for card persistence gateways. Identity assignment happens here.
#[async_trait::async_trait]
pub trait CardStore: Send + Sync {
    /// Persist a card, assigning its definitive identifier
    async fn save_card(&self, card: BusinessCard) -> Result<BusinessCard>;

    /// Persist several cards; failures are isolated per card
    async fn save_cards(&self, cards: Vec<BusinessCard>) -> Result<BatchResult<BusinessCard>> {
        let mut result = BatchResult::default();
        for (index, card) in cards.into_iter().enumerate() {
            match self.save_card(card).await {
                Ok(saved) => result.successful.push(saved),
                Err(error) => result.failed.push(BatchFailure { index, error }),
            }
        }
        Ok(result)
    }
}

/// Outcome of a content screen that did not reject the text outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screened {
    /// Text with any offending substrings stripped
    pub clean_text: String,

    /// Human-readable descriptions of what was stripped, empty when clean
    pub findings: Vec<String>,
}

/// Trait for security screening of recognized text.
///
/// Sanitizable content comes back stripped with findings; content classified
/// as an active injection attempt returns `SecurityViolation`.
pub trait ContentValidator: Send + Sync {
    fn validate_content(&self, text: &str) -> Result<Screened>;
}

// ============================================================================
// In-memory Card Store
// ============================================================================

/// In-memory `CardStore` for tests and the CLI. Persistent engines live
/// outside this workspace.
#[derive(Default)]
pub struct MemoryCardStore {
    cards: Mutex<HashMap<String, BusinessCard>>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cards currently stored
    pub fn len(&self) -> usize {
        self.cards.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a stored card by identifier
    pub fn get(&self, id: &str) -> Option<BusinessCard> {
        self.cards.lock().ok()?.get(id).cloned()
    }
}

#[async_trait::async_trait]
impl CardStore for MemoryCardStore {
    async fn save_card(&self, mut card: BusinessCard) -> Result<BusinessCard> {
        let mut cards = self
            .cards
            .lock()
            .map_err(|_| CardScanError::StorageFailure("store lock poisoned".to_string()))?;

        card.id = Uuid::new_v4().to_string();
        card.updated_at = Utc::now();
        cards.insert(card.id.clone(), card.clone());
        Ok(card)
    }
}

// ============================================================================
// Tests
// ============================================================================
