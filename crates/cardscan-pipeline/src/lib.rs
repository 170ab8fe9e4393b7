//! Card scanning pipeline: OCR output to persisted business card.
//!
//! The orchestrator runs a fixed sequence of stages over one card image
//! (or a pre-computed OCR result): input validation, OCR, security
//! screening, local heuristic extraction, optional AI parsing, confidence
//! arbitration, validation and sanitization, then persistence. Every run
//! records the ordered stage labels it executed and the non-fatal warnings
//! it accumulated, so callers can always reconstruct what happened.

pub mod arbiter;
pub mod metrics;
pub mod security;
pub mod validate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use cardscan_core::{
    AiParser, AppConfig, BatchFailure, BatchResult, BusinessCard, CardScanError, CardStore,
    ContentValidator, MemoryCardStore, OcrEngine, OcrOptions, OcrResult, ParseHints,
    ProcessingResult, Result,
};
use cardscan_extract::{normalize, LocalExtractor};

pub use arbiter::arbitrate;
pub use metrics::MetricsRecorder;
pub use security::DefaultContentValidator;
pub use validate::validate_candidate;

/// Stage labels, recorded in execution order on every result.
pub mod steps {
    pub const INPUT_VALIDATION: &str = "input validation";
    pub const PREPROCESS: &str = "image preprocessing hints";
    pub const OCR: &str = "OCR text recognition";
    pub const SECURITY: &str = "security screening";
    pub const LOCAL_EXTRACTION: &str = "local field extraction";
    pub const AI_PARSING: &str = "AI text parsing";
    pub const ARBITRATION: &str = "confidence arbitration";
    pub const VALIDATION: &str = "data validation and sanitization";
    pub const DRY_RUN: &str = "dry run (no save)";
    pub const PERSISTENCE: &str = "card persistence";
    pub const CLEANUP: &str = "resource cleanup";
}

// ============================================================================
// Options
// ============================================================================

/// Per-run knobs. Cheap to clone; batch runs share one instance.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// OCR confidence below this value attaches a warning
    pub confidence_threshold: f32,

    /// Run every stage but never persist; the card keeps a preview id
    pub dry_run: bool,

    /// Collect a per-stage timing breakdown
    pub track_metrics: bool,

    /// Persist the finished card (ignored when `dry_run` is set)
    pub save_result: bool,

    /// Consult the AI parser when one is configured
    pub use_ai: bool,

    /// Options forwarded to the OCR engine
    pub ocr: OcrOptions,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            dry_run: false,
            track_metrics: false,
            save_result: true,
            use_ai: true,
            ocr: OcrOptions::default(),
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CardScanError::InvalidInput(format!(
                "confidence threshold out of range: {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// One unit of work in a batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// Raw image bytes, recognized by the pipeline's OCR engine
    Image(Vec<u8>),
    /// Text already recognized elsewhere
    Ocr(OcrResult),
}

// ============================================================================
// Run bookkeeping
// ============================================================================

struct RunState {
    steps: Vec<String>,
    warnings: Vec<String>,
    recorder: Option<MetricsRecorder>,
}

impl RunState {
    fn new(track_metrics: bool) -> Self {
        Self {
            steps: Vec::new(),
            warnings: Vec::new(),
            recorder: track_metrics.then(MetricsRecorder::start),
        }
    }

    fn record(&mut self, name: &str, from: Instant) {
        debug!(stage = name, "stage complete");
        self.steps.push(name.to_string());
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(name, from);
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// The scanning pipeline. Shared-nothing per run; safe to wrap in an `Arc`
/// and call concurrently.
pub struct CardPipeline {
    ocr: Option<Arc<dyn OcrEngine>>,
    ai: Option<Arc<dyn AiParser>>,
    store: Arc<dyn CardStore>,
    security: Arc<dyn ContentValidator>,
    extractor: LocalExtractor,
    config: AppConfig,
}

impl CardPipeline {
    /// Pipeline with an in-memory store, the default security screen, and
    /// no OCR or AI adapters. Attach adapters with the `with_*` methods.
    pub fn new(config: AppConfig) -> Self {
        Self {
            ocr: None,
            ai: None,
            store: Arc::new(MemoryCardStore::new()),
            security: Arc::new(DefaultContentValidator::new()),
            extractor: LocalExtractor::new(),
            config,
        }
    }

    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_ai(mut self, parser: Arc<dyn AiParser>) -> Self {
        self.ai = Some(parser);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CardStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_security(mut self, validator: Arc<dyn ContentValidator>) -> Self {
        self.security = validator;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the full pipeline over raw image bytes.
    pub async fn process_image(
        &self,
        image: &[u8],
        hints: Option<&ParseHints>,
        opts: &ProcessOptions,
    ) -> Result<ProcessingResult> {
        opts.validate()?;
        let mut state = RunState::new(opts.track_metrics);

        let t = Instant::now();
        if image.is_empty() {
            return Err(CardScanError::InvalidInput("image is empty".to_string()));
        }
        let max = self.config.ocr.max_image_bytes;
        if image.len() > max {
            return Err(CardScanError::ImageTooLarge {
                size: image.len(),
                max,
            });
        }
        state.record(steps::INPUT_VALIDATION, t);

        if opts.ocr.preprocess.is_some() {
            // Hints travel with the OCR options; recording the stage keeps
            // the step log faithful to what the engine was asked to do.
            let t = Instant::now();
            state.record(steps::PREPROCESS, t);
        }

        let engine = self.ocr.as_ref().ok_or_else(|| {
            CardScanError::ServiceUnavailable {
                service: "ocr".to_string(),
                reason: "no OCR engine configured".to_string(),
            }
        })?;

        let t = Instant::now();
        let ocr_timeout = Duration::from_secs(self.config.ocr.timeout_secs);
        let ocr_result = match tokio::time::timeout(ocr_timeout, engine.recognize(image, &opts.ocr))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CardScanError::Timeout {
                    stage: steps::OCR.to_string(),
                    elapsed_ms: ocr_timeout.as_millis() as u64,
                })
            }
        };
        info!(
            engine = ocr_result.engine_id.as_str(),
            confidence = ocr_result.confidence,
            chars = ocr_result.raw_text.len(),
            "OCR complete"
        );
        state.record(steps::OCR, t);

        if ocr_result.raw_text.trim().is_empty() {
            return Err(CardScanError::InvalidInput(
                "OCR produced no text".to_string(),
            ));
        }

        self.finish(ocr_result, hints, opts, state).await
    }

    /// Run the pipeline over text already recognized elsewhere.
    pub async fn process_ocr(
        &self,
        ocr_result: OcrResult,
        hints: Option<&ParseHints>,
        opts: &ProcessOptions,
    ) -> Result<ProcessingResult> {
        opts.validate()?;
        let mut state = RunState::new(opts.track_metrics);

        let t = Instant::now();
        if ocr_result.raw_text.trim().is_empty() {
            return Err(CardScanError::InvalidInput(
                "OCR text is empty".to_string(),
            ));
        }
        state.record(steps::INPUT_VALIDATION, t);

        self.finish(ocr_result, hints, opts, state).await
    }

    /// Shared tail of the pipeline: everything after text recognition.
    async fn finish(
        &self,
        ocr_result: OcrResult,
        hints: Option<&ParseHints>,
        opts: &ProcessOptions,
        mut state: RunState,
    ) -> Result<ProcessingResult> {
        let ocr_confidence = ocr_result.confidence;

        // A hostile payload aborts the run before any field ever sees it.
        let t = Instant::now();
        let screened = self.security.validate_content(&ocr_result.raw_text)?;
        for finding in &screened.findings {
            warn!(finding = finding.as_str(), "raw text screened");
            state.warnings.push(finding.clone());
        }
        state.record(steps::SECURITY, t);

        let t = Instant::now();
        let normalized = normalize(&screened.clean_text);
        let local = self.extractor.extract(&normalized);
        debug!(
            fields = local.populated_field_count(),
            confidence = local.confidence,
            "local extraction complete"
        );
        state.record(steps::LOCAL_EXTRACTION, t);

        let ai_candidate = match (&self.ai, opts.use_ai) {
            (Some(parser), true) => {
                let t = Instant::now();
                let ai_timeout = Duration::from_secs(self.config.ai.timeout_secs);
                let outcome =
                    tokio::time::timeout(ai_timeout, parser.parse_card(&normalized, hints))
                        .await
                        .unwrap_or_else(|_| {
                            Err(CardScanError::Timeout {
                                stage: steps::AI_PARSING.to_string(),
                                elapsed_ms: ai_timeout.as_millis() as u64,
                            })
                        });
                state.record(steps::AI_PARSING, t);
                match outcome {
                    Ok(candidate) => Some(candidate),
                    Err(err) if err.is_retryable() => return Err(err),
                    Err(err) => {
                        warn!(error = %err, "AI parsing degraded to local extraction");
                        state.warnings.push(format!("AI parsing failed: {err}"));
                        None
                    }
                }
            }
            _ => None,
        };

        let t = Instant::now();
        let (merged, arbitration_warnings) = arbitrate(
            local,
            ai_candidate,
            ocr_confidence,
            opts.confidence_threshold,
        );
        state.warnings.extend(arbitration_warnings);
        state.record(steps::ARBITRATION, t);

        let t = Instant::now();
        let (validated, validation_warnings) =
            validate_candidate(merged, self.security.as_ref())?;
        state.warnings.extend(validation_warnings);
        state.record(steps::VALIDATION, t);

        let mut card = BusinessCard::from_candidate(&validated)?;

        if opts.dry_run {
            let t = Instant::now();
            state.record(steps::DRY_RUN, t);
        } else if opts.save_result {
            let t = Instant::now();
            let persist_timeout = Duration::from_secs(self.config.pipeline.persist_timeout_secs);
            card = match tokio::time::timeout(persist_timeout, self.store.save_card(card)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(CardScanError::Timeout {
                        stage: steps::PERSISTENCE.to_string(),
                        elapsed_ms: persist_timeout.as_millis() as u64,
                    })
                }
            };
            state.record(steps::PERSISTENCE, t);
        }

        let t = Instant::now();
        state.record(steps::CLEANUP, t);

        info!(
            card_id = card.id.as_str(),
            source = %validated.source,
            confidence = validated.confidence,
            warnings = state.warnings.len(),
            dry_run = opts.dry_run,
            "pipeline run complete"
        );

        Ok(ProcessingResult {
            card,
            ocr_result: Some(ocr_result),
            parsed: validated,
            warnings: state.warnings,
            processing_steps: state.steps,
            metrics: state.recorder.map(MetricsRecorder::finish),
        })
    }

    /// Process a batch of items with bounded concurrency.
    ///
    /// Each item succeeds or fails on its own; one bad image never takes
    /// the batch down. `successful.len() + failed.len()` always equals the
    /// input length, and failures carry their input index.
    pub async fn process_batch(
        &self,
        items: Vec<BatchItem>,
        hints: Option<ParseHints>,
        opts: &ProcessOptions,
        concurrency: usize,
    ) -> BatchResult<ProcessingResult> {
        let total = items.len();
        info!(items = total, concurrency, "batch started");

        let mut outcomes: Vec<(usize, Result<ProcessingResult>)> =
            stream::iter(items.into_iter().enumerate())
                .map(|(index, item)| {
                    let hints = hints.clone();
                    async move {
                        let outcome = match item {
                            BatchItem::Image(bytes) => {
                                self.process_image(&bytes, hints.as_ref(), opts).await
                            }
                            BatchItem::Ocr(ocr) => {
                                self.process_ocr(ocr, hints.as_ref(), opts).await
                            }
                        };
                        (index, outcome)
                    }
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        // Input order back, regardless of completion order
        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = BatchResult {
            successful: Vec::new(),
            failed: Vec::new(),
        };
        for (index, outcome) in outcomes {
            match outcome {
                Ok(processed) => result.successful.push(processed),
                Err(error) => {
                    warn!(index, error = %error, "batch item failed");
                    result.failed.push(BatchFailure { index, error });
                }
            }
        }

        info!(
            succeeded = result.successful.len(),
            failed = result.failed.len(),
            "batch complete"
        );
        debug_assert!(result.is_complete(total));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ProcessOptions::default();
        assert!((opts.confidence_threshold - 0.7).abs() < 1e-6);
        assert!(!opts.dry_run);
        assert!(opts.save_result);
        assert!(opts.use_ai);
    }

    #[test]
    fn test_options_reject_bad_threshold() {
        let opts = ProcessOptions {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(CardScanError::InvalidInput(_))
        ));

        let opts = ProcessOptions {
            confidence_threshold: -0.1,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_step_labels_are_distinct() {
        let labels = [
            steps::INPUT_VALIDATION,
            steps::PREPROCESS,
            steps::OCR,
            steps::SECURITY,
            steps::LOCAL_EXTRACTION,
            steps::AI_PARSING,
            steps::ARBITRATION,
            steps::VALIDATION,
            steps::DRY_RUN,
            steps::PERSISTENCE,
            steps::CLEANUP,
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
