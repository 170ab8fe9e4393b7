//! Cardscan OCR - Recognition engine adapters
//!
//! The OCR engine is a black box to the pipeline: bytes in, raw text plus a
//! confidence out. This crate provides a Tesseract subprocess adapter and a
//! manager that dispatches to the first available engine.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

use cardscan_core::{CardScanError, OcrEngine, OcrOptions, OcrResult, Result};

// ============================================================================
// Image format sniffing
// ============================================================================

/// Image formats the adapters accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// File extension used when handing the buffer to a subprocess
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
        }
    }
}

/// Sniff the format from the buffer's magic bytes.
pub fn sniff_format(image: &[u8]) -> Result<ImageFormat> {
    if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        Ok(ImageFormat::Png)
    } else if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Ok(ImageFormat::Jpeg)
    } else if image.starts_with(b"II*\x00") || image.starts_with(b"MM\x00*") {
        Ok(ImageFormat::Tiff)
    } else if image.starts_with(b"BM") {
        Ok(ImageFormat::Bmp)
    } else {
        let head: Vec<u8> = image.iter().take(4).copied().collect();
        Err(CardScanError::UnsupportedImageFormat(format!(
            "unknown magic bytes {head:02x?}"
        )))
    }
}

// ============================================================================
// Tesseract engine
// ============================================================================

/// Tesseract subprocess configuration.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Page segmentation mode (PSM)
    pub psm: Option<u8>,
    /// OCR engine mode (OEM)
    pub oem: Option<u8>,
    /// Path to the tesseract executable
    pub executable_path: Option<String>,
    /// Additional tesseract arguments
    pub extra_args: Vec<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            // PSM 6: assume a single uniform block of text, the usual
            // shape of a business card
            psm: Some(6),
            oem: None,
            executable_path: None,
            extra_args: Vec::new(),
        }
    }
}

impl TesseractConfig {
    /// Set page segmentation mode
    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = Some(psm);
        self
    }

    /// Set OCR engine mode
    pub fn with_oem(mut self, oem: u8) -> Self {
        self.oem = Some(oem);
        self
    }

    /// Set executable path
    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Tesseract OCR engine adapter.
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &str {
        self.config
            .executable_path
            .as_deref()
            .unwrap_or("tesseract")
    }

    fn build_args(&self, image_path: &PathBuf, options: &OcrOptions) -> Vec<String> {
        let mut args = vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            options.language.clone(),
        ];

        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }

        args.extend(self.config.extra_args.clone());
        args
    }

    /// Confidence estimate for plain-text output. Tesseract only reports
    /// per-word confidence through hOCR/TSV, which this adapter does not
    /// request; an empty read is a failed read.
    fn estimate_confidence(&self, text: &str) -> f32 {
        if text.trim().is_empty() {
            0.0
        } else {
            0.9
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &[u8], options: &OcrOptions) -> Result<OcrResult> {
        if image.is_empty() {
            return Err(CardScanError::InvalidInput("empty image buffer".to_string()));
        }
        let format = sniff_format(image)?;

        if let Some(hints) = &options.preprocess {
            tracing::debug!(?hints, "preprocessing hints forwarded to tesseract");
        }

        // The subprocess interface is file-based; the buffer gets staged in
        // a per-call temp file and removed afterwards
        let image_path = std::env::temp_dir().join(format!(
            "cardscan-{}.{}",
            uuid::Uuid::new_v4(),
            format.extension()
        ));
        tokio::fs::write(&image_path, image)
            .await
            .map_err(|e| CardScanError::ServiceUnavailable {
                service: "tesseract".to_string(),
                reason: format!("failed to stage image: {e}"),
            })?;

        let started = Instant::now();
        let args = self.build_args(&image_path, options);
        let output = tokio::process::Command::new(self.executable())
            .args(&args)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&image_path).await;

        let output = output.map_err(|e| CardScanError::ServiceUnavailable {
            service: "tesseract".to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CardScanError::ServiceUnavailable {
                service: "tesseract".to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let confidence = self.estimate_confidence(&text);

        Ok(OcrResult::new(text, self.id())
            .with_confidence(confidence)
            .with_processing_time_ms(started.elapsed().as_millis() as u64))
    }

    fn id(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

// ============================================================================
// OCR Manager
// ============================================================================

/// Registry over several engines; recognition goes to the first available.
#[derive(Default)]
pub struct OcrManager {
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl OcrManager {
    /// Empty manager; engines are registered explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager pre-loaded with Tesseract when it is installed
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        let tesseract = TesseractEngine::new();
        if OcrEngine::is_available(&tesseract) {
            manager.register(Arc::new(tesseract));
        }
        manager
    }

    /// Register an engine
    pub fn register(&mut self, engine: Arc<dyn OcrEngine>) {
        self.engines.push(engine);
    }

    /// Identifiers of all registered engines
    pub fn engine_ids(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[async_trait::async_trait]
impl OcrEngine for OcrManager {
    /// Try engines in registration order; an unavailable engine hands the
    /// request to the next one. Availability probes would block the async
    /// runtime, so the failing call itself is the probe.
    async fn recognize(&self, image: &[u8], options: &OcrOptions) -> Result<OcrResult> {
        let mut last_unavailable = None;
        for engine in &self.engines {
            tracing::debug!(engine = engine.id(), "dispatching recognition");
            match engine.recognize(image, options).await {
                Err(err @ CardScanError::ServiceUnavailable { .. }) => {
                    last_unavailable = Some(err);
                }
                other => return other,
            }
        }

        Err(last_unavailable.unwrap_or_else(|| CardScanError::ServiceUnavailable {
            service: "ocr".to_string(),
            reason: "no OCR engine available".to_string(),
        }))
    }

    fn id(&self) -> &str {
        "ocr-manager"
    }

    fn is_available(&self) -> bool {
        self.engines.iter().any(|e| e.is_available())
    }
}

// ============================================================================
// Tests
// ============================================================================
