//! Default security screen for recognized text.
//!
//! Two classes of findings:
//! - active injection attempts (script tags, javascript URLs) reject the
//!   text outright with `SecurityViolation`;
//! - passive markup and control-character floods are stripped, with a
//!   finding recorded per strip.
//!
//! Stripping is idempotent: screening already-screened text yields the
//! same text and no findings.

use once_cell::sync::Lazy;
use regex::Regex;

use cardscan_core::{CardScanError, ContentValidator, Result, Screened};

/// Payload shapes treated as an active injection attempt.
static INJECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*script\b|javascript\s*:|data\s*:\s*text/html|vbscript\s*:").unwrap()
});

/// Inline event handlers, e.g. `onerror=`, also count as active.
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=\s*[\x22']").unwrap());

/// Residual markup that is stripped rather than rejected.
static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]{0,200}>").unwrap());

/// More control characters than this in the raw text counts as a flood.
const CONTROL_FLOOD_THRESHOLD: usize = 16;

/// Rule-based `ContentValidator` over the recognized text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentValidator;

impl DefaultContentValidator {
    pub fn new() -> Self {
        Self
    }
}

impl ContentValidator for DefaultContentValidator {
    fn validate_content(&self, text: &str) -> Result<Screened> {
        if let Some(m) = INJECTION.find(text) {
            return Err(CardScanError::SecurityViolation(format!(
                "active injection payload: {:?}",
                m.as_str()
            )));
        }
        if EVENT_HANDLER.is_match(text) {
            return Err(CardScanError::SecurityViolation(
                "inline event handler in recognized text".to_string(),
            ));
        }

        let mut findings = Vec::new();
        let mut clean = text.to_string();

        if MARKUP.is_match(&clean) {
            // Stripping can expose a new tag (`<<x>>`), so run to fixpoint
            while MARKUP.is_match(&clean) {
                clean = MARKUP.replace_all(&clean, "").to_string();
            }
            findings.push("markup stripped from recognized text".to_string());
        }

        let control_count = clean
            .chars()
            .filter(|c| c.is_control() && *c != '\n' && *c != '\t')
            .count();
        if control_count > CONTROL_FLOOD_THRESHOLD {
            clean.retain(|c| !c.is_control() || c == '\n' || c == '\t');
            findings.push(format!(
                "control character flood stripped ({control_count} characters)"
            ));
        }

        Ok(Screened {
            clean_text: clean,
            findings,
        })
    }
}
