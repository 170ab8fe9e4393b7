//! Confidence arbitration between the local and AI candidates.

use chrono::Utc;

use cardscan_core::{clamp_confidence, CandidateSource, ParsedCandidate};

/// Reconcile the local candidate with an optional AI candidate.
///
/// Per-field policy: a non-empty AI value wins, the local value fills any
/// gap the AI left. Provenance of the merge:
/// - `Hybrid` when at least one populated field came from local while the
///   AI supplied at least one itself;
/// - `Ai` when the AI supplied every populated field;
/// - `Local` when the AI was absent or contributed nothing.
///
/// Final confidence is the AI-reported confidence (clamped); with no AI
/// contribution the local confidence stands. An OCR confidence below the
/// threshold attaches a warning but never changes the winner.
pub fn arbitrate(
    local: ParsedCandidate,
    ai: Option<ParsedCandidate>,
    ocr_confidence: f32,
    confidence_threshold: f32,
) -> (ParsedCandidate, Vec<String>) {
    let mut warnings = Vec::new();
    if ocr_confidence < confidence_threshold {
        warnings.push(format!("OCR confidence low: {ocr_confidence:.2}"));
    }

    let Some(ai) = ai else {
        return (local, warnings);
    };

    let mut filled_from_local = false;
    let mut filled_from_ai = false;

    let mut merge = |ai_value: Option<String>, local_value: Option<String>| -> Option<String> {
        match ai_value.filter(|v| !v.trim().is_empty()) {
            Some(v) => {
                filled_from_ai = true;
                Some(v)
            }
            None => {
                if local_value.is_some() {
                    filled_from_local = true;
                }
                local_value
            }
        }
    };

    let mut merged = ParsedCandidate::empty(CandidateSource::Ai);
    merged.name = merge(ai.name, local.name);
    merged.company = merge(ai.company, local.company);
    merged.job_title = merge(ai.job_title, local.job_title);
    merged.email = merge(ai.email, local.email);
    merged.phone = merge(ai.phone, local.phone);
    merged.mobile = merge(ai.mobile, local.mobile);
    merged.address = merge(ai.address, local.address);
    merged.website = merge(ai.website, local.website);
    merged.notes = merge(ai.notes, local.notes);

    merged.source = match (filled_from_ai, filled_from_local) {
        (true, true) => CandidateSource::Hybrid,
        (true, false) => CandidateSource::Ai,
        (false, _) => CandidateSource::Local,
    };
    merged.confidence = if filled_from_ai || !filled_from_local {
        clamp_confidence(ai.confidence)
    } else {
        local.confidence
    };
    merged.parsed_at = Utc::now();

    (merged, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> ParsedCandidate {
        let mut c = ParsedCandidate::empty(CandidateSource::Local).with_confidence(0.6);
        c.name = Some("王小明".to_string());
        c.phone = Some("02-2345-6789".to_string());
        c
    }

    fn ai() -> ParsedCandidate {
        let mut c = ParsedCandidate::empty(CandidateSource::Ai).with_confidence(0.9);
        c.name = Some("王小明".to_string());
        c.company = Some("科技創新股份有限公司".to_string());
        c
    }

    #[test]
    fn test_no_ai_returns_local_unchanged() {
        let base = local();
        let (result, warnings) = arbitrate(base.clone(), None, 0.9, 0.7);
        assert_eq!(result, base);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_merge_marks_hybrid() {
        let (result, _) = arbitrate(local(), Some(ai()), 0.9, 0.7);

        // company from AI, phone filled from local
        assert_eq!(result.source, CandidateSource::Hybrid);
        assert_eq!(result.company.as_deref(), Some("科技創新股份有限公司"));
        assert_eq!(result.phone.as_deref(), Some("02-2345-6789"));
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_pure_ai_when_ai_supplies_everything() {
        let mut empty_local = ParsedCandidate::empty(CandidateSource::Local);
        empty_local.confidence = 0.0;

        let (result, _) = arbitrate(empty_local, Some(ai()), 0.9, 0.7);
        assert_eq!(result.source, CandidateSource::Ai);
    }

    #[test]
    fn test_empty_ai_contribution_stays_local() {
        let ai_empty = ParsedCandidate::empty(CandidateSource::Ai).with_confidence(0.3);
        let (result, _) = arbitrate(local(), Some(ai_empty), 0.9, 0.7);

        assert_eq!(result.source, CandidateSource::Local);
        assert_eq!(result.name.as_deref(), Some("王小明"));
        assert!((result.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_ai_blank_strings_do_not_win() {
        let mut ai_blank = ai();
        ai_blank.name = Some("  ".to_string());

        let (result, _) = arbitrate(local(), Some(ai_blank), 0.9, 0.7);
        assert_eq!(result.name.as_deref(), Some("王小明"));
    }

    #[test]
    fn test_low_ocr_confidence_warns_without_changing_winner() {
        let (result, warnings) = arbitrate(local(), None, 0.45, 0.7);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("OCR confidence low:"));
        assert_eq!(result.source, CandidateSource::Local);
    }

    #[test]
    fn test_threshold_boundary_does_not_warn() {
        let (_, warnings) = arbitrate(local(), None, 0.7, 0.7);
        assert!(warnings.is_empty());
    }
}
