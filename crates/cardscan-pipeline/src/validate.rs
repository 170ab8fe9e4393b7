//! Field validation and sanitization.
//!
//! Format problems never abort a run: the offending field degrades to
//! `None` and a warning is recorded. Only the security screen can reject
//! a candidate outright.

use once_cell::sync::Lazy;
use regex::Regex;

use cardscan_core::{CardScanError, ContentValidator, ParsedCandidate, Result};

pub const NAME_MAX_CHARS: usize = 100;
pub const NOTES_MAX_CHARS: usize = 1000;

static EMAIL_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

static PHONE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+()\d\-\s]{7,24}$").unwrap());

static WEBSITE_EXACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://|www\.)[^\s]+$|^[a-z0-9-]+(?:\.[a-z0-9-]+)+$").unwrap()
});

fn valid_phone(value: &str) -> bool {
    PHONE_CHARS.is_match(value) && value.chars().filter(char::is_ascii_digit).count() >= 7
}

/// Validate and sanitize an arbitrated candidate.
///
/// Returns the cleaned candidate plus the warnings produced. The only
/// error path is a `SecurityViolation` surfaced by the content screen.
pub fn validate_candidate(
    mut candidate: ParsedCandidate,
    security: &dyn ContentValidator,
) -> Result<(ParsedCandidate, Vec<String>)> {
    let mut warnings = Vec::new();

    // Format checks degrade, never abort
    if let Some(email) = &candidate.email {
        if !EMAIL_EXACT.is_match(email) {
            warnings.push("email format invalid".to_string());
            candidate.email = None;
        }
    }
    if let Some(phone) = &candidate.phone {
        if !valid_phone(phone) {
            warnings.push("phone format invalid".to_string());
            candidate.phone = None;
        }
    }
    if let Some(mobile) = &candidate.mobile {
        if !valid_phone(mobile) {
            warnings.push("mobile format invalid".to_string());
            candidate.mobile = None;
        }
    }
    if let Some(website) = &candidate.website {
        if !WEBSITE_EXACT.is_match(website) {
            warnings.push("website format invalid".to_string());
            candidate.website = None;
        }
    }

    // Length caps truncate, never abort
    if let Some(name) = &candidate.name {
        if name.chars().count() > NAME_MAX_CHARS {
            candidate.name = Some(name.chars().take(NAME_MAX_CHARS).collect());
            warnings.push(format!("name truncated to {NAME_MAX_CHARS} characters"));
        }
    }
    if let Some(notes) = &candidate.notes {
        if notes.chars().count() > NOTES_MAX_CHARS {
            candidate.notes = Some(notes.chars().take(NOTES_MAX_CHARS).collect());
            warnings.push(format!("notes truncated to {NOTES_MAX_CHARS} characters"));
        }
    }

    // Security screen per text field; raw OCR text was screened earlier,
    // so a field-level rejection here degrades instead of aborting
    for (label, field) in [
        ("name", &mut candidate.name),
        ("company", &mut candidate.company),
        ("job title", &mut candidate.job_title),
        ("address", &mut candidate.address),
        ("notes", &mut candidate.notes),
    ] {
        let Some(value) = field.as_deref() else {
            continue;
        };
        match security.validate_content(value) {
            Ok(screened) => {
                if !screened.findings.is_empty() {
                    warnings.push(format!("suspicious content removed from {label}"));
                    let cleaned = screened.clean_text.trim().to_string();
                    *field = (!cleaned.is_empty()).then_some(cleaned);
                }
            }
            Err(CardScanError::SecurityViolation(_)) => {
                warnings.push(format!("suspicious content removed from {label}"));
                *field = None;
            }
            Err(other) => return Err(other),
        }
    }

    Ok((candidate, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DefaultContentValidator;
    use cardscan_core::CandidateSource;

    fn candidate() -> ParsedCandidate {
        let mut c = ParsedCandidate::empty(CandidateSource::Local);
        c.name = Some("Jane Doe".to_string());
        c
    }

    #[test]
    fn test_invalid_email_degrades_with_warning() {
        let mut c = candidate();
        c.email = Some("not-an-email".to_string());

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert!(clean.email.is_none());
        assert!(warnings.contains(&"email format invalid".to_string()));
        // other fields untouched
        assert_eq!(clean.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_invalid_phone_and_mobile_degrade() {
        let mut c = candidate();
        c.phone = Some("call me".to_string());
        c.mobile = Some("12345".to_string()); // too few digits

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert!(clean.phone.is_none());
        assert!(clean.mobile.is_none());
        assert!(warnings.contains(&"phone format invalid".to_string()));
        assert!(warnings.contains(&"mobile format invalid".to_string()));
    }

    #[test]
    fn test_valid_contact_fields_survive() {
        let mut c = candidate();
        c.email = Some("jane@acme.com".to_string());
        c.phone = Some("02-2345-6789".to_string());
        c.mobile = Some("0912-345-678".to_string());
        c.website = Some("www.acme.com".to_string());

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert!(warnings.is_empty());
        assert!(clean.email.is_some());
        assert!(clean.phone.is_some());
        assert!(clean.mobile.is_some());
        assert!(clean.website.is_some());
    }

    #[test]
    fn test_name_truncated_at_cap() {
        let mut c = candidate();
        c.name = Some("x".repeat(150));

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert_eq!(clean.name.as_deref().unwrap().chars().count(), 100);
        assert!(warnings.iter().any(|w| w.contains("name truncated")));
    }

    #[test]
    fn test_notes_truncated_at_cap() {
        let mut c = candidate();
        c.notes = Some("n".repeat(2000));

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert_eq!(clean.notes.as_deref().unwrap().chars().count(), 1000);
        assert!(warnings.iter().any(|w| w.contains("notes truncated")));
    }

    #[test]
    fn test_field_level_markup_is_stripped() {
        let mut c = candidate();
        c.company = Some("Acme <b>Corp</b>".to_string());

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert_eq!(clean.company.as_deref(), Some("Acme Corp"));
        assert!(warnings
            .iter()
            .any(|w| w.contains("suspicious content removed from company")));
    }

    #[test]
    fn test_field_level_injection_degrades_not_aborts() {
        let mut c = candidate();
        c.notes = Some("<script>alert(1)</script>".to_string());

        let (clean, warnings) = validate_candidate(c, &DefaultContentValidator::new()).unwrap();
        assert!(clean.notes.is_none());
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut c = candidate();
        c.email = Some("bad email".to_string());
        c.company = Some("Acme <b>Corp</b>".to_string());
        c.name = Some("x".repeat(150));

        let security = DefaultContentValidator::new();
        let (once, _) = validate_candidate(c, &security).unwrap();
        let (twice, warnings) = validate_candidate(once.clone(), &security).unwrap();
        assert_eq!(once, twice);
        assert!(warnings.is_empty());
    }
}
