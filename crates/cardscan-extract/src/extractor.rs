//! Line-oriented heuristic extractor.
//!
//! Classification is ordered: regex families consume lines first
//! (phone/mobile, email, website), then company and address keywords, and
//! the residual lines are assigned positionally (first leftover line is the
//! name, a short leftover line the job title). Later heuristics only see
//! lines the earlier ones left unclaimed.

use cardscan_core::{clamp_confidence, CandidateSource, ParsedCandidate};

use crate::patterns;

/// Saturation point for the text-length confidence bonus, in characters.
const LENGTH_SATURATION: usize = 120;

/// Residual lines at most this many characters long may become a job title.
const TITLE_MAX_CHARS: usize = 24;

/// Rule-based extractor over normalized card text. Stateless and cheap to
/// clone; compiled patterns are shared process-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExtractor;

impl LocalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a candidate from normalized text.
    ///
    /// Never fails: empty input yields an all-empty candidate with
    /// confidence 0.0 and `source = Local`.
    pub fn extract(&self, normalized: &str) -> ParsedCandidate {
        let mut candidate = ParsedCandidate::empty(CandidateSource::Local);

        let lines: Vec<&str> = normalized
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return candidate;
        }

        let mut claimed = vec![false; lines.len()];
        let mut name_boost = false;

        // Pattern-anchored fields claim their lines first
        for (i, line) in lines.iter().enumerate() {
            let mut matched = false;

            if candidate.email.is_none() {
                if let Some(m) = patterns::EMAIL.find(line) {
                    candidate.email = Some(m.as_str().to_string());
                    matched = true;
                }
            }

            // Websites never claim a line the email already did; a bare
            // domain inside an address would also be a false claim
            if !matched && candidate.website.is_none() {
                if let Some(m) = patterns::WEBSITE.find(line) {
                    let preceded_by_at = line[..m.start()].ends_with('@');
                    if !preceded_by_at && !patterns::EMAIL.is_match(line) {
                        candidate.website = Some(m.as_str().to_string());
                        matched = true;
                    }
                }
            }

            let mut residue = (*line).to_string();
            if candidate.mobile.is_none() {
                if let Some(m) = patterns::MOBILE.find(&residue) {
                    candidate.mobile = Some(m.as_str().to_string());
                    residue.replace_range(m.range(), " ");
                    matched = true;
                }
            }
            if candidate.phone.is_none() {
                if let Some(m) = patterns::LANDLINE.find(&residue) {
                    candidate.phone = Some(m.as_str().to_string());
                    matched = true;
                }
            }

            if matched {
                claimed[i] = true;
            }
        }

        // Keyword-anchored fields
        for (i, line) in lines.iter().enumerate() {
            if claimed[i] {
                continue;
            }

            if candidate.address.is_none() && patterns::ADDRESS_LABEL.is_match(line) {
                let value = patterns::ADDRESS_LABEL.replace(line, "").trim().to_string();
                if !value.is_empty() {
                    candidate.address = Some(value);
                    claimed[i] = true;
                    continue;
                }
            }

            if candidate.company.is_none() && patterns::ORG_SUFFIX.is_match(line) {
                candidate.company = Some((*line).to_string());
                claimed[i] = true;
            }
        }

        // Address fallback: longest unclaimed line carrying digit + unit tokens
        if candidate.address.is_none() {
            let best = lines
                .iter()
                .enumerate()
                .filter(|(i, line)| {
                    !claimed[*i]
                        && line.chars().any(|c| c.is_ascii_digit())
                        && patterns::ADDRESS_UNIT.is_match(line)
                })
                .max_by_key(|(_, line)| line.chars().count());
            if let Some((i, line)) = best {
                candidate.address = Some((*line).to_string());
                claimed[i] = true;
            }
        }

        // First residual line is the name candidate
        if let Some((i, line)) = lines.iter().enumerate().find(|(i, _)| !claimed[*i]) {
            candidate.name = Some((*line).to_string());
            name_boost = patterns::is_cjk_name(line) || patterns::is_latin_name(line);
            claimed[i] = true;
        }

        // A short residual line, or one carrying a title keyword, is the title
        if let Some((i, line)) = lines.iter().enumerate().find(|(i, line)| {
            !claimed[*i]
                && (patterns::TITLE_KEYWORD.is_match(line)
                    || line.chars().count() <= TITLE_MAX_CHARS)
        }) {
            candidate.job_title = Some((*line).to_string());
            claimed[i] = true;
        }

        candidate.confidence = score(&candidate, normalized, name_boost);
        candidate
    }
}

/// Confidence over a candidate: grows with recognized fields and text
/// length (saturating), shrinks with the suspicious-character ratio.
fn score(candidate: &ParsedCandidate, text: &str, name_boost: bool) -> f32 {
    let mut confidence = 0.0f32;

    // Contact fields verify against strict patterns, so they weigh more
    // than the positionally assigned identity fields
    if candidate.email.is_some() {
        confidence += 0.14;
    }
    if candidate.phone.is_some() {
        confidence += 0.14;
    }
    if candidate.mobile.is_some() {
        confidence += 0.14;
    }
    if candidate.name.is_some() {
        confidence += 0.10;
        if name_boost {
            confidence += 0.05;
        }
    }
    if candidate.company.is_some() {
        confidence += 0.10;
    }
    if candidate.job_title.is_some() {
        confidence += 0.10;
    }
    if candidate.address.is_some() {
        confidence += 0.10;
    }
    if candidate.website.is_some() {
        confidence += 0.10;
    }

    let char_count = text.chars().count();
    confidence += (char_count.min(LENGTH_SATURATION) as f32 / LENGTH_SATURATION as f32) * 0.10;

    confidence -= 0.5 * suspicious_ratio(text);

    clamp_confidence(confidence)
}

/// Fraction of characters outside the alphabet expected on a card:
/// alphanumerics (any script), whitespace, and common contact punctuation.
fn suspicious_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }

    let suspicious = text
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && !"@.,:;/+-()#&'_：、，。".contains(*c)
        })
        .count();

    suspicious as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TAIWAN_CARD: &str = "王小明\n資深軟體工程師\n科技創新股份有限公司\n電話: 02-2345-6789\n手機: 0912-345-678\nEmail: xiaoming.wang@techcorp.com";

    #[test]
    fn test_taiwan_card_fields() {
        let candidate = LocalExtractor::new().extract(TAIWAN_CARD);

        assert_eq!(candidate.name.as_deref(), Some("王小明"));
        assert!(candidate.phone.as_deref().unwrap().contains("02-2345-6789"));
        assert!(candidate.mobile.as_deref().unwrap().contains("0912-345-678"));
        assert_eq!(
            candidate.email.as_deref(),
            Some("xiaoming.wang@techcorp.com")
        );
        assert!(candidate.company.as_deref().unwrap().contains("股份有限公司"));
        assert_eq!(candidate.job_title.as_deref(), Some("資深軟體工程師"));
        assert!(candidate.confidence > 0.7, "got {}", candidate.confidence);
        assert_eq!(candidate.source, CandidateSource::Local);
    }

    #[test]
    fn test_empty_input() {
        let candidate = LocalExtractor::new().extract("");
        assert!(candidate.is_empty());
        assert_eq!(candidate.confidence, 0.0);
        assert_eq!(candidate.source, CandidateSource::Local);
    }

    #[test]
    fn test_tiny_input_scores_low() {
        let candidate = LocalExtractor::new().extract("ab");
        assert!(candidate.confidence < 0.5, "got {}", candidate.confidence);
    }

    #[test]
    fn test_full_latin_card() {
        let text = "Jane Doe\nSenior Engineer\nAcme Corp.\nTel: (02) 2345-6789\nMobile: 0912-345-678\njane.doe@acme.com\nwww.acme.com\nAddress: 7 Main Street, Floor 4";
        let candidate = LocalExtractor::new().extract(text);

        assert_eq!(candidate.name.as_deref(), Some("Jane Doe"));
        assert_eq!(candidate.job_title.as_deref(), Some("Senior Engineer"));
        assert_eq!(candidate.company.as_deref(), Some("Acme Corp."));
        assert!(candidate.phone.is_some());
        assert!(candidate.mobile.is_some());
        assert_eq!(candidate.email.as_deref(), Some("jane.doe@acme.com"));
        assert_eq!(candidate.website.as_deref(), Some("www.acme.com"));
        assert_eq!(
            candidate.address.as_deref(),
            Some("7 Main Street, Floor 4")
        );
        assert!(candidate.confidence > 0.7, "got {}", candidate.confidence);
    }

    #[test]
    fn test_first_number_per_category_wins() {
        let text = "Tel: 02-2345-6789 / 03-4567-8901";
        let candidate = LocalExtractor::new().extract(text);
        assert_eq!(candidate.phone.as_deref(), Some("02-2345-6789"));
    }

    #[test]
    fn test_mixed_numbers_on_one_line() {
        let text = "Tel: 02-2345-6789 手機 0912-345-678";
        let candidate = LocalExtractor::new().extract(text);
        assert_eq!(candidate.phone.as_deref(), Some("02-2345-6789"));
        assert_eq!(candidate.mobile.as_deref(), Some("0912-345-678"));
    }

    #[test]
    fn test_website_not_taken_from_email() {
        let candidate = LocalExtractor::new().extract("jane@acme.com");
        assert_eq!(candidate.email.as_deref(), Some("jane@acme.com"));
        assert!(candidate.website.is_none());
    }

    #[test]
    fn test_address_fallback_without_keyword() {
        let text = "王小明\n台北市信義區信義路五段7號12樓";
        let candidate = LocalExtractor::new().extract(text);
        assert_eq!(
            candidate.address.as_deref(),
            Some("台北市信義區信義路五段7號12樓")
        );
        assert_eq!(candidate.name.as_deref(), Some("王小明"));
    }

    #[test]
    fn test_more_fields_score_higher() {
        let extractor = LocalExtractor::new();
        let sparse = extractor.extract("王小明");
        let dense = extractor.extract(TAIWAN_CARD);
        assert!(dense.confidence > sparse.confidence);
    }

    #[test]
    fn test_noise_scores_lower_than_clean() {
        let extractor = LocalExtractor::new();
        let clean = extractor.extract("Jane Doe\njane@acme.com");
        let noisy = extractor.extract("Jane Doe !!!???***%%%$$$\njane@acme.com !!!***");
        assert!(clean.confidence > noisy.confidence);
    }

    proptest! {
        #[test]
        fn prop_confidence_in_unit_interval(text in ".{0,300}") {
            let candidate = LocalExtractor::new().extract(&text);
            prop_assert!((0.0..=1.0).contains(&candidate.confidence));
            prop_assert_eq!(candidate.source, CandidateSource::Local);
        }

        #[test]
        fn prop_empty_means_zero(ws in "[ \t\n]{0,40}") {
            let candidate = LocalExtractor::new().extract(&ws);
            prop_assert!(candidate.is_empty());
            prop_assert_eq!(candidate.confidence, 0.0);
        }
    }
}
