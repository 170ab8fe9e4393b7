//! Cardscan Extract - Local heuristic field extraction
//!
//! Turns normalized business-card text into a `ParsedCandidate` using
//! line-oriented pattern matching, with no external calls:
//! - Text normalization (control stripping, whitespace collapsing)
//! - Regex families for phone/mobile/email/website
//! - Positional heuristics for name, company, title, and address
//! - A monotonic confidence score over the recognized fields

pub mod extractor;
pub mod normalize;
pub mod patterns;

pub use extractor::LocalExtractor;
pub use normalize::normalize;
