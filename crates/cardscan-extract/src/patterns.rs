//! Regex families and lookup tables for card field extraction.
//!
//! Mobile and landline are deliberately disjoint families: mobile numbers
//! carry a leading `09xx` prefix (Taiwan numbering), landlines an area code
//! that may be parenthesized. Both accept spaces/hyphens as separators and
//! an international `+` prefix.

use once_cell::sync::Lazy;
use regex::Regex;

/// Mobile numbers: optional `+886` country prefix, then `09xx`.
pub static MOBILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?886[-\s]?)?09\d{2}[-\s]?\d{3}[-\s]?\d{3}\b").unwrap()
});

/// Landline numbers: optional country prefix, area code (optionally
/// parenthesized), then a 7-8 digit local part.
pub static LANDLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[-\s]?)?\(?0\d{1,2}\)?[-\s]?\d{3,4}[-\s]?\d{4}\b").unwrap()
});

/// RFC-like email addresses. When a line carries several, the first wins.
pub static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Websites: scheme- or `www.`-prefixed URLs, or bare domains on a known
/// TLD list. Email matches are excluded by the caller.
pub static WEBSITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:https?://|www\.)[^\s]+|\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|net|org|io|co|tw|dev|ai|tech|info|biz)\b",
    )
    .unwrap()
});

/// Leading address markers, stripped before the value is kept.
pub static ADDRESS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:address|addr\.?|地址|住址)[\s:：]*").unwrap());

/// Organizational suffix tokens marking a company line.
pub static ORG_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)股份有限公司|有限公司|公司|集團|企業|商行|\b(?:corp(?:oration)?|inc|ltd|llc|gmbh|company|co)\b\.?|\bgroup\b",
    )
    .unwrap()
});

/// Job-title keywords for residual-line classification.
pub static TITLE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)工程師|經理|總監|設計師|顧問|主任|專員|副理|協理|執行長|董事長|\b(?:engineer|manager|director|designer|consultant|officer|specialist|lead|architect|analyst|developer|ceo|cto|cfo|coo|founder|president|vp)\b",
    )
    .unwrap()
});

/// Street/unit tokens for keyword-less address detection.
pub static ADDRESS_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)路|街|巷|弄|段|號|樓|室|\b(?:road|rd|street|st|avenue|ave|blvd|boulevard|floor|fl|suite|ste|lane|ln|section|sec)\b",
    )
    .unwrap()
});

/// Short CJK token, the shape of an East Asian personal name.
pub static CJK_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Han}{2,4}$").unwrap());

/// Two- or three-token capitalized Latin name.
pub static LATIN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]+(?:\s+[A-Z]\.?)?(?:\s+[A-Z][a-z]+){1,2}$").unwrap());

/// Common CJK surnames used to boost name-line confidence.
const CJK_SURNAMES: &str = "王李張劉陳楊黃趙吳周徐孫馬朱胡郭何高林鄭謝羅梁宋唐許韓馮鄧曹彭曾蕭田董潘袁蔡蔣余杜葉程蘇魏呂丁任沈姚盧姜崔鍾譚陸汪范金石廖賈夏韋方白鄒孟熊秦邱江尹薛段雷侯龍陶黎賀顧毛郝邵萬錢嚴戴莫孔向湯";

/// Whether a line looks like a CJK personal name with a recognized surname.
pub fn is_cjk_name(line: &str) -> bool {
    if !CJK_NAME.is_match(line) {
        return false;
    }
    line.chars()
        .next()
        .is_some_and(|first| CJK_SURNAMES.contains(first))
}

/// Whether a line looks like a capitalized Latin personal name.
pub fn is_latin_name(line: &str) -> bool {
    LATIN_NAME.is_match(line)
}
