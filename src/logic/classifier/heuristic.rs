//! Local fallback heuristic, used when the classifier rejects a request for good.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SessionLabel;

static RE_SQLI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)('|%27|--|\bunion\b|\bselect\b|\bdrop\b|\binsert\b|\border by\b)")
        .expect("valid sqli regex")
});

static RE_XSS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(<script|onerror=|onload=|<img|<iframe|javascript:)").expect("valid xss regex")
});

/// SQL-injection patterns win over script patterns; no match is NORMAL.
pub fn heuristic_label<'a>(texts: impl IntoIterator<Item = &'a str>) -> SessionLabel {
    let text = texts.into_iter().collect::<Vec<_>>().join(" ");

    if RE_SQLI.is_match(&text) {
        SessionLabel::SqlInjection
    } else if RE_XSS.is_match(&text) {
        SessionLabel::CodeInjection
    } else {
        SessionLabel::Normal
    }
}
