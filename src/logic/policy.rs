//! Label Policy
//!
//! Every mapping that turns signals or classifier output into a
//! `SessionLabel` lives here.
//!
//! The category tie-break order and the "unrecognized means malicious" bias
//! are product decisions still awaiting confirmation. Both are carried as
//! configurable defaults instead of being baked into the call sites.

use std::collections::BTreeSet;

use super::signals::AttackCategory;
use crate::models::{Confidence, SessionLabel};

/// Default tie-break: SQLi beats path traversal beats code injection.
pub const DEFAULT_CATEGORY_PRIORITY: [AttackCategory; 3] =
    [AttackCategory::Sqli, AttackCategory::Path, AttackCategory::Code];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    /// Highest priority first
    pub category_priority: Vec<AttackCategory>,
    /// Label for a blocked session whose rule hits carry no known category
    pub blocked_fallback: SessionLabel,
    /// Label for classifier output that matches no known label
    pub unrecognized: SessionLabel,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            category_priority: DEFAULT_CATEGORY_PRIORITY.to_vec(),
            blocked_fallback: SessionLabel::Malicious,
            unrecognized: SessionLabel::Malicious,
        }
    }
}

impl LabelPolicy {
    /// Highest-priority category present in `tags`.
    ///
    /// Categories missing from the configured priority list rank after all
    /// listed ones, in their natural order.
    pub fn top_category(&self, tags: &BTreeSet<AttackCategory>) -> Option<AttackCategory> {
        self.category_priority
            .iter()
            .find(|c| tags.contains(c))
            .copied()
            .or_else(|| tags.iter().next().copied())
    }

    /// Normalize the classifier's free-form label.
    pub fn label_from_classification(&self, raw: Option<&str>) -> SessionLabel {
        let s = raw.unwrap_or_default().trim().to_lowercase();

        if s.contains("sql") {
            SessionLabel::SqlInjection
        } else if s.contains("code") {
            SessionLabel::CodeInjection
        } else if s.contains("path") || s.contains("traversal") {
            SessionLabel::PathTraversal
        } else if s.contains("normal") || s.contains("benign") {
            SessionLabel::Normal
        } else {
            self.unrecognized
        }
    }
}

/// Only an explicit "high" counts as high confidence.
pub fn confidence_from_raw(raw: Option<&str>) -> Confidence {
    match raw.map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "high" => Confidence::High,
        _ => Confidence::Low,
    }
}

/// Parse a comma-separated priority list such as `sqli,path,code`.
///
/// Duplicates are dropped; an unknown name is an error.
pub fn parse_category_priority(raw: &str) -> Result<Vec<AttackCategory>, String> {
    let mut out: Vec<AttackCategory> = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let category: AttackCategory = part.parse()?;
        if !out.contains(&category) {
            out.push(category);
        }
    }

    if out.is_empty() {
        return Err("category priority list is empty".to_string());
    }
    Ok(out)
}
