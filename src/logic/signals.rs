//! Attack Signal Extraction
//!
//! Per-record signals folded into a session accumulator: whether the WAF
//! blocked the request, and which attack categories its rule hits point at.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::models::{RawRecord, SessionLabel};

/// Coarse attack family derived from rule tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackCategory {
    Sqli,
    Path,
    Code,
}

impl AttackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackCategory::Sqli => "sqli",
            AttackCategory::Path => "path",
            AttackCategory::Code => "code",
        }
    }

    pub fn label(&self) -> SessionLabel {
        match self {
            AttackCategory::Sqli => SessionLabel::SqlInjection,
            AttackCategory::Path => SessionLabel::PathTraversal,
            AttackCategory::Code => SessionLabel::CodeInjection,
        }
    }
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqli" | "sql" => Ok(AttackCategory::Sqli),
            "path" | "traversal" | "lfi" => Ok(AttackCategory::Path),
            "code" | "xss" | "rce" => Ok(AttackCategory::Code),
            other => Err(format!("unknown attack category: {other}")),
        }
    }
}

/// Signals extracted from a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub disruptive: bool,
    pub tags: BTreeSet<AttackCategory>,
}

/// Map one rule tag to every category it mentions.
///
/// `"attack-sqli"` → Sqli, `"attack-xss"` → Code, `"attack-lfi"` → Path.
pub fn tag_categories(tag: &str) -> Vec<AttackCategory> {
    let tag = tag.to_lowercase();
    let mut out = Vec::new();

    if tag.contains("sql") {
        out.push(AttackCategory::Sqli);
    }
    if tag.contains("xss") || tag.contains("rce") || tag.contains("code") {
        out.push(AttackCategory::Code);
    }
    if tag.contains("path") || tag.contains("traversal") || tag.contains("lfi") {
        out.push(AttackCategory::Path);
    }

    out
}

pub fn extract_signals(record: &RawRecord) -> Signals {
    let audit = &record.audit_summary;

    let tags = record
        .matched_rules
        .iter()
        .flat_map(|rule| rule.tags.iter())
        .flat_map(|tag| tag_categories(tag))
        .collect();

    Signals {
        disruptive: audit.intercepted || audit.disruptive,
        tags,
    }
}
