//! Any-Hit Guard
//!
//! Settles a session from WAF signals alone when rule hits or blocks already
//! say what it is, so the external classifier is only asked about sessions
//! the WAF had nothing to say about.

use super::policy::LabelPolicy;
use super::window::Accumulator;
use crate::models::{Confidence, SessionLabel};

/// `classification` value stored for guard verdicts
pub const GUARD_CLASSIFICATION: &str = "guard:auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardVerdict {
    pub label: SessionLabel,
    pub confidence: Confidence,
}

#[derive(Debug, Clone)]
pub struct GuardPolicy {
    enabled: bool,
    policy: LabelPolicy,
}

impl GuardPolicy {
    pub fn new(enabled: bool, policy: LabelPolicy) -> Self {
        Self { enabled, policy }
    }

    pub fn decide(&self, acc: &Accumulator) -> Option<GuardVerdict> {
        if !self.enabled {
            return None;
        }

        let tagged = self.policy.top_category(&acc.attack_tags).map(|c| c.label());

        let label = if acc.blocked_count > 0 {
            Some(tagged.unwrap_or(self.policy.blocked_fallback))
        } else {
            tagged
        }?;

        Some(GuardVerdict {
            label,
            confidence: Confidence::High,
        })
    }
}
