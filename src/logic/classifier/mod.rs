//! Session Classifier
//!
//! This module handles:
//! - The call to the external classification service
//! - Sorting its failures into retryable and permanent
//! - The local heuristic used after a permanent failure

pub mod client;
pub mod heuristic;

pub use client::{HttpClassifier, HttpClassifierConfig};
pub use heuristic::heuristic_label;

use async_trait::async_trait;
use thiserror::Error;

use super::window::PreviewEntry;
use crate::models::{Confidence, SessionLabel};

/// Normalized answer from the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: SessionLabel,
    pub confidence: Confidence,
    /// Label string exactly as returned
    pub classification: Option<String>,
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierFailure {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Session has no requests to classify")]
    EmptyPreview,
}

impl ClassifierFailure {
    /// Failures that say nothing about the session itself: transport
    /// problems, a request that could not be built, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifierFailure::Timeout
            | ClassifierFailure::Connection(_)
            | ClassifierFailure::Request(_) => true,
            ClassifierFailure::Status { status, .. } => *status == 429 || *status >= 500,
            ClassifierFailure::InvalidResponse(_) | ClassifierFailure::EmptyPreview => false,
        }
    }
}

/// Why a classifier client could not be built.
#[derive(Debug, Error)]
pub enum ClientSetupError {
    #[error("Invalid classifier endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result of one classification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Success(Classification),
    /// Leave the session unlabeled; a later run asks again
    Retryable(ClassifierFailure),
    /// Asking again will not help; fall back to the heuristic
    Permanent(ClassifierFailure),
}

impl From<ClassifierFailure> for ClassifyOutcome {
    fn from(failure: ClassifierFailure) -> Self {
        if failure.is_retryable() {
            ClassifyOutcome::Retryable(failure)
        } else {
            ClassifyOutcome::Permanent(failure)
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, preview: &[PreviewEntry]) -> ClassifyOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClassifierFailure {
        ClassifierFailure::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_failures() {
        assert!(ClassifierFailure::Timeout.is_retryable());
        assert!(ClassifierFailure::Connection("refused".into()).is_retryable());
        assert!(ClassifierFailure::Request("builder error".into()).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_permanent_failures() {
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(422).is_retryable());
        assert!(!ClassifierFailure::InvalidResponse("eof".into()).is_retryable());
        assert!(!ClassifierFailure::EmptyPreview.is_retryable());
    }

    #[test]
    fn test_outcome_from_failure() {
        assert!(matches!(ClassifyOutcome::from(status(502)), ClassifyOutcome::Retryable(_)));
        assert!(matches!(ClassifyOutcome::from(status(401)), ClassifyOutcome::Permanent(_)));
        assert!(matches!(
            ClassifyOutcome::from(ClassifierFailure::Request("relative URL without a base".into())),
            ClassifyOutcome::Retryable(_)
        ));
    }
}
