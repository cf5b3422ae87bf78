//! Classifier API Client
//!
//! HTTP client for the external session classification service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Classification, Classifier, ClassifierFailure, ClassifyOutcome, ClientSetupError};
use crate::logic::policy::{confidence_from_raw, LabelPolicy};
use crate::logic::window::{truncate_chars, PreviewEntry, MAX_PREVIEW};

/// Error bodies are cut to this many characters before logging
const ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Log request and response payloads at debug level
    pub debug: bool,
}

pub struct HttpClassifier {
    config: HttpClassifierConfig,
    endpoint: reqwest::Url,
    policy: LabelPolicy,
    http_client: reqwest::Client,
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    session: &'a [PreviewEntry],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    classification: Option<String>,
    confidence: Option<serde_json::Value>,
    raw_response: Option<String>,
}

impl HttpClassifier {
    /// Fails on an endpoint that is not an absolute http(s) URL.
    pub fn new(config: HttpClassifierConfig, policy: LabelPolicy) -> Result<Self, ClientSetupError> {
        let endpoint = parse_endpoint(&config.endpoint)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            endpoint,
            policy,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn request(&self, preview: &[PreviewEntry]) -> Result<Classification, ClassifierFailure> {
        if preview.is_empty() {
            return Err(ClassifierFailure::EmptyPreview);
        }
        let session = &preview[..preview.len().min(MAX_PREVIEW)];

        if self.config.debug {
            tracing::debug!(
                endpoint = %self.endpoint,
                request = %serde_json::to_string(&session[0]).unwrap_or_default(),
                "classifier request"
            );
        }

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&ClassifyRequest { session })
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierFailure::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, ERROR_BODY_CHARS).to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(transport_failure)?;
        let data: ClassifyResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ClassifierFailure::InvalidResponse(e.to_string()))?;

        let classification = Classification {
            label: self
                .policy
                .label_from_classification(data.classification.as_deref()),
            confidence: confidence_from_raw(
                data.confidence.as_ref().and_then(serde_json::Value::as_str),
            ),
            classification: data.classification,
            raw_response: data.raw_response,
        };

        if self.config.debug {
            tracing::debug!(
                classification = ?classification.classification,
                label = %classification.label,
                confidence = classification.confidence.as_str(),
                "classifier response"
            );
        }

        Ok(classification)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, preview: &[PreviewEntry]) -> ClassifyOutcome {
        match self.request(preview).await {
            Ok(classification) => ClassifyOutcome::Success(classification),
            Err(failure) => {
                if self.config.debug {
                    tracing::debug!(error = %failure, "classifier error");
                }
                failure.into()
            }
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<reqwest::Url, ClientSetupError> {
    let invalid = |reason: String| ClientSetupError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = reqwest::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn transport_failure(err: reqwest::Error) -> ClassifierFailure {
    if err.is_timeout() {
        ClassifierFailure::Timeout
    } else if err.is_builder() {
        ClassifierFailure::Request(err.to_string())
    } else {
        ClassifierFailure::Connection(err.to_string())
    }
}
