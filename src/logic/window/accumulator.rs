//! Session Accumulator
//!
//! In-memory state of one open session, keyed by `(remote host, agent group)`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::logic::agent::agent_group;
use crate::logic::signals::{extract_signals, AttackCategory};
use crate::models::RawRecord;

pub const MAX_PATHS: usize = 100;
pub const MAX_SAMPLES: usize = 50;
pub const MAX_PREVIEW: usize = 3;
pub const MAX_METHODS: usize = 20;

/// Body prefix kept in a sample snippet
pub const SNIPPET_BODY_CHARS: usize = 200;
/// Body prefix sent to the classifier
pub const PREVIEW_BODY_CHARS: usize = 300;
/// User-agent prefix sent to the classifier
pub const PREVIEW_UA_CHARS: usize = 120;

const MISSING_HOST: &str = "NA";

/// Client identity a session is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub remote_host: Option<String>,
    pub agent_group: String,
}

impl SessionKey {
    pub fn for_record(record: &RawRecord) -> Self {
        Self {
            remote_host: record.remote_host.clone(),
            agent_group: agent_group(record.user_agent.as_deref()),
        }
    }

    pub fn host_label(&self) -> &str {
        self.remote_host.as_deref().unwrap_or(MISSING_HOST)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.host_label(), self.agent_group)
    }
}

/// One request as sent to the external classifier.
///
/// Field names follow the classifier service's request schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewEntry {
    #[serde(rename = "request_http_method")]
    pub method: String,
    #[serde(rename = "request_http_request")]
    pub path: String,
    #[serde(rename = "request_body")]
    pub body: String,
    pub user_agent: String,
}

/// Diagnostic snapshot of a session, stored with guard verdicts.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub count: u64,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub samples: Vec<String>,
    #[serde(rename = "blockedCount")]
    pub blocked_count: u64,
    #[serde(rename = "attackTags")]
    pub attack_tags: Vec<AttackCategory>,
}

#[derive(Debug, Clone)]
pub struct Accumulator {
    pub key: SessionKey,
    /// User agent of the first record
    pub user_agent: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u64,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub samples: Vec<String>,
    pub preview: Vec<PreviewEntry>,
    pub record_ids: Vec<i64>,
    pub blocked_count: u64,
    pub attack_tags: BTreeSet<AttackCategory>,
}

impl Accumulator {
    /// Empty accumulator seeded at `at`. Call [`Accumulator::merge`] next.
    pub fn new(key: SessionKey, record: &RawRecord, at: DateTime<Utc>) -> Self {
        Self {
            key,
            user_agent: record.user_agent.clone().filter(|ua| !ua.is_empty()),
            start: at,
            end: at,
            last_seen: at,
            count: 0,
            paths: Vec::new(),
            methods: Vec::new(),
            samples: Vec::new(),
            preview: Vec::new(),
            record_ids: Vec::new(),
            blocked_count: 0,
            attack_tags: BTreeSet::new(),
        }
    }

    pub fn merge(&mut self, record: &RawRecord, at: DateTime<Utc>) {
        // Records arrive by id, so a timestamp can lag slightly behind
        self.start = self.start.min(at);
        self.end = self.end.max(at);
        self.last_seen = self.last_seen.max(at);
        self.count += 1;

        if let Some(uri) = record.uri.as_deref().filter(|u| !u.is_empty()) {
            push_unique(&mut self.paths, uri, MAX_PATHS);
        }
        if let Some(method) = record.method.as_deref().filter(|m| !m.is_empty()) {
            push_unique(&mut self.methods, method, MAX_METHODS);
        }

        let snippet = format!(
            "{} {} {}",
            record.method.as_deref().unwrap_or_default(),
            record.uri.as_deref().unwrap_or_default(),
            truncate_chars(record.request_body.as_deref().unwrap_or_default(), SNIPPET_BODY_CHARS),
        );
        let snippet = snippet.trim();
        if !snippet.is_empty() {
            push_unique(&mut self.samples, snippet, MAX_SAMPLES);
        }

        self.record_ids.push(record.id);

        if self.preview.len() < MAX_PREVIEW {
            self.preview.push(PreviewEntry {
                method: record
                    .method
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "GET".to_string()),
                path: record.uri.clone().unwrap_or_default(),
                body: truncate_chars(
                    record.request_body.as_deref().unwrap_or_default(),
                    PREVIEW_BODY_CHARS,
                )
                .to_string(),
                user_agent: truncate_chars(
                    self.user_agent.as_deref().unwrap_or_default(),
                    PREVIEW_UA_CHARS,
                )
                .to_string(),
            });
        }

        let signals = extract_signals(record);
        if signals.disruptive {
            self.blocked_count += 1;
        }
        self.attack_tags.extend(signals.tags);
    }

    /// No record for this key can still extend the session once `now` is a
    /// full window past `last_seen`.
    pub fn is_idle(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_seen >= window
    }

    /// `<host>|<agent group>|<start>` with a millisecond UTC start time.
    pub fn session_id(&self) -> String {
        format!(
            "{}|{}",
            self.key,
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    /// Paths followed by samples, the text the local heuristic scans.
    pub fn heuristic_corpus(&self) -> impl Iterator<Item = &str> {
        self.paths
            .iter()
            .chain(self.samples.iter())
            .map(String::as_str)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            ip: self.key.remote_host.clone(),
            user_agent: self.user_agent.clone(),
            start_time: self.start,
            end_time: self.end,
            count: self.count,
            paths: self.paths.clone(),
            methods: self.methods.clone(),
            samples: self.samples.clone(),
            blocked_count: self.blocked_count,
            attack_tags: self.attack_tags.iter().copied().collect(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str, cap: usize) {
    if list.len() < cap && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Prefix of at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
