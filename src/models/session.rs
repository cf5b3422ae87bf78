//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::fmt;
use std::str::FromStr;

/// Final verdict attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionLabel {
    Normal,
    SqlInjection,
    CodeInjection,
    PathTraversal,
    Malicious,
}

impl SessionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLabel::Normal => "NORMAL",
            SessionLabel::SqlInjection => "SQL_INJECTION",
            SessionLabel::CodeInjection => "CODE_INJECTION",
            SessionLabel::PathTraversal => "PATH_TRAVERSAL",
            SessionLabel::Malicious => "MALICIOUS",
        }
    }
}

impl fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(SessionLabel::Normal),
            "SQL_INJECTION" => Ok(SessionLabel::SqlInjection),
            "CODE_INJECTION" => Ok(SessionLabel::CodeInjection),
            "PATH_TRAVERSAL" => Ok(SessionLabel::PathTraversal),
            "MALICIOUS" => Ok(SessionLabel::Malicious),
            other => Err(format!("unknown session label: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Low => "LOW",
        }
    }
}

/// A finalized session, ready to be upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Deterministic identifier: `<host>|<agent group>|<start>`
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub label: SessionLabel,
    pub confidence: Option<Confidence>,
    pub classifier_raw: Option<String>,
    pub classification: Option<String>,
}

impl Session {
    /// Insert the session or refresh the verdict of an existing one.
    ///
    /// Returns the primary key used as the `raw_logs.session_id` value.
    pub async fn upsert(conn: &mut PgConnection, session: &Session) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sessions (session_id, ip_address, user_agent, start_time, end_time,
                                  label, confidence, classifier_raw, classification)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (session_id) DO UPDATE SET
                end_time = GREATEST(sessions.end_time, EXCLUDED.end_time),
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                label = EXCLUDED.label,
                confidence = EXCLUDED.confidence,
                classifier_raw = EXCLUDED.classifier_raw,
                classification = EXCLUDED.classification,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.label.as_str())
        .bind(session.confidence.map(|c| c.as_str()))
        .bind(&session.classifier_raw)
        .bind(&session.classification)
        .fetch_one(conn)
        .await
    }
}
