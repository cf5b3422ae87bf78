//! Raw WAF record model
//!
//! Records are written by the log collector. The sessionizer only reads them
//! and fills in `session_id` once.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool};

/// `[tag "attack-sqli"]` fragments inside ModSecurity message strings
static RE_MESSAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[tag "([^"]*)"\]"#).expect("valid tag regex"));

/// Accepted textual timestamp layouts, tried in order after RFC 3339
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z", // PostgreSQL timestamptz::text
    "%d/%b/%Y:%H:%M:%S %z",    // Apache access / audit log
];

/// One request record as seen by the WAF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub timestamp: String,
    pub remote_host: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub request_body: Option<String>,
    pub matched_rules: Vec<MatchedRule>,
    pub audit_summary: AuditSummary,
    pub session_id: Option<i64>,
}

/// A rule hit reported by the WAF for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub tags: Vec<String>,
    pub message: Option<String>,
}

/// Enforcement outcome of a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub intercepted: bool,
    pub disruptive: bool,
    pub response_status: Option<i32>,
}

#[derive(Debug, FromRow)]
struct RawRecordRow {
    id: i64,
    timestamp: Option<String>,
    remote_host: Option<String>,
    user_agent: Option<String>,
    method: Option<String>,
    uri: Option<String>,
    request_body: Option<String>,
    matched_rules: Option<Value>,
    audit_summary: Option<Value>,
    session_id: Option<i64>,
}

impl From<RawRecordRow> for RawRecord {
    fn from(row: RawRecordRow) -> Self {
        let matched_rules = match row.matched_rules {
            Some(Value::Array(items)) => items.iter().map(MatchedRule::from_value).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![MatchedRule::from_value(&other)],
        };

        Self {
            id: row.id,
            timestamp: row.timestamp.unwrap_or_default(),
            remote_host: row.remote_host,
            user_agent: row.user_agent,
            method: row.method,
            uri: row.uri,
            request_body: row.request_body,
            matched_rules,
            audit_summary: row
                .audit_summary
                .as_ref()
                .map(AuditSummary::from_value)
                .unwrap_or_default(),
            session_id: row.session_id,
        }
    }
}

impl RawRecord {
    /// Parsed request time, or `None` when the stored value is unusable.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Fetch up to `limit` unlinked records with `id > after_id`, ascending.
    pub async fn fetch_unlinked(
        pool: &PgPool,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RawRecordRow>(
            r#"
            SELECT id, timestamp::text AS timestamp, remote_host, user_agent, method, uri,
                   request_body, matched_rules, audit_summary, session_id
            FROM raw_logs
            WHERE session_id IS NULL AND id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(RawRecord::from).collect())
    }

    /// Point every record in `ids` at `session_pk`.
    ///
    /// Records already owned by a different session are left alone.
    pub async fn link_to_session(
        conn: &mut PgConnection,
        session_pk: i64,
        ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE raw_logs
            SET session_id = $1
            WHERE id = ANY($2) AND (session_id IS NULL OR session_id = $1)
            "#,
        )
        .bind(session_pk)
        .bind(ids)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}

impl MatchedRule {
    /// Decode one `matched_rules` entry.
    ///
    /// The collector has stored these as objects (`tags` / `TAGS` / `tag`)
    /// and as plain ModSecurity message strings; both are accepted.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => Self {
                tags: tags_from_message(message),
                message: Some(message.clone()),
            },
            Value::Object(map) => {
                let message = ["message", "msg"]
                    .iter()
                    .find_map(|k| map.get(*k))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                let mut tags: Vec<String> = ["tags", "TAGS", "tag"]
                    .iter()
                    .find_map(|k| map.get(*k))
                    .map(tags_from_value)
                    .unwrap_or_default();

                if tags.is_empty() {
                    if let Some(ref m) = message {
                        tags = tags_from_message(m);
                    }
                }

                Self { tags, message }
            }
            _ => Self::default(),
        }
    }
}

impl AuditSummary {
    /// Decode the `audit_summary` column.
    ///
    /// Accepts a flat object, the nested `action` / `intervention` layout of
    /// the audit log, and the collector's `intercepted=true | status=403`
    /// string form.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let flag = |v: Option<&Value>| v.and_then(Value::as_bool).unwrap_or(false);

                let intercepted = flag(map.get("intercepted"))
                    || flag(map.get("action").and_then(|a| a.get("intercepted")));
                let disruptive = flag(map.get("disruptive"))
                    || flag(map.get("intervention").and_then(|i| i.get("disruptive")));
                let response_status = ["response_status", "status"]
                    .iter()
                    .find_map(|k| map.get(*k))
                    .and_then(Value::as_i64)
                    .and_then(|s| i32::try_from(s).ok());

                Self {
                    intercepted,
                    disruptive,
                    response_status,
                }
            }
            Value::String(text) => Self::from_summary_line(text),
            _ => Self::default(),
        }
    }

    fn from_summary_line(text: &str) -> Self {
        let mut summary = Self::default();
        for part in text.split('|') {
            let Some((key, val)) = part.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "intercepted" => summary.intercepted = val.trim().eq_ignore_ascii_case("true"),
                "disruptive" => summary.disruptive = val.trim().eq_ignore_ascii_case("true"),
                "status" => summary.response_status = val.trim().parse().ok(),
                _ => {}
            }
        }
        summary
    }
}

fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(tag) => vec![tag.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn tags_from_message(message: &str) -> Vec<String> {
    RE_MESSAGE_TAG
        .captures_iter(message)
        .map(|c| c[1].to_string())
        .collect()
}

/// Parse a record timestamp in any of the layouts the collector produces.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    // Naive values are stored in UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
