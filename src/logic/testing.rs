//! Test doubles: in-memory storage and a scripted classifier.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::classifier::{Classification, Classifier, ClassifierFailure, ClassifyOutcome};
use super::store::{RecordSource, SessionStore, StoreTx};
use super::window::PreviewEntry;
use crate::error::{StoreError, StoreResult};
use crate::models::{AuditSummary, Confidence, RawRecord, Session, SessionLabel};

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

/// Plain GET from `host`, `minute` minutes after [`base_time`].
pub fn record_at(id: i64, host: &str, minute: i64) -> RawRecord {
    RawRecord {
        id,
        timestamp: (base_time() + Duration::minutes(minute)).to_rfc3339(),
        remote_host: Some(host.to_string()),
        user_agent: Some(CHROME_UA.to_string()),
        method: Some("GET".into()),
        uri: Some(format!("/page/{id}")),
        request_body: None,
        matched_rules: vec![],
        audit_summary: AuditSummary::default(),
        session_id: None,
    }
}

pub fn success(label: SessionLabel, raw: &str) -> ClassifyOutcome {
    ClassifyOutcome::Success(Classification {
        label,
        confidence: Confidence::High,
        classification: Some(raw.to_string()),
        raw_response: Some(format!("model said {raw}")),
    })
}

pub fn http_status(status: u16) -> ClassifyOutcome {
    ClassifierFailure::Status {
        status,
        body: String::new(),
    }
    .into()
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryDb {
    sessions: BTreeMap<String, (i64, Session)>,
    records: BTreeMap<i64, RawRecord>,
    next_pk: i64,
}

/// Snapshot-isolated store: a transaction works on a copy and swaps it in on commit.
#[derive(Default)]
pub struct MemoryStore {
    db: Arc<Mutex<MemoryDb>>,
    fail_link: Arc<Mutex<Option<StoreError>>>,
    fail_fetch: AtomicBool,
    rollbacks: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert_record(record);
        }
        store
    }

    pub fn insert_record(&self, record: RawRecord) {
        self.db.lock().records.insert(record.id, record);
    }

    pub fn record(&self, id: i64) -> Option<RawRecord> {
        self.db.lock().records.get(&id).cloned()
    }

    /// Sessions ordered by their string id.
    pub fn sessions(&self) -> Vec<Session> {
        self.db.lock().sessions.values().map(|(_, s)| s.clone()).collect()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.db.lock().sessions.get(session_id).map(|(_, s)| s.clone())
    }

    /// Record ids linked to `session_id`, ascending.
    pub fn linked_ids(&self, session_id: &str) -> Vec<i64> {
        let db = self.db.lock();
        let Some((pk, _)) = db.sessions.get(session_id) else {
            return Vec::new();
        };
        db.records
            .values()
            .filter(|r| r.session_id == Some(*pk))
            .map(|r| r.id)
            .collect()
    }

    pub fn unlinked_count(&self) -> usize {
        self.db.lock().records.values().filter(|r| r.session_id.is_none()).count()
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// The next `link_records` call fails with a statement error.
    pub fn fail_next_link(&self) {
        *self.fail_link.lock() = Some(StoreError::Database("injected link failure".into()));
    }

    /// The next `link_records` call fails as if the database went away.
    pub fn fail_next_link_fatal(&self) {
        *self.fail_link.lock() = Some(StoreError::Unavailable("injected outage".into()));
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordSource for MemoryStore {
    async fn fetch_unlinked(&self, after_id: i64, limit: i64) -> StoreResult<Vec<RawRecord>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fetch failure".into()));
        }

        let db = self.db.lock();
        Ok(db
            .records
            .range(after_id + 1..)
            .map(|(_, r)| r)
            .filter(|r| r.session_id.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let snapshot = self.db.lock().clone();
        Ok(Box::new(MemoryTx {
            db: Arc::clone(&self.db),
            snapshot,
            fail_link: Arc::clone(&self.fail_link),
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

struct MemoryTx {
    db: Arc<Mutex<MemoryDb>>,
    snapshot: MemoryDb,
    fail_link: Arc<Mutex<Option<StoreError>>>,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn upsert_session(&mut self, session: &Session) -> StoreResult<i64> {
        let db = &mut self.snapshot;
        if let Some((pk, existing)) = db.sessions.get_mut(&session.session_id) {
            existing.end_time = existing.end_time.max(session.end_time);
            existing.ip_address = session.ip_address.clone();
            existing.user_agent = session.user_agent.clone();
            existing.label = session.label;
            existing.confidence = session.confidence;
            existing.classifier_raw = session.classifier_raw.clone();
            existing.classification = session.classification.clone();
            return Ok(*pk);
        }

        db.next_pk += 1;
        let pk = db.next_pk;
        db.sessions.insert(session.session_id.clone(), (pk, session.clone()));
        Ok(pk)
    }

    async fn link_records(&mut self, session_pk: i64, record_ids: &[i64]) -> StoreResult<u64> {
        if let Some(err) = self.fail_link.lock().take() {
            return Err(err);
        }

        let mut linked = 0;
        for id in record_ids {
            if let Some(record) = self.snapshot.records.get_mut(id) {
                if record.session_id.is_none() || record.session_id == Some(session_pk) {
                    record.session_id = Some(session_pk);
                    linked += 1;
                }
            }
        }
        Ok(linked)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { db, snapshot, .. } = *self;
        *db.lock() = snapshot;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// SCRIPTED CLASSIFIER
// ============================================================================

/// Replays queued outcomes in order, then repeats the fallback forever.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<ClassifyOutcome>>,
    fallback: ClassifyOutcome,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<PreviewEntry>>>,
}

impl ScriptedClassifier {
    pub fn always(outcome: ClassifyOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next call with `outcome` before falling back.
    pub fn queue(self, outcome: ClassifyOutcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<PreviewEntry>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, preview: &[PreviewEntry]) -> ClassifyOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(preview.to_vec());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
