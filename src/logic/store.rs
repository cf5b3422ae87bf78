//! Record Source & Session Store
//!
//! Storage seams of the pipeline. PostgreSQL is the production backend; the
//! traits let the windower run against in-memory stores in tests.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::models::{RawRecord, Session};

/// Batched read of records that have no session yet.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Up to `limit` unlinked records with `id > after_id`, ascending by id.
    async fn fetch_unlinked(&self, after_id: i64, limit: i64) -> StoreResult<Vec<RawRecord>>;
}

/// Transactional session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One open transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    /// Insert or update by `session_id`, returning the row key.
    async fn upsert_session(&mut self, session: &Session) -> StoreResult<i64>;

    /// Set the session foreign key on every record in `record_ids`.
    async fn link_records(&mut self, session_pk: i64, record_ids: &[i64]) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Upsert `session` and link `record_ids` to it as one unit.
///
/// Either both writes are committed or neither is.
pub async fn commit_session(
    store: &dyn SessionStore,
    session: &Session,
    record_ids: &[i64],
) -> StoreResult<i64> {
    let mut tx = store.begin().await?;

    match write_session(tx.as_mut(), session, record_ids).await {
        Ok(session_pk) => {
            tx.commit().await?;
            Ok(session_pk)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %rollback_err,
                    "Rollback failed"
                );
            }
            Err(err)
        }
    }
}

async fn write_session(
    tx: &mut dyn StoreTx,
    session: &Session,
    record_ids: &[i64],
) -> StoreResult<i64> {
    let session_pk = tx.upsert_session(session).await?;
    let linked = tx.link_records(session_pk, record_ids).await?;

    if linked < record_ids.len() as u64 {
        tracing::warn!(
            session_id = %session.session_id,
            expected = record_ids.len(),
            linked,
            "Some records were already owned by another session"
        );
    }

    Ok(session_pk)
}

// ============================================================================
// POSTGRESQL
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PgStore {
    async fn fetch_unlinked(&self, after_id: i64, limit: i64) -> StoreResult<Vec<RawRecord>> {
        Ok(RawRecord::fetch_unlinked(&self.pool, after_id, limit).await?)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn upsert_session(&mut self, session: &Session) -> StoreResult<i64> {
        Ok(Session::upsert(&mut self.tx, session).await?)
    }

    async fn link_records(&mut self, session_pk: i64, record_ids: &[i64]) -> StoreResult<u64> {
        Ok(RawRecord::link_to_session(&mut self.tx, session_pk, record_ids).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgStoreTx { tx } = *self;
        Ok(tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgStoreTx { tx } = *self;
        Ok(tx.rollback().await?)
    }
}
