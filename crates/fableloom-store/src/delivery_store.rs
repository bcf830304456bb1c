//! `PostgreSQL` implementation of the delivery ledger store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use fableloom_core::clock::{Clock, SystemClock};
use fableloom_core::error::CoreError;
use fableloom_delivery::ledger::{run_acquire, run_mark_failed, run_mark_shown};
use fableloom_delivery::record::DeliveryRecord;
use fableloom_delivery::store::{AcquireResult, DeliveryStore, DeliveryTxn};

use crate::row::delivery_from_row;
use crate::store_err;

const SELECT_RECORD: &str = "
SELECT id, session_id, step, kind, state, content_hash, fail_count,
       pending_since, next_retry_at, message_ref, updated_at
FROM delivery_events
";

/// `PostgreSQL`-backed delivery ledger. One transaction per operation; the
/// record row lock serializes concurrent acquires for the same unit.
#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgDeliveryStore {
    /// Creates a store over the given pool with the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a store with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn begin(&self) -> Result<PgDeliveryTxn, CoreError> {
        let txn = self.pool.begin().await.map_err(store_err)?;
        Ok(PgDeliveryTxn { txn })
    }
}

async fn finish<T>(pg: PgDeliveryTxn, result: Result<T, CoreError>) -> Result<T, CoreError> {
    match result {
        Ok(value) => {
            pg.txn.commit().await.map_err(store_err)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = pg.txn.rollback().await {
                tracing::warn!(error = %rollback_err, "delivery ledger rollback failed");
            }
            Err(err)
        }
    }
}

struct PgDeliveryTxn {
    txn: Transaction<'static, Postgres>,
}

#[async_trait]
impl DeliveryTxn for PgDeliveryTxn {
    async fn lock_record(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        let sql = format!("{SELECT_RECORD} WHERE session_id = $1 AND step = $2 AND kind = $3 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(step)
            .bind(kind)
            .fetch_optional(&mut *self.txn)
            .await
            .map_err(store_err)?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn lock_record_by_id(
        &mut self,
        record_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        let sql = format!("{SELECT_RECORD} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(record_id)
            .fetch_optional(&mut *self.txn)
            .await
            .map_err(store_err)?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn insert_pending(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, CoreError> {
        // A row lock cannot cover an absent row, so a concurrent first
        // acquire can race to this insert; the unique constraint turns the
        // loser into a retriable error.
        let row = sqlx::query(
            "INSERT INTO delivery_events
                 (id, session_id, step, kind, state, content_hash, fail_count,
                  pending_since, updated_at)
             VALUES ($1, $2, $3, $4, 'PENDING', $5, 0, $6, $6)
             ON CONFLICT (session_id, step, kind) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(step)
        .bind(kind)
        .bind(content_hash)
        .bind(now)
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(store_err)?;
        match row {
            Some(row) => sqlx::Row::try_get(&row, "id").map_err(store_err),
            None => Err(CoreError::StoreUnavailable(
                "delivery row claimed concurrently".to_owned(),
            )),
        }
    }

    async fn store_failure(
        &mut self,
        record_id: Uuid,
        fail_count: i32,
        next_retry_at: DateTime<Utc>,
        content_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE delivery_events
             SET state = 'FAILED', fail_count = $2, next_retry_at = $3,
                 pending_since = NULL, content_hash = COALESCE($4, content_hash),
                 updated_at = $5
             WHERE id = $1",
        )
        .bind(record_id)
        .bind(fail_count)
        .bind(next_retry_at)
        .bind(content_hash)
        .bind(now)
        .execute(&mut *self.txn)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn restore_pending(
        &mut self,
        record_id: Uuid,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE delivery_events
             SET state = 'PENDING', content_hash = $2, pending_since = $3,
                 next_retry_at = NULL, updated_at = $3
             WHERE id = $1",
        )
        .bind(record_id)
        .bind(content_hash)
        .bind(now)
        .execute(&mut *self.txn)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn store_shown(
        &mut self,
        record_id: Uuid,
        message_ref: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE delivery_events
             SET state = 'SHOWN', message_ref = $2, pending_since = NULL,
                 next_retry_at = NULL, updated_at = $3
             WHERE id = $1",
        )
        .bind(record_id)
        .bind(message_ref)
        .bind(now)
        .execute(&mut *self.txn)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn acquire(
        &self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
    ) -> Result<AcquireResult, CoreError> {
        let now = self.clock.now();
        let mut pg = self.begin().await?;
        let result = run_acquire(&mut pg, now, session_id, step, kind, content_hash).await;
        finish(pg, result).await
    }

    async fn mark_shown(&self, record_id: Uuid, message_ref: Option<i64>) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut pg = self.begin().await?;
        let result = run_mark_shown(&mut pg, now, record_id, message_ref).await;
        finish(pg, result).await
    }

    async fn mark_failed(&self, record_id: Uuid) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut pg = self.begin().await?;
        let result = run_mark_failed(&mut pg, now, record_id).await;
        finish(pg, result).await
    }
}
