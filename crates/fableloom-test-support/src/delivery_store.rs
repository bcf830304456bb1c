//! In-memory `DeliveryStore` that drives the real ledger state machine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use fableloom_core::clock::Clock;
use fableloom_core::error::CoreError;
use fableloom_delivery::ledger::{run_acquire, run_mark_failed, run_mark_shown};
use fableloom_delivery::record::{DeliveryRecord, DeliveryState};
use fableloom_delivery::store::{AcquireResult, DeliveryStore, DeliveryTxn};

type LedgerKey = (Uuid, i32, String);

#[derive(Debug, Clone, Default)]
struct MemLedger {
    records: HashMap<LedgerKey, DeliveryRecord>,
}

struct MemDeliveryTxn<'a> {
    ledger: &'a mut MemLedger,
}

impl MemDeliveryTxn<'_> {
    fn record_mut(&mut self, record_id: Uuid) -> Result<&mut DeliveryRecord, CoreError> {
        self.ledger
            .records
            .values_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| CoreError::StoreUnavailable("no such delivery record".to_owned()))
    }
}

#[async_trait]
impl DeliveryTxn for MemDeliveryTxn<'_> {
    async fn lock_record(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        Ok(self
            .ledger
            .records
            .get(&(session_id, step, kind.to_owned()))
            .cloned())
    }

    async fn lock_record_by_id(
        &mut self,
        record_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        Ok(self
            .ledger
            .records
            .values()
            .find(|r| r.id == record_id)
            .cloned())
    }

    async fn insert_pending(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, CoreError> {
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            session_id,
            step,
            kind: kind.to_owned(),
            state: DeliveryState::Pending,
            content_hash: content_hash.to_owned(),
            fail_count: 0,
            pending_since: Some(now),
            next_retry_at: None,
            message_ref: None,
            updated_at: now,
        };
        let id = record.id;
        self.ledger
            .records
            .insert((session_id, step, kind.to_owned()), record);
        Ok(id)
    }

    async fn store_failure(
        &mut self,
        record_id: Uuid,
        fail_count: i32,
        next_retry_at: DateTime<Utc>,
        content_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let record = self.record_mut(record_id)?;
        record.state = DeliveryState::Failed;
        record.fail_count = fail_count;
        record.next_retry_at = Some(next_retry_at);
        record.pending_since = None;
        if let Some(hash) = content_hash {
            record.content_hash = hash.to_owned();
        }
        record.updated_at = now;
        Ok(())
    }

    async fn restore_pending(
        &mut self,
        record_id: Uuid,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let record = self.record_mut(record_id)?;
        record.state = DeliveryState::Pending;
        record.content_hash = content_hash.to_owned();
        record.pending_since = Some(now);
        record.next_retry_at = None;
        record.updated_at = now;
        Ok(())
    }

    async fn store_shown(
        &mut self,
        record_id: Uuid,
        message_ref: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let record = self.record_mut(record_id)?;
        record.state = DeliveryState::Shown;
        record.message_ref = message_ref;
        record.pending_since = None;
        record.next_retry_at = None;
        record.updated_at = now;
        Ok(())
    }
}

/// In-memory delivery ledger for state machine tests.
#[derive(Clone)]
pub struct InMemoryDeliveryStore {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<MemLedger>>,
}

impl InMemoryDeliveryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(MemLedger::default())),
        }
    }

    /// The current row for (session, step, kind), if any.
    pub async fn record(&self, session_id: Uuid, step: i32, kind: &str) -> Option<DeliveryRecord> {
        let ledger = self.inner.lock().await;
        ledger.records.get(&(session_id, step, kind.to_owned())).cloned()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn acquire(
        &self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
    ) -> Result<AcquireResult, CoreError> {
        let mut ledger = self.inner.lock().await;
        let mut scratch = ledger.clone();
        let mut txn = MemDeliveryTxn {
            ledger: &mut scratch,
        };
        let result = run_acquire(
            &mut txn,
            self.clock.now(),
            session_id,
            step,
            kind,
            content_hash,
        )
        .await?;
        *ledger = scratch;
        Ok(result)
    }

    async fn mark_shown(&self, record_id: Uuid, message_ref: Option<i64>) -> Result<(), CoreError> {
        let mut ledger = self.inner.lock().await;
        let mut scratch = ledger.clone();
        let mut txn = MemDeliveryTxn {
            ledger: &mut scratch,
        };
        run_mark_shown(&mut txn, self.clock.now(), record_id, message_ref).await?;
        *ledger = scratch;
        Ok(())
    }

    async fn mark_failed(&self, record_id: Uuid) -> Result<(), CoreError> {
        let mut ledger = self.inner.lock().await;
        let mut scratch = ledger.clone();
        let mut txn = MemDeliveryTxn {
            ledger: &mut scratch,
        };
        run_mark_failed(&mut txn, self.clock.now(), record_id).await?;
        *ledger = scratch;
        Ok(())
    }
}
