//! Credit ledger service
//!
//! Callers never touch counters directly: reads go through `check`, charges
//! through `consume` (or a store method that charges and inserts together),
//! and operator changes through `adjust`/`reset`.

use chrono::Utc;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{PlanUpdate, QuotaRecord};
use crate::store::Store;

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn Store>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Current record. Never charges and never fails for a missing plan.
    pub async fn check(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let record = self.store.get_or_create_quota(account_id).await?;
        Ok(record.effective(Utc::now()))
    }

    /// Atomic increment-if-available.
    pub async fn consume(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let result = self.store.consume_quota(account_id, Utc::now()).await;
        match &result {
            Ok(record) => tracing::info!(
                account_id,
                count = record.count,
                limit = record.limit,
                "credit consumed"
            ),
            Err(e) => tracing::info!(account_id, kind = e.kind(), "credit refused"),
        }
        result
    }

    /// Pre-flight used before expensive work. Does not reserve a credit; the
    /// real charge still happens atomically when the result is saved.
    pub async fn ensure_available(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let record = self.store.get_or_create_quota(account_id).await?;
        record.ensure_consumable(Utc::now())?;
        Ok(record)
    }

    pub async fn adjust(
        &self,
        account_id: i64,
        update: &PlanUpdate,
    ) -> Result<QuotaRecord, CoreError> {
        if update.plan_id.trim().is_empty() {
            return Err(CoreError::BadRequest("A plan id is required.".into()));
        }
        if update.limit < 0 {
            return Err(CoreError::BadRequest("A plan limit cannot be negative.".into()));
        }
        let record = self.store.update_plan(account_id, update).await?;
        tracing::info!(
            account_id,
            plan_id = %record.plan_id,
            limit = record.limit,
            reset = update.reset_count,
            "plan adjusted"
        );
        Ok(record.effective(Utc::now()))
    }

    pub async fn reset(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let record = self.store.reset_quota(account_id).await?;
        tracing::info!(account_id, "credit count reset");
        Ok(record.effective(Utc::now()))
    }
}
