//! Postgres-backed store
//!
//! Transaction boundaries live here; the query functions in `domain` take any
//! executor and are called with `&mut *tx` inside these methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::{RequestFilter, RequestMutation, Store, request_not_found, video_not_found};
use crate::domain::{content, quota, requests, videos};
use crate::error::CoreError;
use crate::models::{
    FulfillmentRequest, GeneratedContent, NewContent, PlanUpdate, QuotaRecord, RequestPayload,
    Transcript, Video,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Take one credit inside the caller's transaction.
///
/// When the guarded UPDATE matches nothing, the row is re-read to report the
/// precise reason (expired plan before exhausted credits).
async fn charge(
    conn: &mut PgConnection,
    account_id: i64,
    now: DateTime<Utc>,
) -> Result<QuotaRecord, CoreError> {
    quota::ensure_quota(&mut *conn, account_id).await?;
    if let Some(row) = quota::try_consume(&mut *conn, account_id, now).await? {
        return Ok(row.into());
    }

    let record: QuotaRecord = quota::get_quota(&mut *conn, account_id)
        .await?
        .map(Into::into)
        .unwrap_or_else(|| QuotaRecord::no_plan(account_id));
    record.ensure_consumable(now)?;
    Err(CoreError::QuotaExceeded {
        limit: record.limit,
        count: record.count,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_video(&self, video: &Video) -> Result<Video, CoreError> {
        Ok(videos::upsert_video(&self.pool, video).await?.into())
    }

    async fn get_video(&self, account_id: i64, video_id: &str) -> Result<Option<Video>, CoreError> {
        Ok(videos::get_video(&self.pool, account_id, video_id)
            .await?
            .map(Into::into))
    }

    async fn list_videos(&self, account_id: i64) -> Result<Vec<Video>, CoreError> {
        Ok(videos::list_videos(&self.pool, account_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn delete_video(&self, account_id: i64, video_id: &str) -> Result<bool, CoreError> {
        Ok(videos::delete_video(&self.pool, account_id, video_id).await?)
    }

    async fn save_transcript(
        &self,
        account_id: i64,
        video_id: &str,
        transcript: &Transcript,
    ) -> Result<Video, CoreError> {
        videos::save_transcript(&self.pool, account_id, video_id, transcript)
            .await?
            .map(Into::into)
            .ok_or_else(|| video_not_found(video_id))
    }

    async fn get_or_create_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        quota::ensure_quota(&self.pool, account_id).await?;
        quota::get_quota(&self.pool, account_id)
            .await?
            .map(Into::into)
            .ok_or_else(|| CoreError::Internal(format!("quota row for {account_id} vanished")))
    }

    async fn consume_quota(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<QuotaRecord, CoreError> {
        let mut tx = self.pool.begin().await?;
        let record = charge(&mut tx, account_id, now).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_plan(
        &self,
        account_id: i64,
        update: &PlanUpdate,
    ) -> Result<QuotaRecord, CoreError> {
        let mut tx = self.pool.begin().await?;
        quota::ensure_quota(&mut *tx, account_id).await?;
        let mut record: QuotaRecord = quota::get_quota_for_update(&mut *tx, account_id)
            .await?
            .map(Into::into)
            .unwrap_or_else(|| QuotaRecord::no_plan(account_id));
        record.apply_plan(update);
        let row = quota::write_quota(&mut *tx, &record).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn reset_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let mut tx = self.pool.begin().await?;
        quota::ensure_quota(&mut *tx, account_id).await?;
        let row = quota::reset_count(&mut *tx, account_id).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn insert_content_charged(
        &self,
        account_id: i64,
        new_content: NewContent,
        now: DateTime<Utc>,
    ) -> Result<(GeneratedContent, QuotaRecord), CoreError> {
        let mut tx = self.pool.begin().await?;
        let record = charge(&mut tx, account_id, now).await?;
        let row = content::insert_content(&mut *tx, account_id, &new_content, now).await?;
        let saved = GeneratedContent::try_from(row)?;
        tx.commit().await?;
        Ok((saved, record))
    }

    async fn list_content(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<GeneratedContent>, i64), CoreError> {
        let total = content::count_content(&self.pool, account_id).await?;
        let items = content::list_content(&self.pool, account_id, limit, offset)
            .await?
            .into_iter()
            .map(GeneratedContent::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    async fn insert_request_charged(
        &self,
        account_id: i64,
        payload: RequestPayload,
        now: DateTime<Utc>,
    ) -> Result<(FulfillmentRequest, QuotaRecord), CoreError> {
        let mut tx = self.pool.begin().await?;
        let record = charge(&mut tx, account_id, now).await?;
        let draft = FulfillmentRequest::new(0, account_id, payload, now);
        let row = requests::insert_request(&mut *tx, &draft).await?;
        tx.commit().await?;
        Ok((row.into(), record))
    }

    async fn get_request(&self, id: i64) -> Result<Option<FulfillmentRequest>, CoreError> {
        Ok(requests::get_request(&self.pool, id).await?.map(Into::into))
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<FulfillmentRequest>, CoreError> {
        Ok(requests::list_requests(&self.pool, filter)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn modify_request(
        &self,
        id: i64,
        mutation: RequestMutation,
    ) -> Result<FulfillmentRequest, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut request: FulfillmentRequest = requests::get_request_for_update(&mut *tx, id)
            .await?
            .map(Into::into)
            .ok_or_else(|| request_not_found(id))?;
        mutation(&mut request)?;
        let row = requests::update_request(&mut *tx, &request).await?;
        tx.commit().await?;
        Ok(row.into())
    }
}
