//! Persistence collaborator.
//!
//! `PgStore` is the production implementation. `MemoryStore` backs local runs
//! without `DATABASE_URL` and the service tests.
//!
//! Every method that charges a credit does the charge and the insert as one
//! unit: either both happen or neither does.

mod memory;
mod pg;

pub use crate::domain::requests::RequestFilter;
pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{
    FulfillmentRequest, GeneratedContent, NewContent, PlanUpdate, QuotaRecord, RequestPayload,
    Transcript, Video,
};

/// In-place edit applied to a locked request. An `Err` aborts without writing.
pub type RequestMutation =
    Box<dyn FnOnce(&mut FulfillmentRequest) -> Result<(), CoreError> + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    // Videos

    /// Insert or refresh metadata. A stored transcript survives re-saving.
    async fn upsert_video(&self, video: &Video) -> Result<Video, CoreError>;
    async fn get_video(&self, account_id: i64, video_id: &str) -> Result<Option<Video>, CoreError>;
    async fn list_videos(&self, account_id: i64) -> Result<Vec<Video>, CoreError>;
    async fn delete_video(&self, account_id: i64, video_id: &str) -> Result<bool, CoreError>;
    async fn save_transcript(
        &self,
        account_id: i64,
        video_id: &str,
        transcript: &Transcript,
    ) -> Result<Video, CoreError>;

    // Quota

    /// Stored record, creating the default no-plan row on first sight.
    async fn get_or_create_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError>;
    /// Atomic check-and-increment.
    async fn consume_quota(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<QuotaRecord, CoreError>;
    async fn update_plan(
        &self,
        account_id: i64,
        update: &PlanUpdate,
    ) -> Result<QuotaRecord, CoreError>;
    async fn reset_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError>;

    // Generated content

    async fn insert_content_charged(
        &self,
        account_id: i64,
        content: NewContent,
        now: DateTime<Utc>,
    ) -> Result<(GeneratedContent, QuotaRecord), CoreError>;
    async fn list_content(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<GeneratedContent>, i64), CoreError>;

    // Fulfillment requests

    async fn insert_request_charged(
        &self,
        account_id: i64,
        payload: RequestPayload,
        now: DateTime<Utc>,
    ) -> Result<(FulfillmentRequest, QuotaRecord), CoreError>;
    async fn get_request(&self, id: i64) -> Result<Option<FulfillmentRequest>, CoreError>;
    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<FulfillmentRequest>, CoreError>;
    /// Lock, mutate, write back. Serialized per request.
    async fn modify_request(
        &self,
        id: i64,
        mutation: RequestMutation,
    ) -> Result<FulfillmentRequest, CoreError>;
}

pub(crate) fn request_not_found(id: i64) -> CoreError {
    CoreError::NotFound(format!("Request {id}"))
}

pub(crate) fn video_not_found(video_id: &str) -> CoreError {
    CoreError::NotFound(format!("Video {video_id}"))
}
