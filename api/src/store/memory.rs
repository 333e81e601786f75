//! In-process store behind a single async mutex

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{RequestFilter, RequestMutation, Store, request_not_found, video_not_found};
use crate::error::CoreError;
use crate::models::{
    FulfillmentRequest, GeneratedContent, NewContent, PlanUpdate, QuotaRecord, RequestPayload,
    Transcript, Video,
};

#[derive(Default)]
struct MemoryState {
    videos: HashMap<(i64, String), Video>,
    quotas: HashMap<i64, QuotaRecord>,
    content: Vec<GeneratedContent>,
    requests: BTreeMap<i64, FulfillmentRequest>,
    next_content_id: i64,
    next_request_id: i64,
}

impl MemoryState {
    fn quota_mut(&mut self, account_id: i64) -> &mut QuotaRecord {
        self.quotas
            .entry(account_id)
            .or_insert_with(|| QuotaRecord::no_plan(account_id))
    }

    fn charge(&mut self, account_id: i64, now: DateTime<Utc>) -> Result<QuotaRecord, CoreError> {
        let record = self.quota_mut(account_id);
        record.ensure_consumable(now)?;
        record.count += 1;
        Ok(record.clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_video(&self, video: &Video) -> Result<Video, CoreError> {
        let mut state = self.state.lock().await;
        let key = (video.account_id, video.id.clone());
        let saved = match state.videos.get_mut(&key) {
            Some(existing) => {
                existing.title = video.title.clone();
                existing.channel_name = video.channel_name.clone();
                existing.duration_label = video.duration_label.clone();
                existing.clone()
            }
            None => {
                state.videos.insert(key, video.clone());
                video.clone()
            }
        };
        Ok(saved)
    }

    async fn get_video(&self, account_id: i64, video_id: &str) -> Result<Option<Video>, CoreError> {
        let state = self.state.lock().await;
        Ok(state.videos.get(&(account_id, video_id.to_string())).cloned())
    }

    async fn list_videos(&self, account_id: i64) -> Result<Vec<Video>, CoreError> {
        let state = self.state.lock().await;
        let mut videos: Vec<Video> = state
            .videos
            .values()
            .filter(|v| v.account_id == account_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(videos)
    }

    async fn delete_video(&self, account_id: i64, video_id: &str) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .videos
            .remove(&(account_id, video_id.to_string()))
            .is_some())
    }

    async fn save_transcript(
        &self,
        account_id: i64,
        video_id: &str,
        transcript: &Transcript,
    ) -> Result<Video, CoreError> {
        let mut state = self.state.lock().await;
        let video = state
            .videos
            .get_mut(&(account_id, video_id.to_string()))
            .ok_or_else(|| video_not_found(video_id))?;
        video.apply_transcript(transcript);
        Ok(video.clone())
    }

    async fn get_or_create_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let mut state = self.state.lock().await;
        Ok(state.quota_mut(account_id).clone())
    }

    async fn consume_quota(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<QuotaRecord, CoreError> {
        self.state.lock().await.charge(account_id, now)
    }

    async fn update_plan(
        &self,
        account_id: i64,
        update: &PlanUpdate,
    ) -> Result<QuotaRecord, CoreError> {
        let mut state = self.state.lock().await;
        let record = state.quota_mut(account_id);
        record.apply_plan(update);
        Ok(record.clone())
    }

    async fn reset_quota(&self, account_id: i64) -> Result<QuotaRecord, CoreError> {
        let mut state = self.state.lock().await;
        let record = state.quota_mut(account_id);
        record.count = 0;
        Ok(record.clone())
    }

    async fn insert_content_charged(
        &self,
        account_id: i64,
        content: NewContent,
        now: DateTime<Utc>,
    ) -> Result<(GeneratedContent, QuotaRecord), CoreError> {
        let mut state = self.state.lock().await;
        let record = state.charge(account_id, now)?;
        state.next_content_id += 1;
        let saved = GeneratedContent {
            id: state.next_content_id,
            account_id,
            title: content.title,
            body: content.body,
            content_type: content.content_type,
            source_video_id: content.source_video_id,
            created_at: now,
        };
        state.content.push(saved.clone());
        Ok((saved, record))
    }

    async fn list_content(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<GeneratedContent>, i64), CoreError> {
        let state = self.state.lock().await;
        let mut owned: Vec<&GeneratedContent> = state
            .content
            .iter()
            .filter(|c| c.account_id == account_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn insert_request_charged(
        &self,
        account_id: i64,
        payload: RequestPayload,
        now: DateTime<Utc>,
    ) -> Result<(FulfillmentRequest, QuotaRecord), CoreError> {
        let mut state = self.state.lock().await;
        let record = state.charge(account_id, now)?;
        state.next_request_id += 1;
        let request = FulfillmentRequest::new(state.next_request_id, account_id, payload, now);
        state.requests.insert(request.id, request.clone());
        Ok((request, record))
    }

    async fn get_request(&self, id: i64) -> Result<Option<FulfillmentRequest>, CoreError> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<FulfillmentRequest>, CoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&FulfillmentRequest> = state
            .requests
            .values()
            .filter(|r| filter.account_id.is_none_or(|id| r.account_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn modify_request(
        &self,
        id: i64,
        mutation: RequestMutation,
    ) -> Result<FulfillmentRequest, CoreError> {
        let mut state = self.state.lock().await;
        let stored = state.requests.get_mut(&id).ok_or_else(|| request_not_found(id))?;
        let mut edited = stored.clone();
        mutation(&mut edited)?;
        *stored = edited.clone();
        Ok(edited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, RequestStatus};
    use std::sync::Arc;

    async fn store_with_plan(limit: i32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .update_plan(
                1,
                &PlanUpdate {
                    plan_id: "starter".into(),
                    plan_name: Some("Starter".into()),
                    limit,
                    expires_at: None,
                    reset_count: false,
                },
            )
            .await
            .unwrap();
        store
    }

    fn payload() -> RequestPayload {
        RequestPayload {
            title: "Launch carousel".into(),
            description: String::new(),
            source_video_id: Some("vid".into()),
            carousel_type: "educational".into(),
            content_snapshot: "Slide one\n\nSlide two".into(),
            uploaded_files: vec![],
        }
    }

    #[tokio::test]
    async fn credit_conservation() {
        let store = store_with_plan(3).await;
        let now = Utc::now();
        let mut failures = 0;
        for _ in 0..5 {
            match store.consume_quota(1, now).await {
                Ok(_) => {}
                Err(CoreError::QuotaExceeded { limit: 3, count: 3 }) => failures += 1,
                Err(other) => panic!("unexpected {other}"),
            }
        }
        assert_eq!(failures, 2);
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn concurrent_consume_with_one_credit_left() {
        let store = store_with_plan(1).await;
        let now = Utc::now();
        let a = tokio::spawn({
            let store = store.clone();
            async move { store.consume_quota(1, now).await }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.consume_quota(1, now).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(CoreError::QuotaExceeded { .. })))
        );
    }

    #[tokio::test]
    async fn unpaid_submission_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let err = store
            .insert_request_charged(1, payload(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PlanExpired));
        let filter = RequestFilter {
            limit: 50,
            ..Default::default()
        };
        assert!(store.list_requests(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_request_untouched() {
        let store = store_with_plan(2).await;
        let (request, _) = store
            .insert_request_charged(1, payload(), Utc::now())
            .await
            .unwrap();
        let err = store
            .modify_request(
                request.id,
                Box::new(|r| {
                    r.title = "half-written".into();
                    Err(CoreError::BadRequest("nope".into()))
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
        let stored = store.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Launch carousel");
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn content_history_is_newest_first_and_paged() {
        let store = store_with_plan(5).await;
        let start = Utc::now();
        for i in 0..3 {
            store
                .insert_content_charged(
                    1,
                    NewContent {
                        title: format!("post {i}"),
                        body: "body".into(),
                        content_type: ContentType::TextPost,
                        source_video_id: "vid".into(),
                    },
                    start + chrono::Duration::seconds(i),
                )
                .await
                .unwrap();
        }
        let (page, total) = store.list_content(1, 2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(),
            vec!["post 2", "post 1"]
        );
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 3);
    }
}
