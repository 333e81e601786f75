//! Generate content from a saved video and keep the history.
//!
//! Billing happens when the generated content is saved: the credit check
//! before the model call is only a pre-flight, the real charge is taken
//! atomically with the insert. A failed model call costs nothing.
//!
//! Once the model has answered, the save runs on its own task so a caller
//! that goes away cannot cancel it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{ContentType, GeneratedContent, NewContent, QuotaSummary};
use crate::services::generator::ContentGenerator;
use crate::services::quota::QuotaLedger;
use crate::services::transcript::TranscriptAcquirer;
use crate::store::Store;

const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub video_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub style_exemplars: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub content: GeneratedContent,
    pub slides: Vec<String>,
    pub quota: QuotaSummary,
    /// Set when the transcript had to be fetched for this call.
    pub transcript_strategy: Option<String>,
}

pub struct ContentService {
    store: Arc<dyn Store>,
    ledger: QuotaLedger,
    acquirer: Arc<TranscriptAcquirer>,
    generator: Arc<ContentGenerator>,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: QuotaLedger,
        acquirer: Arc<TranscriptAcquirer>,
        generator: Arc<ContentGenerator>,
    ) -> Self {
        Self {
            store,
            ledger,
            acquirer,
            generator,
        }
    }

    pub async fn generate_for_video(
        &self,
        account_id: i64,
        request: GenerateRequest,
    ) -> Result<GenerationOutcome, CoreError> {
        if !self.generator.is_enabled() {
            return Err(CoreError::Unavailable("Content generation".into()));
        }
        // no credit, no model call
        self.ledger.ensure_available(account_id).await?;

        let acquired = self
            .acquirer
            .acquire(account_id, &request.video_id, false)
            .await?;
        let video = acquired.video;
        let transcript = video.transcript.as_deref().unwrap_or_default();

        let draft = self
            .generator
            .generate(transcript, request.content_type, &request.style_exemplars)
            .await
            .inspect_err(|e| {
                tracing::warn!(account_id, video_id = %video.id, error = %e, "generation failed")
            })?;

        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("{}: {}", request.content_type.label(), video.title));
        let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
        let new_content = NewContent {
            title,
            body: draft.body,
            content_type: request.content_type,
            source_video_id: video.id.clone(),
        };

        let store = self.store.clone();
        let (content, quota) = tokio::spawn(async move {
            let saved = store
                .insert_content_charged(account_id, new_content, Utc::now())
                .await;
            match &saved {
                Ok((content, quota)) => tracing::info!(
                    account_id,
                    content_id = content.id,
                    video_id = %content.source_video_id,
                    content_type = content.content_type.as_str(),
                    remaining = quota.remaining(),
                    "content generated"
                ),
                Err(e) => tracing::warn!(
                    account_id,
                    error = %e,
                    "generated content discarded, charge refused"
                ),
            }
            saved
        })
        .await
        .map_err(|e| CoreError::Internal(format!("content save task failed: {e}")))??;

        Ok(GenerationOutcome {
            content,
            slides: draft.slides,
            quota: quota.into(),
            transcript_strategy: acquired.strategy,
        })
    }

    pub async fn history(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<GeneratedContent>, i64), CoreError> {
        self.store.list_content(account_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanUpdate, Transcript, Video, VideoInput};
    use crate::services::generator::{GenerationBackend, MockGenerationBackend};
    use crate::services::retry::RetryPolicy;
    use crate::services::transcript::TranscriptStrategy;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedTranscript;

    #[async_trait]
    impl TranscriptStrategy for FixedTranscript {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _video_id: &str) -> Result<Transcript, String> {
            Ok(Transcript::new("we talk about shipping", vec![], None, false))
        }
    }

    async fn service(
        limit: i32,
        used: i32,
        backend: MockGenerationBackend,
    ) -> (ContentService, Arc<MemoryStore>) {
        service_with(limit, used, Some(Arc::new(backend))).await
    }

    async fn service_with(
        limit: i32,
        used: i32,
        backend: Option<Arc<dyn GenerationBackend>>,
    ) -> (ContentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .update_plan(
                1,
                &PlanUpdate {
                    plan_id: "pro".into(),
                    plan_name: None,
                    limit,
                    expires_at: None,
                    reset_count: false,
                },
            )
            .await
            .unwrap();
        for _ in 0..used {
            store.consume_quota(1, Utc::now()).await.unwrap();
        }
        let video = Video::from_input(
            1,
            VideoInput {
                id: "vid-1".into(),
                title: "Shipping talk".into(),
                channel_name: String::new(),
                duration_label: String::new(),
            },
            Utc::now(),
        );
        store.upsert_video(&video).await.unwrap();

        let acquirer = TranscriptAcquirer::new(
            store.clone(),
            vec![Arc::new(FixedTranscript)],
            RetryPolicy::single(Duration::from_secs(5)),
            100_000,
        );
        let generator = ContentGenerator::new(backend, Duration::from_secs(5));
        let service = ContentService::new(
            store.clone(),
            QuotaLedger::new(store.clone()),
            Arc::new(acquirer),
            Arc::new(generator),
        );
        (service, store)
    }

    fn carousel_request() -> GenerateRequest {
        GenerateRequest {
            video_id: "vid-1".into(),
            content_type: ContentType::Carousel,
            style_exemplars: vec![],
            title: None,
        }
    }

    #[tokio::test]
    async fn exhausted_quota_blocks_generation_without_calling_the_model() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_complete().times(0);
        let (service, store) = service(3, 3, backend).await;

        let err = service
            .generate_for_video(1, carousel_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { limit: 3, count: 3 }));
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn success_saves_content_and_charges_once() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Ok("Slide 1: **Ship** small\n\n---\n\nSlide 2: Ship often".into()));
        let (service, store) = service(3, 0, backend).await;

        let outcome = service.generate_for_video(1, carousel_request()).await.unwrap();
        assert_eq!(outcome.slides, vec!["Ship small", "Ship often"]);
        assert_eq!(outcome.content.title, "Carousel: Shipping talk");
        assert_eq!(outcome.content.slides(), outcome.slides);
        assert_eq!(outcome.quota.remaining, 2);
        assert_eq!(outcome.transcript_strategy.as_deref(), Some("fixed"));

        let video = store.get_video(1, "vid-1").await.unwrap().unwrap();
        assert!(video.has_transcript());
        let (history, total) = service.history(1, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(history[0].id, outcome.content.id);
    }

    #[tokio::test]
    async fn model_failure_costs_nothing() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Err("model overloaded".into()));
        let (service, store) = service(3, 1, backend).await;

        let err = service
            .generate_for_video(1, carousel_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::GenerationFailed(_)));
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 1);
        assert_eq!(service.history(1, 10, 0).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn disabled_generator_is_refused_before_any_work() {
        let (service, store) = service_with(3, 0, None).await;

        let err = service
            .generate_for_video(1, carousel_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
        let video = store.get_video(1, "vid-1").await.unwrap().unwrap();
        assert!(!video.has_transcript());
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn answered_generation_is_billed_when_the_caller_goes_away() {
        let answered = Arc::new(tokio::sync::Notify::new());
        let signal = answered.clone();
        let mut backend = MockGenerationBackend::new();
        backend.expect_complete().times(1).returning(move |_| {
            signal.notify_one();
            Ok("Ship small, ship often, and tell people about it.".into())
        });
        let (service, store) = service(3, 0, backend).await;
        let service = Arc::new(service);

        let caller = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut request = carousel_request();
                request.content_type = ContentType::TextPost;
                service.generate_for_video(1, request).await
            })
        };
        answered.notified().await;
        caller.abort();
        let _ = caller.await;

        for _ in 0..100 {
            if store.get_or_create_quota(1).await.unwrap().count > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.get_or_create_quota(1).await.unwrap().count, 1);
        let (history, total) = service.history(1, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert!(history[0].body.starts_with("Ship small"));
    }
}
