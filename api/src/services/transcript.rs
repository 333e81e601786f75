//! Transcript acquisition through an ordered list of extraction strategies.
//!
//! Strategies are tried in order and the first non-empty transcript wins;
//! nothing after it is called. When every strategy fails the caller gets
//! `TranscriptUnavailable` with each strategy's reason. There is no automatic
//! re-run of the whole list: a manual retry calls `acquire` with `force`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::constants::TRANSCRIPT_TRIM_MARKER;
use crate::error::CoreError;
use crate::models::{Transcript, Video};
use crate::services::retry::{RetryPolicy, try_in_order};
use crate::store::{Store, video_not_found};

/// One named way of extracting a transcript.
#[async_trait]
pub trait TranscriptStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Errors are plain messages; they end up in the aggregated failure.
    async fn fetch(&self, video_id: &str) -> Result<Transcript, String>;
}

/// Strategy backed by an HTTP extraction service.
///
/// POSTs `{"videoId": ...}` and accepts the transcript either as a string or
/// as an array of `{text}` segments.
pub struct HttpExtractor {
    name: String,
    endpoint: String,
    http: Client,
}

impl HttpExtractor {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            http: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptField {
    Text(String),
    Segments(Vec<Segment>),
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ExtractorResponse {
    #[serde(default)]
    transcript: Option<TranscriptField>,
    #[serde(default, alias = "formattedTranscript")]
    formatted_transcript: Vec<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, alias = "isAutoGenerated")]
    is_auto_generated: bool,
}

impl ExtractorResponse {
    fn into_transcript(self) -> Transcript {
        let (text, formatted) = match self.transcript {
            Some(TranscriptField::Text(text)) => (text, self.formatted_transcript),
            Some(TranscriptField::Segments(segments)) => {
                let lines: Vec<String> = segments.into_iter().map(|s| s.text).collect();
                (lines.join(" "), lines)
            }
            None => (String::new(), Vec::new()),
        };
        Transcript::new(text, formatted, self.language, self.is_auto_generated)
    }
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl TranscriptStrategy for HttpExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, video_id: &str) -> Result<Transcript, String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "videoId": video_id }))
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), snippet(&body)));
        }

        let payload: ExtractorResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable response: {e}"))?;
        let transcript = payload.into_transcript();
        if transcript.is_empty() {
            return Err("empty transcript".to_string());
        }
        Ok(transcript)
    }
}

/// Outcome of `acquire`
#[derive(Debug, Clone, Serialize)]
pub struct AcquiredTranscript {
    pub video: Video,
    /// Strategy that produced the transcript; `None` when a stored one was reused.
    pub strategy: Option<String>,
    /// The size cap cut the transcript.
    pub truncated: bool,
    pub reused: bool,
}

pub struct TranscriptAcquirer {
    store: Arc<dyn Store>,
    strategies: Vec<Arc<dyn TranscriptStrategy>>,
    policy: RetryPolicy,
    max_chars: usize,
}

impl TranscriptAcquirer {
    pub fn new(
        store: Arc<dyn Store>,
        strategies: Vec<Arc<dyn TranscriptStrategy>>,
        policy: RetryPolicy,
        max_chars: usize,
    ) -> Self {
        Self {
            store,
            strategies,
            policy,
            max_chars,
        }
    }

    /// Run the strategy list once, top to bottom.
    pub async fn fetch(&self, video_id: &str) -> Result<(Transcript, String), CoreError> {
        try_in_order(
            &self.strategies,
            &self.policy,
            |s| s.name().to_string(),
            |s| async move {
                let transcript = s.fetch(video_id).await?;
                if transcript.is_empty() {
                    return Err("empty transcript".to_string());
                }
                Ok(transcript)
            },
        )
        .await
        .map_err(|failures| CoreError::TranscriptUnavailable {
            video_id: video_id.to_string(),
            failures,
        })
    }

    /// Make sure the saved video has a transcript, fetching one if needed
    /// (or always, with `force`), and persist it.
    pub async fn acquire(
        &self,
        account_id: i64,
        video_id: &str,
        force: bool,
    ) -> Result<AcquiredTranscript, CoreError> {
        let video = self
            .store
            .get_video(account_id, video_id)
            .await?
            .ok_or_else(|| video_not_found(video_id))?;

        if video.has_transcript() && !force {
            return Ok(AcquiredTranscript {
                video,
                strategy: None,
                truncated: false,
                reused: true,
            });
        }

        let (transcript, strategy) = self.fetch(video_id).await?;
        let (transcript, truncated) = cap_transcript(transcript, self.max_chars);
        if truncated {
            tracing::warn!(
                account_id,
                video_id,
                max_chars = self.max_chars,
                "transcript trimmed to size limit"
            );
        }

        let video = self
            .store
            .save_transcript(account_id, video_id, &transcript)
            .await?;
        tracing::info!(account_id, video_id, %strategy, truncated, "transcript saved");

        Ok(AcquiredTranscript {
            video,
            strategy: Some(strategy),
            truncated,
            reused: false,
        })
    }
}

/// Trim a transcript to `max_chars` characters and mark the cut.
pub fn cap_transcript(transcript: Transcript, max_chars: usize) -> (Transcript, bool) {
    let Some((cut, _)) = transcript.text.char_indices().nth(max_chars) else {
        return (transcript, false);
    };

    let text = format!(
        "{}\n\n{}",
        transcript.text[..cut].trim_end(),
        TRANSCRIPT_TRIM_MARKER
    );

    let mut budget = max_chars;
    let mut formatted = Vec::new();
    for line in transcript.formatted {
        let len = line.chars().count();
        if len > budget {
            break;
        }
        budget -= len;
        formatted.push(line);
    }
    formatted.push(TRANSCRIPT_TRIM_MARKER.to_string());

    (
        Transcript::new(
            text,
            formatted,
            Some(transcript.language),
            transcript.is_auto_generated,
        ),
        true,
    )
}
