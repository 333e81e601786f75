//! AI content generation
//!
//! One backend call per `generate`, no internal retry. The raw output always
//! goes through the cleaner before anyone sees it.

use async_trait::async_trait;
use reson_agentic::providers::{GenerationConfig, GoogleGenAIClient, InferenceClient};
use reson_agentic::types::ChatMessage;
use reson_agentic::utils::ConversationMessage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::ContentType;
use crate::services::cleaner;

const MAX_EXEMPLARS: usize = 3;
const MAX_EXEMPLAR_CHARS: usize = 2_000;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Raw model text for a prompt. Errors carry the upstream message.
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

pub struct GeminiBackend {
    client: GoogleGenAIClient,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: GoogleGenAIClient::new(api_key, model),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let messages = vec![ConversationMessage::Chat(ChatMessage::user(
            prompt.to_string(),
        ))];
        let config = GenerationConfig {
            model: self.model.clone(),
            max_tokens: Some(4096),
            temperature: Some(0.8),
            top_p: None,
            tools: None,
            native_tools: false,
            reasoning_effort: None,
            thinking_budget: None,
            output_schema: None,
            output_type_name: None,
        };

        let response = self
            .client
            .get_generation(&messages, &config)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.content)
    }
}

/// Cleaned generation result, not yet saved.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDraft {
    pub content_type: ContentType,
    pub body: String,
    /// Carousel slides in paragraph order; empty for text posts.
    pub slides: Vec<String>,
}

pub struct ContentGenerator {
    backend: Option<Arc<dyn GenerationBackend>>,
    timeout: Duration,
}

impl ContentGenerator {
    pub fn new(backend: Option<Arc<dyn GenerationBackend>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn generate(
        &self,
        transcript: &str,
        content_type: ContentType,
        style_exemplars: &[String],
    ) -> Result<GeneratedDraft, CoreError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| CoreError::Unavailable("Content generation".into()))?;
        if transcript.trim().is_empty() {
            return Err(CoreError::BadRequest(
                "This video has no transcript to generate from.".into(),
            ));
        }

        let prompt = build_prompt(transcript, content_type, style_exemplars);
        let raw = match tokio::time::timeout(self.timeout, backend.complete(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(upstream)) => return Err(CoreError::GenerationFailed(upstream)),
            Err(_) => {
                return Err(CoreError::GenerationFailed(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let body = cleaner::clean(&raw);
        if body.is_empty() {
            return Err(CoreError::GenerationFailed("the model returned no text".into()));
        }

        let slides = match content_type {
            ContentType::Carousel => {
                let slides = cleaner::segment_slides(&body);
                if slides.is_empty() {
                    return Err(CoreError::GenerationFailed(
                        "the model returned no usable slides".into(),
                    ));
                }
                slides
            }
            ContentType::TextPost => Vec::new(),
        };

        tracing::debug!(
            content_type = content_type.as_str(),
            chars = body.len(),
            slides = slides.len(),
            "generation cleaned"
        );
        Ok(GeneratedDraft {
            content_type,
            body,
            slides,
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn build_prompt(transcript: &str, content_type: ContentType, exemplars: &[String]) -> String {
    let format_rules = match content_type {
        ContentType::TextPost => {
            "Write one social media text post. Plain text, short paragraphs, no title line."
        }
        ContentType::Carousel => {
            "Write a carousel of 5 to 10 slides. Each slide is one short paragraph. \
             Separate slides with a single blank line. Do not number the slides."
        }
    };

    let exemplar_section = exemplars
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .take(MAX_EXEMPLARS)
        .map(|e| format!("---\n{}\n", truncate_chars(e, MAX_EXEMPLAR_CHARS)))
        .collect::<String>();
    let exemplar_section = if exemplar_section.is_empty() {
        String::new()
    } else {
        format!("\nMatch the voice of these examples:\n{exemplar_section}---\n")
    };

    format!(
        r#"You turn video transcripts into social content.

{format_rules}
Rules:
- No markdown, no hashtags block, no labels like "Title:" or "Call to action:"
- No AI-sounding phrases: "excited to share", "dive into", "game-changer"
- Keep the speaker's actual ideas; do not invent facts
{exemplar_section}
Transcript:
{transcript}

Respond with ONLY the content."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(mock: MockGenerationBackend) -> ContentGenerator {
        ContentGenerator::new(Some(Arc::new(mock)), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn carousel_output_is_cleaned_and_segmented() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("Slide 1: **Hello** world\n\n---\n\nSlide 2: Bye".to_string()));

        let draft = generator(mock)
            .generate("a transcript", ContentType::Carousel, &[])
            .await
            .unwrap();
        assert_eq!(draft.body, "Hello world\n\nBye");
        assert_eq!(draft.slides, vec!["Hello world", "Bye"]);
    }

    #[tokio::test]
    async fn text_post_is_not_segmented() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .returning(|_| Ok("## Big idea\n\nFirst paragraph.\n\nSecond paragraph.".to_string()));

        let draft = generator(mock)
            .generate("a transcript", ContentType::TextPost, &[])
            .await
            .unwrap();
        assert_eq!(draft.body, "Big idea\n\nFirst paragraph.\n\nSecond paragraph.");
        assert!(draft.slides.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_becomes_generation_failed() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(1)
            .returning(|_| Err("429 resource exhausted".to_string()));

        let err = generator(mock)
            .generate("a transcript", ContentType::TextPost, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::GenerationFailed(m) if m.contains("429")));
    }

    #[tokio::test]
    async fn blank_output_is_a_failure() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete().returning(|_| Ok("---\n\n**  **".to_string()));
        let err = generator(mock)
            .generate("a transcript", ContentType::Carousel, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn missing_backend_is_unavailable() {
        let err = ContentGenerator::new(None, Duration::from_secs(1))
            .generate("t", ContentType::TextPost, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn exemplars_reach_the_prompt() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .withf(|prompt: &str| prompt.contains("my signature voice") && prompt.contains("the talk"))
            .returning(|_| Ok("Done.".to_string()));
        generator(mock)
            .generate(
                "the talk",
                ContentType::TextPost,
                &["my signature voice".to_string(), "  ".to_string()],
            )
            .await
            .unwrap();
    }
}
