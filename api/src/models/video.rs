//! Saved videos and their transcripts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A video saved by an account. Only transcript acquisition or deletion mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub account_id: i64,
    pub title: String,
    pub channel_name: String,
    pub duration_label: String,
    pub transcript: Option<String>,
    pub formatted_transcript: Vec<String>,
    pub language: Option<String>,
    pub is_auto_generated: bool,
    pub saved_at: DateTime<Utc>,
}

impl Video {
    pub fn from_input(account_id: i64, input: VideoInput, saved_at: DateTime<Utc>) -> Self {
        Self {
            id: input.id,
            account_id,
            title: input.title,
            channel_name: input.channel_name,
            duration_label: input.duration_label,
            transcript: None,
            formatted_transcript: Vec::new(),
            language: None,
            is_auto_generated: false,
            saved_at,
        }
    }

    pub fn has_transcript(&self) -> bool {
        self.transcript.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn apply_transcript(&mut self, transcript: &Transcript) {
        self.transcript = Some(transcript.text.clone());
        self.formatted_transcript = transcript.formatted.clone();
        self.language = Some(transcript.language.clone());
        self.is_auto_generated = transcript.is_auto_generated;
    }
}

/// Fields supplied when a video is saved
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInput {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub duration_label: String,
}

/// Normalized transcript, whatever shape the strategy returned.
///
/// `formatted` is non-empty exactly when `text` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub text: String,
    pub formatted: Vec<String>,
    pub language: String,
    pub is_auto_generated: bool,
}

impl Transcript {
    pub fn new(
        text: impl Into<String>,
        formatted: Vec<String>,
        language: Option<String>,
        is_auto_generated: bool,
    ) -> Self {
        let text = text.into().trim().to_string();
        let mut formatted: Vec<String> = formatted
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if text.is_empty() {
            formatted.clear();
        } else if formatted.is_empty() {
            formatted = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
        }

        Self {
            text,
            formatted,
            language: language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "en".to_string()),
            is_auto_generated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
