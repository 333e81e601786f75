//! Generated content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::cleaner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text-post")]
    TextPost,
    #[serde(rename = "carousel")]
    Carousel,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::TextPost => "text-post",
            ContentType::Carousel => "carousel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text-post" => Some(ContentType::TextPost),
            "carousel" => Some(ContentType::Carousel),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentType::TextPost => "Text post",
            ContentType::Carousel => "Carousel",
        }
    }
}

/// Saved generation result. Immutable; regenerating creates a new row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub body: String,
    pub content_type: ContentType,
    pub source_video_id: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedContent {
    /// Slides in paragraph order. Text posts have none.
    pub fn slides(&self) -> Vec<String> {
        match self.content_type {
            ContentType::Carousel => cleaner::segment_slides(&self.body),
            ContentType::TextPost => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub title: String,
    pub body: String,
    pub content_type: ContentType,
    pub source_video_id: String,
}
