//! Stored asset references

use serde::{Deserialize, Serialize};

/// Reference to a durable object. Requests hold these, never raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    /// Stored object name (unique per upload)
    pub filename: String,
    /// Name the uploader gave the file
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}
