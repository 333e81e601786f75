//! Runtime configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_RETRIES, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_THRESHOLD,
    DEFAULT_CHUNK_TIMEOUT_SECS, DEFAULT_GEMINI_MODEL, DEFAULT_GENERATION_TIMEOUT_SECS,
    DEFAULT_TRANSCRIPT_MAX_CHARS, DEFAULT_TRANSCRIPT_TIMEOUT_SECS,
    DEFAULT_UPLOAD_SESSION_TTL_SECS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Where finished objects are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: PathBuf, public_base_url: String },
    Gcs { bucket: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Absent: in-memory store
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Absent: generation answers 503
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub generation_timeout: Duration,
    pub storage: StorageBackend,
    pub transcript_urls: Vec<(String, String)>,
    pub transcript_timeout: Duration,
    pub transcript_attempts: u32,
    pub transcript_max_chars: usize,
    pub upload_staging_dir: PathBuf,
    pub upload_chunk_size: usize,
    pub upload_chunk_threshold: usize,
    pub upload_session_ttl: Duration,
    pub upload_chunk_retries: u32,
    pub upload_chunk_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_or("PORT", 3000u16);
        let public_base_url = env::var("PUBLIC_ASSET_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}/files"));

        let storage = match non_empty("LOCAL_STORAGE_PATH") {
            Some(root) => StorageBackend::Local {
                root: PathBuf::from(root),
                public_base_url,
            },
            None => StorageBackend::Gcs {
                bucket: non_empty("GCS_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET_NAME.to_string()),
            },
        };

        let transcript_urls = [
            ("primary", "TRANSCRIPT_PRIMARY_URL"),
            ("secondary", "TRANSCRIPT_SECONDARY_URL"),
        ]
        .into_iter()
        .filter_map(|(name, key)| non_empty(key).map(|url| (name.to_string(), url)))
        .collect();

        Ok(Self {
            port,
            database_url: non_empty("DATABASE_URL"),
            jwt_secret: required("JWT_SECRET", non_empty("JWT_SECRET"))?,
            gemini_api_key: non_empty("GOOGLE_GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            generation_timeout: Duration::from_secs(env_or(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )),
            storage,
            transcript_urls,
            transcript_timeout: Duration::from_secs(env_or(
                "TRANSCRIPT_TIMEOUT_SECS",
                DEFAULT_TRANSCRIPT_TIMEOUT_SECS,
            )),
            transcript_attempts: env_or("TRANSCRIPT_ATTEMPTS", 1u32),
            transcript_max_chars: env_or("TRANSCRIPT_MAX_CHARS", DEFAULT_TRANSCRIPT_MAX_CHARS),
            upload_staging_dir: non_empty("UPLOAD_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("clipforge-uploads")),
            upload_chunk_size: env_or("UPLOAD_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            upload_chunk_threshold: env_or("UPLOAD_CHUNK_THRESHOLD", DEFAULT_CHUNK_THRESHOLD),
            upload_session_ttl: Duration::from_secs(env_or(
                "UPLOAD_SESSION_TTL_SECS",
                DEFAULT_UPLOAD_SESSION_TTL_SECS,
            )),
            upload_chunk_retries: env_or("UPLOAD_CHUNK_RETRIES", DEFAULT_CHUNK_RETRIES),
            upload_chunk_timeout: Duration::from_secs(env_or(
                "UPLOAD_CHUNK_TIMEOUT_SECS",
                DEFAULT_CHUNK_TIMEOUT_SECS,
            )),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

// secrets have no default
fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or(ConfigError::Missing(key))
}

/// Positive numeric value from the environment, or the default.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    parse_positive(env::var(key).ok().as_deref()).unwrap_or(default)
}

fn parse_positive<T>(raw: Option<&str>) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    raw.and_then(|s| s.trim().parse().ok())
        .filter(|v: &T| *v > T::default())
}
