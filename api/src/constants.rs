//! Application constants

/// GCS bucket used when `GCS_BUCKET` is not set
pub const DEFAULT_BUCKET_NAME: &str = "clipforge_assets";

/// Maximum request body accepted by the router (one chunk plus headroom)
pub const MAX_REQUEST_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Transcript strategies wait this long by default; upstream extraction is slow
pub const DEFAULT_TRANSCRIPT_TIMEOUT_SECS: u64 = 240;

/// Transcripts longer than this are truncated before they are stored
pub const DEFAULT_TRANSCRIPT_MAX_CHARS: usize = 100_000;

/// Appended to a transcript that hit the size cap
pub const TRANSCRIPT_TRIM_MARKER: &str = "[Trimmed due to size limits]";

/// Generation calls are short; the model either answers or fails
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Fixed chunk size for chunked uploads (10 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Files at or below this size use the single-shot upload path
pub const DEFAULT_CHUNK_THRESHOLD: usize = 10 * 1024 * 1024;

/// Largest file the upload manager will assemble (2 GiB)
pub const MAX_UPLOAD_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Upper bound on chunk indices to keep sessions bounded
pub const MAX_TOTAL_CHUNKS: u32 = 1_000;

/// Idle upload sessions are swept after this long
pub const DEFAULT_UPLOAD_SESSION_TTL_SECS: u64 = 60 * 60;

/// How often the sweeper looks for idle sessions
pub const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

pub const DEFAULT_CHUNK_RETRIES: u32 = 3;

pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 120;

/// Default page size for paginated list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for paginated list endpoints
pub const MAX_PAGE_SIZE: i64 = 100;

/// Plan id carried by accounts without a live plan
pub const EXPIRED_PLAN_ID: &str = "expired";
