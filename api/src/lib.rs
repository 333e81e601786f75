pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use services::completion::FulfillmentCompletion;
use services::content::ContentService;
use services::lifecycle::RequestLifecycle;
use services::quota::QuotaLedger;
use services::transcript::TranscriptAcquirer;
use services::upload::UploadManager;
use store::Store;

/// Shared state handed to every route handler
pub struct AppState {
    pub jwt_secret: Vec<u8>,
    /// Set when objects are written to a local directory served under /files
    pub local_storage_path: Option<PathBuf>,
    pub store: Arc<dyn Store>,
    pub ledger: QuotaLedger,
    pub acquirer: Arc<TranscriptAcquirer>,
    pub content: ContentService,
    pub lifecycle: RequestLifecycle,
    pub uploads: Arc<UploadManager>,
    pub completion: FulfillmentCompletion,
}
