use axum::extract::DefaultBodyLimit;
use google_cloud_storage::client::{Storage, StorageControl};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clipforge::config::{AppConfig, StorageBackend};
use clipforge::constants::{MAX_REQUEST_BODY_SIZE, UPLOAD_SWEEP_INTERVAL_SECS};
use clipforge::services::completion::{FulfillmentCompletion, UploadSettings};
use clipforge::services::content::ContentService;
use clipforge::services::generator::{ContentGenerator, GeminiBackend, GenerationBackend};
use clipforge::services::lifecycle::RequestLifecycle;
use clipforge::services::notify::{Notifier, TracingNotifier};
use clipforge::services::quota::QuotaLedger;
use clipforge::services::retry::RetryPolicy;
use clipforge::services::transcript::{HttpExtractor, TranscriptAcquirer, TranscriptStrategy};
use clipforge::services::upload::UploadManager;
use clipforge::storage::{GcsObjectStore, LocalObjectStore, ObjectStore};
use clipforge::store::{MemoryStore, PgStore, Store};
use clipforge::{AppState, logging, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("connected to postgres, migrations applied");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let (objects, local_storage_path) = match &config.storage {
        StorageBackend::Local {
            root,
            public_base_url,
        } => {
            tracing::info!(root = %root.display(), "local object storage");
            (
                Arc::new(LocalObjectStore::new(root.clone(), public_base_url)) as Arc<dyn ObjectStore>,
                Some(root.clone()),
            )
        }
        StorageBackend::Gcs { bucket } => {
            // GCS client uses GOOGLE_APPLICATION_CREDENTIALS env var
            let client = Storage::builder()
                .build()
                .await
                .map_err(|e| format!("GCS client: {e}"))?;
            let control = StorageControl::builder()
                .build()
                .await
                .map_err(|e| format!("GCS control client: {e}"))?;
            tracing::info!(bucket = %bucket, "GCS object storage");
            (
                Arc::new(GcsObjectStore::new(client, control, bucket)) as Arc<dyn ObjectStore>,
                None,
            )
        }
    };

    let backend: Option<Arc<dyn GenerationBackend>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiBackend::new(key, &config.gemini_model))
            as Arc<dyn GenerationBackend>),
        None => {
            tracing::warn!("GOOGLE_GEMINI_API_KEY not set, content generation disabled");
            None
        }
    };
    let generator = Arc::new(ContentGenerator::new(backend, config.generation_timeout));

    let strategies: Vec<Arc<dyn TranscriptStrategy>> = config
        .transcript_urls
        .iter()
        .map(|(name, url)| Arc::new(HttpExtractor::new(name, url)) as Arc<dyn TranscriptStrategy>)
        .collect();
    if strategies.is_empty() {
        tracing::warn!("no transcript strategies configured, acquisition will always fail");
    }
    let acquirer = Arc::new(TranscriptAcquirer::new(
        store.clone(),
        strategies,
        RetryPolicy::new(config.transcript_attempts, config.transcript_timeout),
        config.transcript_max_chars,
    ));

    let uploads = Arc::new(UploadManager::new(
        config.upload_staging_dir.clone(),
        objects,
        config.upload_chunk_size,
        config.upload_session_ttl,
    ));
    uploads
        .clone()
        .spawn_sweeper(Duration::from_secs(UPLOAD_SWEEP_INTERVAL_SECS));

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let ledger = QuotaLedger::new(store.clone());
    let lifecycle = RequestLifecycle::new(store.clone(), notifier);
    let content = ContentService::new(store.clone(), ledger.clone(), acquirer.clone(), generator);
    let completion = FulfillmentCompletion::new(
        lifecycle.clone(),
        uploads.clone(),
        UploadSettings {
            chunk_size: config.upload_chunk_size,
            threshold: config.upload_chunk_threshold,
            policy: RetryPolicy::new(config.upload_chunk_retries, config.upload_chunk_timeout),
        },
    );

    let state = Arc::new(AppState {
        jwt_secret: config.jwt_secret.clone().into_bytes(),
        local_storage_path,
        store,
        ledger,
        acquirer,
        content,
        lifecycle,
        uploads,
        completion,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::build_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    // the rate limiter keys on the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
