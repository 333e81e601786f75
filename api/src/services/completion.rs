//! Operator delivery of finished assets.
//!
//! Assets are pushed through the chunked uploader first; the request is only
//! completed once every file has a durable reference. If any upload fails,
//! or completion itself is refused, the request is left as it was and the
//! files already stored are removed.

use bytes::Bytes;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{FileRef, FulfillmentRequest, RequestStatus};
use crate::services::lifecycle::{RequestLifecycle, Viewer};
use crate::services::retry::RetryPolicy;
use crate::services::upload::UploadManager;
use crate::services::uploader::{ChunkedUploader, LocalTransport};

#[derive(Debug, Clone)]
pub struct DeliveredAsset {
    pub original_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub chunk_size: usize,
    pub threshold: usize,
    pub policy: RetryPolicy,
}

pub struct FulfillmentCompletion {
    lifecycle: RequestLifecycle,
    uploads: Arc<UploadManager>,
    settings: UploadSettings,
}

impl FulfillmentCompletion {
    pub fn new(
        lifecycle: RequestLifecycle,
        uploads: Arc<UploadManager>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            lifecycle,
            uploads,
            settings,
        }
    }

    /// Complete with files that were already uploaded.
    pub async fn complete_with_refs(
        &self,
        operator_id: i64,
        request_id: i64,
        files: Vec<FileRef>,
    ) -> Result<FulfillmentRequest, CoreError> {
        self.lifecycle.complete(operator_id, request_id, files).await
    }

    pub async fn deliver(
        &self,
        operator_id: i64,
        request_id: i64,
        assets: Vec<DeliveredAsset>,
    ) -> Result<FulfillmentRequest, CoreError> {
        let operator = Viewer {
            account_id: operator_id,
            is_operator: true,
        };
        let request = self.lifecycle.get(operator, request_id).await?;
        // fail before spending bandwidth on a request that cannot complete
        if !request.status.accepts_completion() {
            return Err(CoreError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Completed,
            });
        }

        let uploader = ChunkedUploader::new(
            LocalTransport::new(self.uploads.clone(), request.account_id),
            self.settings.chunk_size,
            self.settings.threshold,
            self.settings.policy,
        );

        let mut files = Vec::with_capacity(assets.len());
        for asset in assets {
            match uploader
                .upload(&asset.original_name, &asset.mime_type, asset.data)
                .await
            {
                Ok(file) => {
                    tracing::debug!(request_id, url = %file.url, size = file.size_bytes, "asset stored");
                    files.push(file);
                }
                Err(e) => {
                    tracing::warn!(
                        request_id,
                        operator_id,
                        name = %asset.original_name,
                        error = %e,
                        "asset delivery failed"
                    );
                    self.uploads.discard_stored(&files).await;
                    return Err(e);
                }
            }
        }

        match self
            .lifecycle
            .complete(operator_id, request_id, files.clone())
            .await
        {
            Ok(request) => Ok(request),
            Err(e) => {
                tracing::warn!(request_id, operator_id, error = %e, "completion refused after upload");
                self.uploads.discard_stored(&files).await;
                Err(e)
            }
        }
    }
}
