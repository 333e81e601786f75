//! Sender side of a chunked upload.
//!
//! Payloads at or below the threshold go up in one shot. Larger ones are cut
//! into fixed-size chunks (the last one holds the remainder) and sent one at
//! a time in index order, each with its own bounded retries, then finalized.
//! A chunk that still fails aborts the file; the caller restarts it from
//! scratch under a new file id.

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::FileRef;
use crate::services::retry::{RetryPolicy, retry_with_backoff};
use crate::services::upload::{ChunkAck, ChunkMeta, UploadManager, chunk_count};

#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn put_single(
        &self,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRef, CoreError>;

    async fn put_chunk(
        &self,
        file_id: &str,
        index: u32,
        meta: &ChunkMeta,
        data: Bytes,
    ) -> Result<ChunkAck, CoreError>;

    async fn finalize(&self, file_id: &str) -> Result<FileRef, CoreError>;
}

/// Transport that hands chunks straight to an in-process `UploadManager`.
pub struct LocalTransport {
    manager: Arc<UploadManager>,
    account_id: i64,
}

impl LocalTransport {
    pub fn new(manager: Arc<UploadManager>, account_id: i64) -> Self {
        Self {
            manager,
            account_id,
        }
    }
}

#[async_trait]
impl UploadTransport for LocalTransport {
    async fn put_single(
        &self,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRef, CoreError> {
        self.manager
            .upload_single(self.account_id, original_name, mime_type, data)
            .await
    }

    async fn put_chunk(
        &self,
        file_id: &str,
        index: u32,
        meta: &ChunkMeta,
        data: Bytes,
    ) -> Result<ChunkAck, CoreError> {
        self.manager
            .upload_chunk(self.account_id, file_id, index, meta.clone(), data)
            .await
    }

    async fn finalize(&self, file_id: &str) -> Result<FileRef, CoreError> {
        self.manager.finalize(self.account_id, file_id).await
    }
}

pub struct ChunkedUploader<T> {
    transport: T,
    chunk_size: usize,
    threshold: usize,
    policy: RetryPolicy,
}

impl<T: UploadTransport> ChunkedUploader<T> {
    pub fn new(transport: T, chunk_size: usize, threshold: usize, policy: RetryPolicy) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
            threshold,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn upload(
        &self,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRef, CoreError> {
        if data.len() <= self.threshold {
            return self.transport.put_single(original_name, mime_type, data).await;
        }

        let file_id = new_file_id();
        let plan = split_plan(data.len(), self.chunk_size);
        let meta = ChunkMeta {
            total_chunks: plan.len() as u32,
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
        };
        tracing::info!(
            file_id = %file_id,
            size = data.len(),
            chunks = meta.total_chunks,
            "starting chunked upload"
        );

        let transport = &self.transport;
        let file_id_ref = file_id.as_str();
        let meta_ref = &meta;
        for (index, range) in plan.into_iter().enumerate() {
            let index = index as u32;
            let chunk = data.slice(range);
            retry_with_backoff(&self.policy, CoreError::is_transient, |attempt| {
                let chunk = chunk.clone();
                async move {
                    if attempt > 1 {
                        tracing::debug!(file_id = file_id_ref, chunk_index = index, attempt, "retrying chunk");
                    }
                    transport.put_chunk(file_id_ref, index, meta_ref, chunk).await
                }
            })
            .await
            .map_err(|e| {
                tracing::warn!(file_id = file_id_ref, chunk_index = index, error = %e, "chunk upload failed");
                CoreError::ChunkUploadFailed {
                    file_id: file_id.clone(),
                    index,
                    reason: e.to_string(),
                }
            })?;
        }

        self.transport.finalize(&file_id).await
    }
}

/// Byte ranges of each chunk, in order.
pub fn split_plan(size: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..chunk_count(size, chunk_size) as usize)
        .map(|i| {
            let start = i * chunk_size;
            start..(start + chunk_size).min(size)
        })
        .collect()
}

fn new_file_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records calls; chunk `flaky_index` fails `failures` times first.
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
        flaky_index: u32,
        failures: Mutex<u32>,
        error: fn() -> CoreError,
    }

    impl RecordingTransport {
        fn new(flaky_index: u32, failures: u32, error: fn() -> CoreError) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                flaky_index,
                failures: Mutex::new(failures),
                error,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn file(name: &str, size: i64) -> FileRef {
        FileRef {
            url: format!("https://cdn.example/{name}"),
            filename: name.into(),
            original_name: name.into(),
            mime_type: "video/mp4".into(),
            size_bytes: size,
        }
    }

    #[async_trait]
    impl UploadTransport for RecordingTransport {
        async fn put_single(
            &self,
            original_name: &str,
            _mime_type: &str,
            data: Bytes,
        ) -> Result<FileRef, CoreError> {
            self.calls.lock().unwrap().push("single".into());
            Ok(file(original_name, data.len() as i64))
        }

        async fn put_chunk(
            &self,
            file_id: &str,
            index: u32,
            meta: &ChunkMeta,
            data: Bytes,
        ) -> Result<ChunkAck, CoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("chunk {index} ({} bytes)", data.len()));
            if index == self.flaky_index {
                let mut left = self.failures.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err((self.error)());
                }
            }
            Ok(ChunkAck {
                file_id: file_id.to_string(),
                chunk_index: index,
                received: index + 1,
                total_chunks: meta.total_chunks,
                complete: index + 1 == meta.total_chunks,
            })
        }

        async fn finalize(&self, _file_id: &str) -> Result<FileRef, CoreError> {
            self.calls.lock().unwrap().push("finalize".into());
            Ok(file("video.mp4", 25))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(120))
    }

    fn storage_error() -> CoreError {
        CoreError::Storage("connection reset".into())
    }

    fn forbidden() -> CoreError {
        CoreError::Forbidden("not yours".into())
    }

    #[test]
    fn plan_has_fixed_chunks_and_a_remainder() {
        assert_eq!(split_plan(25, 10), vec![0..10, 10..20, 20..25]);
        assert_eq!(split_plan(20, 10), vec![0..10, 10..20]);
    }

    #[tokio::test(start_paused = true)]
    async fn small_payload_goes_single_shot() {
        let transport = RecordingTransport::new(u32::MAX, 0, storage_error);
        let uploader = ChunkedUploader::new(transport, 10, 10, policy());
        uploader
            .upload("clip.mp4", "video/mp4", Bytes::from(vec![0u8; 10]))
            .await
            .unwrap();
        assert_eq!(uploader.transport().calls(), vec!["single"]);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_go_in_order_and_transient_failures_are_retried() {
        let transport = RecordingTransport::new(1, 2, storage_error);
        let uploader = ChunkedUploader::new(transport, 10, 10, policy());
        let file = uploader
            .upload("video.mp4", "video/mp4", Bytes::from(vec![7u8; 25]))
            .await
            .unwrap();
        assert_eq!(file.size_bytes, 25);
        assert_eq!(
            uploader.transport().calls(),
            vec![
                "chunk 0 (10 bytes)",
                "chunk 1 (10 bytes)",
                "chunk 1 (10 bytes)",
                "chunk 1 (10 bytes)",
                "chunk 2 (5 bytes)",
                "finalize",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_naming_the_chunk() {
        let transport = RecordingTransport::new(1, 10, storage_error);
        let uploader = ChunkedUploader::new(transport, 10, 10, policy());
        let err = uploader
            .upload("video.mp4", "video/mp4", Bytes::from(vec![7u8; 25]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ChunkUploadFailed { index: 1, .. }));
        let calls = uploader.transport().calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("chunk 1")).count(), 3);
        assert!(!calls.iter().any(|c| c == "finalize" || c.starts_with("chunk 2")));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let transport = RecordingTransport::new(0, 10, forbidden);
        let uploader = ChunkedUploader::new(transport, 10, 10, policy());
        let err = uploader
            .upload("video.mp4", "video/mp4", Bytes::from(vec![7u8; 25]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ChunkUploadFailed { index: 0, .. }));
        assert_eq!(uploader.transport().calls(), vec!["chunk 0 (10 bytes)"]);
    }
}
