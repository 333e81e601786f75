//! Chunked upload sessions.
//!
//! A session is created by its first chunk and torn down by `finalize` or by
//! the idle sweeper. Chunk bytes are staged on disk under
//! `{staging_dir}/{file_id}/{index}.part`; only the index set lives in memory.
//! Finalize succeeds only once every index in `0..total_chunks` is present,
//! and streams the parts through an assembled file on disk.

use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::constants::{MAX_TOTAL_CHUNKS, MAX_UPLOAD_FILE_SIZE};
use crate::error::CoreError;
use crate::models::FileRef;
use crate::storage::{ObjectStore, object_path};

const UPLOAD_PREFIX: &str = "uploads";
const MAX_FILE_ID_LEN: usize = 128;
const ASSEMBLED_NAME: &str = "assembled";

/// Per-chunk metadata sent alongside every chunk.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub total_chunks: u32,
    pub original_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkAck {
    pub file_id: String,
    pub chunk_index: u32,
    pub received: u32,
    pub total_chunks: u32,
    pub complete: bool,
}

struct UploadSession {
    account_id: i64,
    total_chunks: u32,
    /// index -> byte length
    chunks: BTreeMap<u32, u64>,
    original_name: String,
    mime_type: String,
    last_activity: Instant,
}

impl UploadSession {
    fn bytes_received(&self) -> u64 {
        self.chunks.values().sum()
    }

    fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }
}

pub struct UploadManager {
    sessions: Mutex<HashMap<String, UploadSession>>,
    staging_dir: PathBuf,
    objects: Arc<dyn ObjectStore>,
    max_chunk_size: usize,
    session_ttl: Duration,
}

impl UploadManager {
    pub fn new(
        staging_dir: PathBuf,
        objects: Arc<dyn ObjectStore>,
        max_chunk_size: usize,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            staging_dir,
            objects,
            max_chunk_size,
            session_ttl,
        }
    }

    fn session_dir(&self, file_id: &str) -> PathBuf {
        self.staging_dir.join(file_id)
    }

    fn part_path(&self, file_id: &str, index: u32) -> PathBuf {
        self.session_dir(file_id).join(format!("{index:06}.part"))
    }

    /// Accept one chunk. Chunks may arrive in any order; re-sending an index
    /// replaces it.
    pub async fn upload_chunk(
        &self,
        account_id: i64,
        file_id: &str,
        index: u32,
        meta: ChunkMeta,
        data: Bytes,
    ) -> Result<ChunkAck, CoreError> {
        validate_file_id(file_id)?;
        if meta.total_chunks == 0 || meta.total_chunks > MAX_TOTAL_CHUNKS {
            return Err(CoreError::BadRequest(format!(
                "total chunks must be between 1 and {MAX_TOTAL_CHUNKS}"
            )));
        }
        if index >= meta.total_chunks {
            return Err(CoreError::BadRequest(format!(
                "chunk index {index} is outside 0..{}",
                meta.total_chunks
            )));
        }
        if data.is_empty() {
            return Err(CoreError::BadRequest("empty chunk".into()));
        }
        if data.len() > self.max_chunk_size {
            return Err(CoreError::BadRequest(format!(
                "chunk of {} bytes exceeds the {} byte chunk size",
                data.len(),
                self.max_chunk_size
            )));
        }

        let created = {
            let mut sessions = self.sessions.lock().await;
            let created = !sessions.contains_key(file_id);
            let session = sessions
                .entry(file_id.to_string())
                .or_insert_with(|| UploadSession {
                    account_id,
                    total_chunks: meta.total_chunks,
                    chunks: BTreeMap::new(),
                    original_name: meta.original_name.clone(),
                    mime_type: meta.mime_type.clone(),
                    last_activity: Instant::now(),
                });
            let admitted = check_session(session, account_id, file_id, meta.total_chunks)
                .and_then(|()| {
                    let replaced = session.chunks.get(&index).copied().unwrap_or(0);
                    let projected = session.bytes_received() - replaced + data.len() as u64;
                    if projected > MAX_UPLOAD_FILE_SIZE {
                        return Err(CoreError::BadRequest(format!(
                            "file exceeds the {MAX_UPLOAD_FILE_SIZE} byte limit"
                        )));
                    }
                    Ok(())
                });
            match admitted {
                Ok(()) => session.last_activity = Instant::now(),
                Err(e) => {
                    if created {
                        sessions.remove(file_id);
                    }
                    return Err(e);
                }
            }
            created
        };

        if let Err(e) = self.stage_chunk(file_id, index, &data).await {
            if created {
                self.abandon_if_empty(file_id).await;
            }
            return Err(e);
        }

        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(file_id).ok_or_else(|| {
            CoreError::BadRequest(format!("upload {file_id} was finalized or expired"))
        })?;
        session.chunks.insert(index, data.len() as u64);
        session.last_activity = Instant::now();

        let received = session.chunks.len() as u32;
        tracing::debug!(
            file_id,
            chunk_index = index,
            received,
            total = session.total_chunks,
            "chunk staged"
        );
        Ok(ChunkAck {
            file_id: file_id.to_string(),
            chunk_index: index,
            received,
            total_chunks: session.total_chunks,
            complete: received == session.total_chunks,
        })
    }

    async fn stage_chunk(&self, file_id: &str, index: u32, data: &[u8]) -> Result<(), CoreError> {
        let dir = self.session_dir(file_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Storage(format!("staging dir for {file_id}: {e}")))?;
        tokio::fs::write(self.part_path(file_id, index), data)
            .await
            .map_err(|e| CoreError::Storage(format!("staging chunk {index} of {file_id}: {e}")))
    }

    /// Drop a session that never staged a chunk.
    async fn abandon_if_empty(&self, file_id: &str) {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(file_id) {
                Some(session) if session.chunks.is_empty() => sessions.remove(file_id).is_some(),
                _ => false,
            }
        };
        if removed {
            self.discard_staging(file_id).await;
            tracing::debug!(file_id, "empty upload session dropped");
        }
    }

    /// Assemble every staged chunk in index order into one stored object.
    ///
    /// An incomplete session is left in place so the missing chunks can still
    /// be sent.
    pub async fn finalize(&self, account_id: i64, file_id: &str) -> Result<FileRef, CoreError> {
        validate_file_id(file_id)?;
        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get(file_id)
                .ok_or_else(|| CoreError::NotFound(format!("Upload {file_id}")))?;
            check_session(session, account_id, file_id, session.total_chunks)?;
            let missing = session.missing();
            if !missing.is_empty() {
                return Err(CoreError::IncompleteUpload {
                    file_id: file_id.to_string(),
                    missing,
                });
            }
            sessions
                .remove(file_id)
                .ok_or_else(|| CoreError::NotFound(format!("Upload {file_id}")))?
        };

        match self.assemble_and_store(account_id, file_id, &session).await {
            Ok(file) => {
                self.discard_staging(file_id).await;
                tracing::info!(
                    account_id,
                    file_id,
                    size_bytes = file.size_bytes,
                    chunks = session.total_chunks,
                    "upload finalized"
                );
                Ok(file)
            }
            Err(e) => {
                // keep the staged chunks so finalize can be retried
                self.sessions
                    .lock()
                    .await
                    .insert(file_id.to_string(), session);
                Err(e)
            }
        }
    }

    async fn assemble_and_store(
        &self,
        account_id: i64,
        file_id: &str,
        session: &UploadSession,
    ) -> Result<FileRef, CoreError> {
        let assembled = self.session_dir(file_id).join(ASSEMBLED_NAME);
        let size = self
            .concatenate_parts(file_id, session.total_chunks, &assembled)
            .await?;
        let size_bytes = i64::try_from(size)
            .map_err(|_| CoreError::BadRequest(format!("upload {file_id} is too large")))?;

        let path = object_path(UPLOAD_PREFIX, account_id, &session.mime_type);
        let url = self.objects.put_file(&path, &assembled).await?;
        Ok(file_ref(
            path,
            url,
            &session.original_name,
            &session.mime_type,
            size_bytes,
        ))
    }

    /// Copy the parts into `target` one at a time; returns the bytes written.
    async fn concatenate_parts(
        &self,
        file_id: &str,
        total_chunks: u32,
        target: &Path,
    ) -> Result<u64, CoreError> {
        let assembly_err =
            |e: std::io::Error| CoreError::Storage(format!("assembling {file_id}: {e}"));
        let mut out = tokio::fs::File::create(target).await.map_err(assembly_err)?;
        let mut written = 0u64;
        for index in 0..total_chunks {
            let mut part = tokio::fs::File::open(self.part_path(file_id, index))
                .await
                .map_err(|e| CoreError::Storage(format!("reading chunk {index} of {file_id}: {e}")))?;
            written += tokio::io::copy(&mut part, &mut out)
                .await
                .map_err(assembly_err)?;
        }
        out.flush().await.map_err(assembly_err)?;
        Ok(written)
    }

    /// Single-shot path for files below the chunking threshold.
    pub async fn upload_single(
        &self,
        account_id: i64,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRef, CoreError> {
        if data.is_empty() {
            return Err(CoreError::BadRequest("empty file".into()));
        }
        if data.len() as u64 > MAX_UPLOAD_FILE_SIZE {
            return Err(CoreError::BadRequest(format!(
                "file exceeds the {MAX_UPLOAD_FILE_SIZE} byte limit"
            )));
        }
        let file = self.store(account_id, original_name, mime_type, data).await?;
        tracing::info!(account_id, size_bytes = file.size_bytes, "file uploaded");
        Ok(file)
    }

    async fn store(
        &self,
        account_id: i64,
        original_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileRef, CoreError> {
        let path = object_path(UPLOAD_PREFIX, account_id, mime_type);
        let size_bytes = data.len() as i64;
        let url = self.objects.put(&path, data).await?;
        Ok(file_ref(path, url, original_name, mime_type, size_bytes))
    }

    /// Best-effort removal of stored files that ended up unused.
    pub async fn discard_stored(&self, files: &[FileRef]) {
        for file in files {
            if let Err(e) = self.objects.delete_url(&file.url).await {
                tracing::warn!(url = %file.url, error = %e, "failed to remove orphaned object");
            }
        }
    }

    async fn discard_staging(&self, file_id: &str) {
        let dir = self.session_dir(file_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(file_id, error = %e, "failed to remove staged chunks");
            }
            _ => {}
        }
    }

    /// Drop sessions idle longer than the TTL along with their staged chunks.
    pub async fn sweep_expired(&self) -> usize {
        let expired: Vec<String> = {
            let mut sessions = self.sessions.lock().await;
            let now = Instant::now();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| now.duration_since(s.last_activity) > self.session_ttl)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                sessions.remove(id);
            }
            ids
        };
        for file_id in &expired {
            self.discard_staging(file_id).await;
            tracing::info!(file_id = %file_id, "expired upload session dropped");
        }
        expired.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}

fn check_session(
    session: &UploadSession,
    account_id: i64,
    file_id: &str,
    total_chunks: u32,
) -> Result<(), CoreError> {
    if session.account_id != account_id {
        return Err(CoreError::Forbidden(format!(
            "upload {file_id} belongs to another account"
        )));
    }
    if session.total_chunks != total_chunks {
        return Err(CoreError::BadRequest(format!(
            "upload {file_id} was started with {} chunks, not {total_chunks}",
            session.total_chunks
        )));
    }
    Ok(())
}

/// File ids become directory names; keep them to a safe alphabet.
fn validate_file_id(file_id: &str) -> Result<(), CoreError> {
    let valid = !file_id.is_empty()
        && file_id.len() <= MAX_FILE_ID_LEN
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::BadRequest(format!("invalid file id {file_id:?}")))
    }
}

fn file_ref(
    path: String,
    url: String,
    original_name: &str,
    mime_type: &str,
    size_bytes: i64,
) -> FileRef {
    let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
    FileRef {
        url,
        filename,
        original_name: display_name(original_name),
        mime_type: mime_type.to_string(),
        size_bytes,
    }
}

fn display_name(original_name: &str) -> String {
    let name = original_name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

/// Number of chunks a payload of `size` bytes needs.
pub fn chunk_count(size: usize, chunk_size: usize) -> u32 {
    size.div_ceil(chunk_size.max(1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjectStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixture {
        manager: UploadManager,
        _staging: TempDir,
        objects_dir: TempDir,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let staging = tempfile::tempdir().unwrap();
        let objects_dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(LocalObjectStore::new(
            objects_dir.path().to_path_buf(),
            "http://files.local",
        ));
        Fixture {
            manager: UploadManager::new(staging.path().to_path_buf(), objects, 4, ttl),
            _staging: staging,
            objects_dir,
        }
    }

    fn meta(total: u32) -> ChunkMeta {
        ChunkMeta {
            total_chunks: total,
            original_name: "deck.pdf".into(),
            mime_type: "application/pdf".into(),
        }
    }

    #[tokio::test]
    async fn finalize_requires_every_chunk() {
        let fx = fixture(Duration::from_secs(3600));
        let parts = ["aaaa", "bbbb", "cccc", "dddd", "ee"];
        for index in [4u32, 0, 2, 1] {
            fx.manager
                .upload_chunk(1, "file-1", index, meta(5), Bytes::from(parts[index as usize]))
                .await
                .unwrap();
        }

        match fx.manager.finalize(1, "file-1").await {
            Err(CoreError::IncompleteUpload { missing, .. }) => assert_eq!(missing, vec![3]),
            other => panic!("expected IncompleteUpload, got {other:?}"),
        }

        let ack = fx
            .manager
            .upload_chunk(1, "file-1", 3, meta(5), Bytes::from(parts[3]))
            .await
            .unwrap();
        assert!(ack.complete);

        let file = fx.manager.finalize(1, "file-1").await.unwrap();
        assert_eq!(file.size_bytes, 18);
        assert_eq!(file.original_name, "deck.pdf");
        assert!(file.url.starts_with("http://files.local/uploads/acct_1/"));

        let relative = file.url.trim_start_matches("http://files.local/");
        let stored = tokio::fs::read(fx.objects_dir.path().join(relative)).await.unwrap();
        assert_eq!(stored, b"aaaabbbbccccddddee");
        assert_eq!(fx.manager.active_sessions().await, 0);
        assert!(!fx.manager.staging_dir().join("file-1").exists());
    }

    #[tokio::test]
    async fn session_rules_are_enforced() {
        let fx = fixture(Duration::from_secs(3600));
        fx.manager
            .upload_chunk(1, "file-2", 0, meta(2), Bytes::from_static(b"ab"))
            .await
            .unwrap();

        assert!(matches!(
            fx.manager
                .upload_chunk(2, "file-2", 1, meta(2), Bytes::from_static(b"cd"))
                .await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            fx.manager
                .upload_chunk(1, "file-2", 1, meta(3), Bytes::from_static(b"cd"))
                .await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            fx.manager
                .upload_chunk(1, "file-2", 2, meta(2), Bytes::from_static(b"cd"))
                .await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            fx.manager
                .upload_chunk(1, "../etc", 0, meta(1), Bytes::from_static(b"x"))
                .await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            fx.manager
                .upload_chunk(1, "file-3", 0, meta(1), Bytes::from_static(b"too long"))
                .await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            fx.manager.finalize(1, "nope").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn resending_a_chunk_replaces_it() {
        let fx = fixture(Duration::from_secs(3600));
        fx.manager
            .upload_chunk(1, "f", 0, meta(1), Bytes::from_static(b"old!"))
            .await
            .unwrap();
        let ack = fx
            .manager
            .upload_chunk(1, "f", 0, meta(1), Bytes::from_static(b"new"))
            .await
            .unwrap();
        assert_eq!(ack.received, 1);
        let file = fx.manager.finalize(1, "f").await.unwrap();
        assert_eq!(file.size_bytes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let fx = fixture(Duration::from_secs(60));
        fx.manager
            .upload_chunk(1, "stale", 0, meta(2), Bytes::from_static(b"ab"))
            .await
            .unwrap();
        assert_eq!(fx.manager.sweep_expired().await, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(fx.manager.sweep_expired().await, 1);
        assert_eq!(fx.manager.active_sessions().await, 0);
        assert!(!fx.manager.staging_dir().join("stale").exists());
    }

    #[tokio::test]
    async fn single_shot_upload_stores_whole_file() {
        let fx = fixture(Duration::from_secs(60));
        let file = fx
            .manager
            .upload_single(3, "C:\\Users\\me\\cover.png", "image/png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(file.original_name, "cover.png");
        assert!(file.filename.ends_with(".png"));
        assert_eq!(file.size_bytes, 3);
    }

    /// Accepts only streamed files, so any in-memory assembly fails loudly.
    struct FileOnlyStore {
        received: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStore for FileOnlyStore {
        async fn put(&self, path: &str, _data: Bytes) -> Result<String, CoreError> {
            Err(CoreError::Storage(format!("{path} was sent as one buffer")))
        }

        async fn put_file(&self, path: &str, source: &Path) -> Result<String, CoreError> {
            let bytes = tokio::fs::read(source)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
            self.received.lock().await.push((path.to_string(), bytes));
            Ok(format!("mem://{path}"))
        }

        async fn delete_url(&self, _url: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn finalize_streams_parts_from_disk() {
        let staging = tempfile::tempdir().unwrap();
        let objects = Arc::new(FileOnlyStore {
            received: Mutex::new(Vec::new()),
        });
        let manager = UploadManager::new(
            staging.path().to_path_buf(),
            objects.clone(),
            4,
            Duration::from_secs(60),
        );
        for (index, part) in ["abcd", "efgh", "ij"].into_iter().enumerate() {
            manager
                .upload_chunk(1, "big", index as u32, meta(3), Bytes::from(part))
                .await
                .unwrap();
        }

        let file = manager.finalize(1, "big").await.unwrap();
        assert_eq!(file.size_bytes, 10);
        let received = objects.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, b"abcdefghij");
        assert_eq!(file.url, format!("mem://{}", received[0].0));
        assert!(!staging.path().join("big").exists());
    }

    #[tokio::test]
    async fn failed_staging_write_leaves_no_session() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the staging directory should be
        let blocked = dir.path().join("staging");
        tokio::fs::write(&blocked, b"not a dir").await.unwrap();
        let objects = Arc::new(LocalObjectStore::new(dir.path().join("objects"), "http://f"));
        let manager = UploadManager::new(blocked, objects, 4, Duration::from_secs(60));

        let err = manager
            .upload_chunk(1, "doomed", 0, meta(2), Bytes::from_static(b"ab"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(manager.active_sessions().await, 0);
        assert!(matches!(
            manager.finalize(1, "doomed").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn refused_chunk_does_not_drop_an_existing_session() {
        let fx = fixture(Duration::from_secs(3600));
        fx.manager
            .upload_chunk(1, "kept", 0, meta(2), Bytes::from_static(b"ab"))
            .await
            .unwrap();
        assert!(fx
            .manager
            .upload_chunk(2, "kept", 1, meta(2), Bytes::from_static(b"cd"))
            .await
            .is_err());
        assert_eq!(fx.manager.active_sessions().await, 1);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(10, 4), 3);
        assert_eq!(chunk_count(8, 4), 2);
        assert_eq!(chunk_count(0, 4), 0);
    }
}
