//! Durable object storage for uploaded and delivered files.
//!
//! GCS in production, a local directory for development. Every `put` writes
//! a fresh path, so re-uploading the same bytes yields a new reference.
//! `put_file` streams from disk for payloads too large to hold in memory.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use google_cloud_storage::client::{Storage, StorageControl};
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` at `path` and return its public URL.
    async fn put(&self, path: &str, data: Bytes) -> Result<String, CoreError>;

    /// Store the file at `source` at `path` without reading it into memory.
    async fn put_file(&self, path: &str, source: &Path) -> Result<String, CoreError>;

    /// Remove an object by the URL `put` returned. URLs this store did not
    /// issue are ignored, as are objects already gone.
    async fn delete_url(&self, url: &str) -> Result<(), CoreError>;
}

pub struct GcsObjectStore {
    client: Storage,
    control: StorageControl,
    bucket: String,
}

impl GcsObjectStore {
    pub fn new(client: Storage, control: StorageControl, bucket: &str) -> Self {
        Self {
            client,
            control,
            bucket: bucket.to_string(),
        }
    }

    fn bucket_name(&self) -> String {
        format!("projects/_/buckets/{}", self.bucket)
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket, path)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, path: &str, data: Bytes) -> Result<String, CoreError> {
        self.client
            .write_object(self.bucket_name(), path, data)
            .send_buffered()
            .await
            .map_err(|e| CoreError::Storage(format!("GCS write {path} failed: {e}")))?;
        Ok(self.public_url(path))
    }

    async fn put_file(&self, path: &str, source: &Path) -> Result<String, CoreError> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| CoreError::Storage(format!("open {}: {e}", source.display())))?;
        // resumable upload, sent a piece at a time
        self.client
            .write_object(self.bucket_name(), path, file)
            .send_unbuffered()
            .await
            .map_err(|e| CoreError::Storage(format!("GCS write {path} failed: {e}")))?;
        Ok(self.public_url(path))
    }

    async fn delete_url(&self, url: &str) -> Result<(), CoreError> {
        let Some(path) = url.strip_prefix(&self.public_url("")) else {
            return Ok(());
        };
        self.control
            .delete_object()
            .set_bucket(self.bucket_name())
            .set_object(path)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| CoreError::Storage(format!("GCS delete {path} failed: {e}")))
    }
}

pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn prepare(&self, path: &str) -> Result<PathBuf, CoreError> {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Ok(full_path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, data: Bytes) -> Result<String, CoreError> {
        let full_path = self.prepare(path).await?;
        tokio::fs::write(&full_path, &data)
            .await
            .map_err(|e| CoreError::Storage(format!("write {}: {e}", full_path.display())))?;
        Ok(format!("{}/{}", self.public_base_url, path))
    }

    async fn put_file(&self, path: &str, source: &Path) -> Result<String, CoreError> {
        let full_path = self.prepare(path).await?;
        tokio::fs::copy(source, &full_path)
            .await
            .map_err(|e| CoreError::Storage(format!("copy to {}: {e}", full_path.display())))?;
        Ok(format!("{}/{}", self.public_base_url, path))
    }

    async fn delete_url(&self, url: &str) -> Result<(), CoreError> {
        let Some(path) = url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(());
        };
        if path.split('/').any(|part| part == "..") {
            return Err(CoreError::BadRequest(format!("invalid object path {path}")));
        }
        let full_path = self.root.join(path);
        match tokio::fs::remove_file(&full_path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CoreError::Storage(
                format!("remove {}: {e}", full_path.display()),
            )),
            _ => Ok(()),
        }
    }
}

/// Map a MIME type to a file extension.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// Fresh object path: `{prefix}/acct_{id}/{date}/{millis}_{rand}.{ext}`
pub fn object_path(prefix: &str, account_id: i64, mime_type: &str) -> String {
    let now = Utc::now();
    let suffix: u32 = rand::rng().random();
    format!(
        "{}/acct_{}/{}/{}_{:08x}.{}",
        prefix,
        account_id,
        now.format("%Y-%m-%d"),
        now.timestamp_millis(),
        suffix,
        extension_for(mime_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_unique_and_scoped() {
        let a = object_path("deliveries", 7, "application/pdf");
        let b = object_path("deliveries", 7, "application/pdf");
        assert_ne!(a, b);
        assert!(a.starts_with("deliveries/acct_7/"));
        assert!(a.ends_with(".pdf"));
        assert!(object_path("uploads", 1, "application/x-unknown").ends_with(".bin"));
    }

    #[tokio::test]
    async fn local_store_writes_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "http://localhost:3000/files/");
        let url = store
            .put("uploads/acct_1/a.txt", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/files/uploads/acct_1/a.txt");
        let written = tokio::fs::read(dir.path().join("uploads/acct_1/a.txt")).await.unwrap();
        assert_eq!(written, b"hi");
    }

    #[tokio::test]
    async fn local_store_deletes_only_its_own_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "http://files.local");
        let url = store
            .put("deliveries/acct_1/x.pdf", Bytes::from_static(b"pdf"))
            .await
            .unwrap();

        store.delete_url("https://elsewhere.test/deliveries/acct_1/x.pdf").await.unwrap();
        assert!(dir.path().join("deliveries/acct_1/x.pdf").exists());

        store.delete_url(&url).await.unwrap();
        assert!(!dir.path().join("deliveries/acct_1/x.pdf").exists());
        // already gone
        store.delete_url(&url).await.unwrap();
        assert!(store.delete_url("http://files.local/../escape").await.is_err());
    }

    #[tokio::test]
    async fn local_store_copies_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("assembled");
        tokio::fs::write(&source, b"whole file").await.unwrap();
        let store = LocalObjectStore::new(dir.path().join("objects"), "http://files.local");

        let url = store.put_file("uploads/acct_2/b.bin", &source).await.unwrap();
        assert_eq!(url, "http://files.local/uploads/acct_2/b.bin");
        let written = tokio::fs::read(dir.path().join("objects/uploads/acct_2/b.bin"))
            .await
            .unwrap();
        assert_eq!(written, b"whole file");
    }
}
