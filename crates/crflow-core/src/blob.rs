//! Blob storage for attachments and generated approval sheets

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

/// Byte storage addressed by a relative key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, returning the reference to persist
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    async fn get(&self, reference: &str) -> Result<Vec<u8>>;

    /// Remove a blob; removing a missing blob is not an error
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Reject keys that would escape the blob root
fn checked_key(key: &str) -> Result<&Path> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(Error::invalid("file_name", format!("invalid blob key: {}", key)))
    }
}

/// Strip directory parts and odd characters from an uploaded file name
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Blobs as files under a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let rel = checked_key(key)?;
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(key.to_string())
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        let rel = checked_key(reference)?;
        match tokio::fs::read(self.root.join(rel)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("Blob", reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let rel = checked_key(reference)?;
        match tokio::fs::remove_file(self.root.join(rel)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Blobs held in memory, lost on drop
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn contains(&self, reference: &str) -> bool {
        self.blobs.read().await.contains_key(reference)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        checked_key(key)?;
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::not_found("Blob", reference))
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.blobs.write().await.remove(reference);
        Ok(())
    }
}
