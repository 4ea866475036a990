//! Durable persistence for the document.
//!
//! One JSON file, rewritten wholesale on every mutation: serialize into a
//! sibling `.tmp` file, fsync, then atomically rename over the target. The
//! document is never written in place, so a crash mid-write leaves the
//! previous version intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::model::Document;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the persisted document, or `None` on first start.
    async fn load(&self) -> anyhow::Result<Option<Document>>;

    /// Durably replace the persisted document.
    async fn save(&self, doc: &Document) -> anyhow::Result<()>;
}

/// File-backed store with atomic tmp-and-rename writes.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load(&self) -> anyhow::Result<Option<Document>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let doc: Document = serde_json::from_slice(&bytes)?;
        Ok(Some(doc))
    }

    async fn save(&self, doc: &Document) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
