//! Filesystem-backed bucket.
//!
//! Each bucket is a directory under a shared root; object names are
//! `/`-separated paths relative to that directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::StorageError;
use crate::interfaces::ObjectStore;

/// A bucket stored as a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    dir: PathBuf,
}

impl LocalObjectStore {
    /// Open `root/bucket`, creating the directory if needed. The directory
    /// is stored in canonical form so object URIs are absolute.
    pub async fn open(root: impl AsRef<Path>, bucket: &str) -> Result<Self, StorageError> {
        let dir = root.as_ref().join(bucket);
        tokio::fs::create_dir_all(&dir).await?;
        let dir = tokio::fs::canonicalize(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory backing this bucket.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !valid {
            return Err(StorageError::invalid_name(name));
        }
        Ok(self.dir.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let suffix = suffix.to_lowercase();
        let mut names = Vec::new();
        let mut pending = vec![self.dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.dir) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if name.starts_with(prefix) && name.to_lowercase().ends_with(&suffix) {
                    names.push(name);
                }
            }
        }

        names.sort();
        debug!(dir = %self.dir.display(), count = names.len(), "Listed objects");
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, body: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), bytes = body.len(), "Wrote object");
        Ok(())
    }

    fn uri(&self, name: &str) -> String {
        format!("file://{}", self.dir.join(name).display())
    }
}
