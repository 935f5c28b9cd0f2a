use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::ObjectStore;
use crate::error::StoreError;

/// [`ObjectStore`] over a directory tree: `<root>/<container>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, container: &str, key: &str) -> PathBuf {
        self.root.join(container).join(key)
    }
}

/// Relative `/`-separated keys of every file under `dir`.
fn walk(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                let key: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                keys.push(key.join("/"));
            }
        }
    }
    Ok(keys)
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.root.join(container))
            .await
            .map_err(|e| StoreError::backend(container, "", e))
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(container);
        let mut keys = tokio::task::spawn_blocking(move || walk(&dir))
            .await
            .map_err(|e| StoreError::backend(container, prefix, e))?
            .map_err(|e| StoreError::backend(container, prefix, e))?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn read_object(&self, container: &str, key: &str) -> Result<Bytes, StoreError> {
        match tokio::fs::read(self.path(container, key)).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::not_found(container, key)),
            Err(e) => Err(StoreError::backend(container, key, e)),
        }
    }

    async fn write_object(&self, container: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        let path = self.path(container, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::backend(container, key, e))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError::backend(container, key, e))
    }
}
