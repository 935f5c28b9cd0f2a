use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::ObjectStore;
use crate::error::StoreError;

type Containers = BTreeMap<String, BTreeMap<String, Bytes>>;

/// In-process [`ObjectStore`]. Like S3, containers must exist before they
/// are read from or written to.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: Mutex<Containers>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object, creating its container if needed.
    pub fn insert(&self, container: &str, key: &str, body: impl Into<Bytes>) {
        self.lock()
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    pub fn get(&self, container: &str, key: &str) -> Option<Bytes> {
        self.lock().get(container)?.get(key).cloned()
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.lock()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Containers> {
        // a poisoned map is still structurally valid
        self.containers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn no_container(container: &str, key: &str) -> StoreError {
    StoreError::backend(container, key, anyhow::anyhow!("container does not exist"))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.lock().entry(container.to_string()).or_default();
        Ok(())
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let containers = self.lock();
        let objects = containers
            .get(container)
            .ok_or_else(|| no_container(container, prefix))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn read_object(&self, container: &str, key: &str) -> Result<Bytes, StoreError> {
        let containers = self.lock();
        let objects = containers
            .get(container)
            .ok_or_else(|| no_container(container, key))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(container, key))
    }

    async fn write_object(&self, container: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        let mut containers = self.lock();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| no_container(container, key))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_requires_container() {
        let store = MemoryStore::new();
        let err = store
            .write_object("rs-transit", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());

        store.create_container("rs-transit").await.unwrap();
        store
            .write_object("rs-transit", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(store.get("rs-transit", "a.txt").unwrap().as_ref(), b"x");
    }

    #[tokio::test]
    async fn test_read_all_objects_in_key_order() {
        let store = MemoryStore::new();
        store.insert("cl-gcabs", "b.csv", "2");
        store.insert("cl-gcabs", "a.csv", "1");

        let objects = store.read_all_objects("cl-gcabs").await.unwrap();
        let keys: Vec<_> = objects.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a.csv", "b.csv"]);
        assert!(store.read_object("cl-gcabs", "c.csv").await.unwrap_err().is_not_found());
    }
}
