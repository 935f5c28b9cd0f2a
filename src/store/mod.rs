//! Object storage.
//!
//! [`ObjectStore`] is the async trait every task reads and writes through.
//! [`S3Store`] talks to AWS S3 (or any S3-compatible endpoint),
//! [`LocalStore`] maps containers to directories under a root path, and
//! [`MemoryStore`] keeps everything in process for tests.

mod local;
mod memory;
mod s3;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates a container; succeeds if it already exists.
    async fn create_container(&self, container: &str) -> Result<(), StoreError>;

    /// Keys under `prefix`, in ascending order.
    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Reads a whole object. Absent keys yield [`StoreError::NotFound`].
    async fn read_object(&self, container: &str, key: &str) -> Result<Bytes, StoreError>;

    async fn write_object(&self, container: &str, key: &str, body: Bytes) -> Result<(), StoreError>;

    /// Reads every object in a container as `(key, body)` pairs.
    async fn read_all_objects(&self, container: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        let mut objects = Vec::new();
        for key in self.list_objects(container, "").await? {
            let body = self.read_object(container, &key).await?;
            objects.push((key, body));
        }
        Ok(objects)
    }
}
