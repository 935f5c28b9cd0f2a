use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use tracing::{debug, info};

use super::ObjectStore;
use crate::error::StoreError;

/// [`ObjectStore`] backed by S3 buckets.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    region: Option<String>,
}

impl S3Store {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
            region: config.region().map(|r| r.to_string()),
        }
    }

    /// Builds a store from the ambient AWS configuration (env vars, profile,
    /// instance role).
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(&config)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(container);
        // us-east-1 rejects an explicit location constraint
        if let Some(region) = self.region.as_deref().filter(|r| *r != "us-east-1") {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = container, "Bucket created");
                Ok(())
            }
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                }) =>
            {
                debug!(bucket = container, "Bucket already exists");
                Ok(())
            }
            Err(err) => Err(StoreError::backend(container, "", err)),
        }
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(container)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::backend(container, prefix, e))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        keys.sort();
        Ok(keys)
    }

    async fn read_object(&self, container: &str, key: &str) -> Result<Bytes, StoreError> {
        let resp = match self.client.get_object().bucket(container).key(key).send().await {
            Ok(resp) => resp,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StoreError::not_found(container, key));
            }
            Err(err) => return Err(StoreError::backend(container, key, err)),
        };

        let body = resp
            .body
            .collect()
            .await
            .with_context(|| format!("reading body of s3://{container}/{key}"))
            .map_err(|e| StoreError::backend(container, key, e))?;
        Ok(body.into_bytes())
    }

    async fn write_object(&self, container: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| StoreError::backend(container, key, e))?;
        Ok(())
    }
}
