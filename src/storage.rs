use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use tokio::fs::File;
use tracing::info;

use crate::config::Config;
use crate::error::StorageError;

/// Remote key-addressed object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `body` to `key`, tagged with `content_type`.
    async fn put_object(&self, key: &str, content_type: &str, body: File)
        -> Result<(), StorageError>;

    /// Retrievable URL of `key`.
    fn public_url(&self, key: &str) -> String;
}

pub fn s3_object_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }

    /// Client from the default AWS credential chain; `s3_endpoint` points it at an
    /// S3-compatible store instead.
    pub async fn connect(config: &Config) -> Self {
        let region = Region::new(config.s3_region.clone());
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config).region(region);
        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(
            Client::from_conf(builder.build()),
            config.s3_bucket.clone(),
            config.s3_region.clone(),
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: File,
    ) -> Result<(), StorageError> {
        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| StorageError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Put {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        info!("[storage] stored s3://{}/{}", self.bucket, key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        s3_object_url(&self.bucket, &self.region, key)
    }
}
