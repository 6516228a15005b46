//! Remote archive transport.
//!
//! Optional off-site copies of verified artifacts in an S3-compatible
//! bucket. Each store's archives live under their own logical prefix
//! (`vector/`, `relational/`) plus a `metadata/` prefix for the records, so
//! a partial-provider outage is diagnosable per store. Upload is best-effort
//! from the backup orchestrator's point of view: losing the off-site copy is
//! recoverable next cycle, losing the local copy is not.

use crate::config::RemoteConfig;
use crate::metadata::{archive_file_name, metadata_file_name};
use crate::{BrdrError, Result, StoreKind};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info};

/// Upload/download seam so orchestrator tests can run without a bucket.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Upload one store archive for the given timestamp key.
    async fn upload(&self, kind: StoreKind, path: &Path, ts: &str) -> Result<()>;

    /// Upload the metadata record for the given timestamp key.
    async fn upload_metadata(&self, path: &Path, ts: &str) -> Result<()>;

    /// Download one store archive into `dest`; `NotFound` when the key is
    /// absent.
    async fn download(&self, kind: StoreKind, ts: &str, dest: &Path) -> Result<()>;

    /// Download the metadata record into `dest`.
    async fn download_metadata(&self, ts: &str, dest: &Path) -> Result<()>;
}

/// S3-compatible implementation (AWS, MinIO, LocalStack).
pub struct S3Transport {
    client: Client,
    config: RemoteConfig,
}

impl S3Transport {
    /// Build a client from the remote configuration. Credentials come from
    /// the ambient environment/instance profile, never from kbvault config.
    pub async fn new(config: RemoteConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        Ok(Self { client, config })
    }

    fn key(&self, subdir: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.config.prefix, subdir, file_name)
    }

    async fn put(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BrdrError::TransportFailure(format!("reading {}: {}", path.display(), e)))?;
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| BrdrError::TransportFailure(format!("put {key}: {e}")))?;
        debug!(key = %key, "uploaded object");
        Ok(())
    }

    async fn get(&self, key: &str, dest: &Path, ts: &str) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    BrdrError::NotFound {
                        timestamp: ts.to_string(),
                    }
                } else {
                    BrdrError::TransportFailure(format!("get {key}: {service_error}"))
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| BrdrError::TransportFailure(format!("reading body of {key}: {e}")))?
            .into_bytes();
        tokio::fs::write(dest, &bytes).await?;
        info!(key = %key, bytes = bytes.len(), dest = %dest.display(), "downloaded object");
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for S3Transport {
    async fn upload(&self, kind: StoreKind, path: &Path, ts: &str) -> Result<()> {
        let key = self.key(kind.as_str(), &archive_file_name(kind, ts));
        self.put(&key, path).await
    }

    async fn upload_metadata(&self, path: &Path, ts: &str) -> Result<()> {
        let key = self.key("metadata", &metadata_file_name(ts));
        self.put(&key, path).await
    }

    async fn download(&self, kind: StoreKind, ts: &str, dest: &Path) -> Result<()> {
        let key = self.key(kind.as_str(), &archive_file_name(kind, ts));
        self.get(&key, dest, ts).await
    }

    async fn download_metadata(&self, ts: &str, dest: &Path) -> Result<()> {
        let key = self.key("metadata", &metadata_file_name(ts));
        self.get(&key, dest, ts).await
    }
}
