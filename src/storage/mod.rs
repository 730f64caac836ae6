//! Object storage for source images and thumbnails
//! Uses Apache Arrow object_store crate, one store per bucket

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, path::Path as StoragePath};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{StorageConfig, StorageProvider};
use crate::humanize::ByteSize;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("Storage configuration error: {0}")]
    Configuration(String),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Object {bucket}/{key} is {size} bytes, limit is {limit}")]
    TooLarge {
        bucket: String,
        key: String,
        size: u64,
        limit: ByteSize,
    },
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Read/write access to bucketed objects
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch the full content of an object
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Fetch an object unless it is larger than `limit`.
    ///
    /// The size is checked against object metadata before the body is read.
    async fn download_bounded(&self, bucket: &str, key: &str, limit: ByteSize) -> Result<Bytes>;

    /// Create or overwrite an object
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<UploadMetadata>;
}

#[derive(Clone)]
enum Backend {
    S3(StorageConfig),
    Local(PathBuf),
    Memory,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    backend: Backend,
    stores: Arc<Mutex<HashMap<String, Arc<dyn ObjectStore>>>>,
}

impl StorageClient {
    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            stores: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a client for the configured provider
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.provider {
            StorageProvider::S3 => Self::with_backend(Backend::S3(config.clone())),
            StorageProvider::Local => Self::local(config.root.clone()),
        }
    }

    /// Buckets become sub-directories of `root`
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(Backend::Local(root.into()))
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory)
    }

    /// Check if key exists
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let store = self.store(bucket).await?;

        match store.head(&object_path(key)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Content type recorded with an object, if the backend keeps one
    pub async fn content_type(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        let store = self.store(bucket).await?;
        let result = store
            .get(&object_path(key)?)
            .await
            .map_err(|e| not_found(e, bucket, key))?;

        Ok(result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string()))
    }

    async fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store = self.build_store(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(StorageError::Configuration(format!(
                "invalid bucket name '{bucket}'"
            )));
        }

        match &self.backend {
            Backend::Memory => Ok(Arc::new(InMemory::new())),
            Backend::Local(root) => {
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir).map_err(|e| {
                    StorageError::Configuration(format!(
                        "cannot create bucket directory {}: {e}",
                        dir.display()
                    ))
                })?;
                Ok(Arc::new(LocalFileSystem::new_with_prefix(dir)?))
            }
            Backend::S3(config) => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }
                if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
                    builder = builder
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key);
                }

                tracing::debug!(bucket, "Created S3 object store");
                Ok(Arc::new(builder.build()?))
            }
        }
    }

    // The filesystem backend has nowhere to keep object attributes.
    fn keeps_attributes(&self) -> bool {
        !matches!(self.backend, Backend::Local(_))
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self.store(bucket).await?;
        let path = object_path(key)?;

        let result = store
            .get(&path)
            .await
            .map_err(|e| not_found(e, bucket, key))?;
        let bytes = result.bytes().await?;

        tracing::info!(bucket, key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    async fn download_bounded(&self, bucket: &str, key: &str, limit: ByteSize) -> Result<Bytes> {
        let store = self.store(bucket).await?;
        let path = object_path(key)?;

        let result = store
            .get(&path)
            .await
            .map_err(|e| not_found(e, bucket, key))?;

        // Dropping the result abandons the body stream unread
        let size = result.meta.size;
        if limit.is_exceeded_by(size) {
            return Err(StorageError::TooLarge {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size,
                limit,
            });
        }

        let bytes = result.bytes().await?;
        tracing::info!(bucket, key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<UploadMetadata> {
        let store = self.store(bucket).await?;
        let path = object_path(key)?;
        let size = data.len();

        let mut attributes = Attributes::new();
        if self.keeps_attributes() {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let put_result = store.put_opts(&path, data.into(), options).await?;

        tracing::info!(bucket, key, size, content_type, "Uploaded to storage");

        Ok(UploadMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: put_result.e_tag,
            size,
        })
    }
}

/// Object keys are used verbatim: no percent-encoding, no segment collapsing
fn object_path(key: &str) -> Result<StoragePath> {
    StoragePath::parse(key).map_err(|e| StorageError::InvalidKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn not_found(error: object_store::Error, bucket: &str, key: &str) -> StorageError {
    match error {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        other => other.into(),
    }
}
