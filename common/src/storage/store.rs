use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    path::Path as ObjPath, Attribute, Attributes, ObjectStore, PutOptions, PutPayload,
};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::utils::config::{AppConfig, StorageKind};
use crate::utils::retry::RetryPolicy;

pub type DynStore = Arc<dyn ObjectStore>;

/// Upload progress observer, called with `(bytes_sent, bytes_total)`.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Byte-content access to the bucket holding uploads and pipeline outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the full object at `key`. A missing object is `AppError::NotFound`.
    async fn get(&self, key: &str) -> Result<Bytes, AppError>;

    /// Store `data` at `key` and return the key it was written to.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<String, AppError>;

    /// Whether an object is present at `key`.
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

/// Object-store backed artifact storage with persistent state.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
    retry: RetryPolicy,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    pub async fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
            retry: RetryPolicy::from_config(cfg),
        })
    }

    /// Create a StorageManager with a custom storage backend.
    ///
    /// This method is useful for testing scenarios where you want to inject
    /// a specific storage backend.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
            retry: RetryPolicy::none(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the storage backend kind.
    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Access the resolved local base directory when using the local backend.
    pub fn local_base_path(&self) -> Option<&std::path::Path> {
        self.local_base.as_deref()
    }

    fn put_options(&self, content_type: &str) -> PutOptions {
        // The local backend rejects object attributes.
        if matches!(self.backend_kind, StorageKind::Local) || content_type.is_empty() {
            return PutOptions::default();
        }
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

fn map_store_error(location: &str, err: object_store::Error) -> AppError {
    match err {
        object_store::Error::NotFound { .. } => AppError::NotFound(location.to_string()),
        other => AppError::Storage(other),
    }
}

#[async_trait]
impl ArtifactStore for StorageManager {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Bytes, AppError> {
        let path = ObjPath::from(key);
        self.retry
            .run("artifact_get", || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                async move {
                    let result = store.get(&path).await.map_err(|e| map_store_error(key, e))?;
                    result.bytes().await.map_err(|e| map_store_error(key, e))
                }
            })
            .await
    }

    #[instrument(level = "debug", skip(self, data, on_progress), fields(bytes = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<String, AppError> {
        let total = data.len() as u64;
        if let Some(report) = on_progress {
            report(0, total);
        }

        let path = ObjPath::from(key);
        let options = self.put_options(content_type);
        self.retry
            .run("artifact_put", || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                let payload = PutPayload::from_bytes(data.clone());
                let options = options.clone();
                async move {
                    store
                        .put_opts(&path, payload, options)
                        .await
                        .map(|_| ())
                        .map_err(|e| map_store_error(key, e))
                }
            })
            .await?;

        if let Some(report) = on_progress {
            report(total, total);
        }
        debug!(key, content_type, "artifact stored");
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let path = ObjPath::from(key);
        self.retry
            .run("artifact_exists", || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                async move {
                    match store.head(&path).await {
                        Ok(_) => Ok(true),
                        Err(object_store::Error::NotFound { .. }) => Ok(false),
                        Err(err) => Err(AppError::Storage(err)),
                    }
                }
            })
            .await
    }
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> Result<(DynStore, Option<PathBuf>), AppError> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
        StorageKind::S3 => {
            let bucket = cfg.s3_bucket.as_deref().ok_or_else(|| {
                AppError::Validation("s3_bucket must be set for the s3 storage backend".into())
            })?;
            let store = AmazonS3Builder::from_env()
                .with_region(&cfg.aws_region)
                .with_bucket_name(bucket)
                .build()?;
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

/// In-memory storage for tests in this and dependent crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;

    /// A StorageManager over a fresh `InMemory` backend, without retries.
    pub fn memory_storage() -> StorageManager {
        StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory)
    }
}
