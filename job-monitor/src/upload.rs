use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        job_store::JobRecordStore,
        store::{ArtifactStore, ProgressFn},
        types::job_record::JobRecord,
    },
    utils::{
        config::AppConfig,
        upload_limits::{validate_upload, UploadValidationError},
    },
};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    key_codec::KeyCodec,
    session::{Session, ANONYMOUS_USER},
};

#[derive(Debug, Error)]
pub enum UploadError {
    /// Raised before any network call.
    #[error("Upload rejected: {0}")]
    Rejected(#[from] UploadValidationError),
    #[error("Upload failed: {0}")]
    Storage(#[from] AppError),
}

/// Stores an input file and registers its job record at `UPLOADED`.
#[derive(Clone)]
pub struct UploadService {
    codec: KeyCodec,
    config: Arc<AppConfig>,
    store: Arc<dyn ArtifactStore>,
    records: Arc<dyn JobRecordStore>,
    session: Arc<dyn Session>,
}

impl UploadService {
    pub fn new(
        codec: KeyCodec,
        config: Arc<AppConfig>,
        store: Arc<dyn ArtifactStore>,
        records: Arc<dyn JobRecordStore>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            codec,
            config,
            store,
            records,
            session,
        }
    }

    /// Returns the created record; its `job_id` is what monitoring should be started with.
    #[instrument(skip(self, data, on_progress), fields(bytes = data.len()))]
    pub async fn upload(
        &self,
        file_name: &str,
        data: Bytes,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<JobRecord, UploadError> {
        let file_size = data.len() as u64;
        validate_upload(&self.config, file_name, file_size)?;

        let job_id = self.codec.generate_job_id(file_name);
        let key = self
            .codec
            .derive_input_key(&job_id, file_name)
            .ok_or_else(|| AppError::Validation(format!("cannot derive input key for {job_id}")))?;
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();

        let stored_key = self
            .store
            .put(&key, data, &content_type, on_progress)
            .await?;

        let user_id = self
            .session
            .current_user()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        let record = JobRecord::new_uploaded(
            job_id,
            user_id,
            file_name.to_string(),
            file_size,
            content_type,
            stored_key,
        );
        let created = self.records.create(record).await?;
        info!(job_id = %created.job_id, key = %created.s3_upload_key, "upload registered");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use common::{
        storage::{
            db::SurrealDbClient,
            job_store::SurrealJobStore,
            store::{testing::memory_storage, StorageManager},
            types::job_record::JobStatus,
        },
        utils::config::KeyScheme,
    };
    use uuid::Uuid;

    use crate::{key_codec::canonicalize, session::StaticSession};

    /// Counts writes before delegating to in-memory storage.
    struct CountingStore {
        inner: StorageManager,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Bytes, AppError> {
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
            on_progress: Option<&ProgressFn<'_>>,
        ) -> Result<String, AppError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, data, content_type, on_progress).await
        }

        async fn exists(&self, key: &str) -> Result<bool, AppError> {
            self.inner.exists(key).await
        }
    }

    struct Fixture {
        service: UploadService,
        store: Arc<CountingStore>,
        records: Arc<SurrealJobStore>,
    }

    async fn fixture(config: AppConfig, session: StaticSession) -> Fixture {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let records = Arc::new(SurrealJobStore::new(Arc::new(db), "job_records"));
        let store = Arc::new(CountingStore {
            inner: memory_storage(),
            puts: AtomicUsize::new(0),
        });
        let service = UploadService::new(
            KeyCodec::from_config(&config),
            Arc::new(config),
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&records) as Arc<dyn JobRecordStore>,
            Arc::new(session),
        );
        Fixture {
            service,
            store,
            records,
        }
    }

    #[tokio::test]
    async fn upload_stores_file_and_creates_record() {
        let fx = fixture(AppConfig::default(), StaticSession::logged_in("user123")).await;
        let seen = Mutex::new(Vec::new());
        let report: &ProgressFn<'_> = &|sent, total| {
            seen.lock().expect("progress lock").push((sent, total));
        };

        let record = fx
            .service
            .upload("meeting.mp3", Bytes::from_static(b"ID3audio"), Some(report))
            .await
            .expect("upload");

        assert_eq!(record.status, JobStatus::Uploaded);
        assert_eq!(record.user_id, "user123");
        assert_eq!(record.file_size, 8);
        assert_eq!(record.file_type, "audio/mpeg");
        assert_eq!(canonicalize(&record.job_id), Some(record.job_id.as_str()));
        assert_eq!(
            record.s3_upload_key,
            format!("input-data/{}_meeting.mp3", record.job_id)
        );

        let stored = fx
            .store
            .get(&record.s3_upload_key)
            .await
            .expect("stored input");
        assert_eq!(stored.as_ref(), b"ID3audio");
        assert_eq!(*seen.lock().expect("progress lock"), vec![(0, 8), (8, 8)]);

        let persisted = fx
            .records
            .get(&record.job_id)
            .await
            .expect("get")
            .expect("record persisted");
        assert_eq!(persisted.file_name, "meeting.mp3");
    }

    #[tokio::test]
    async fn rejected_files_never_reach_storage() {
        let config = AppConfig {
            max_upload_bytes: 4,
            ..Default::default()
        };
        let fx = fixture(config, StaticSession::logged_in("user123")).await;

        let unsupported = fx
            .service
            .upload("slides.pdf", Bytes::from_static(b"%PDF"), None)
            .await;
        assert!(matches!(
            unsupported,
            Err(UploadError::Rejected(UploadValidationError::UnsupportedType(_)))
        ));

        let too_large = fx
            .service
            .upload("notes.txt", Bytes::from_static(b"12345"), None)
            .await;
        assert!(matches!(
            too_large,
            Err(UploadError::Rejected(UploadValidationError::PayloadTooLarge(_)))
        ));

        assert_eq!(fx.store.puts.load(Ordering::SeqCst), 0);
        assert!(fx.records.list("user123").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn anonymous_owner_without_session() {
        let config = AppConfig {
            key_scheme: KeyScheme::Basename,
            ..Default::default()
        };
        let fx = fixture(config, StaticSession::default()).await;

        let record = fx
            .service
            .upload("captions.vtt", Bytes::from_static(b"WEBVTT"), None)
            .await
            .expect("upload");

        assert_eq!(record.user_id, ANONYMOUS_USER);
        assert!(record.job_id.ends_with("_captions"));
        assert_eq!(record.s3_upload_key, format!("input-data/{}", record.job_id));
    }
}
