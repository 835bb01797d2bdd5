use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        store::ArtifactStore,
        types::{artifact::ArtifactKind, job_record::JobRecord},
    },
    utils::config::AppConfig,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    key_codec::{canonicalize, extract_embedded_file_name, KeyCodec},
    results::{self, SentimentResult},
};

#[derive(Debug, Error)]
pub enum DownloadError {
    /// No storage call was made.
    #[error("Malformed job identifier: {0}")]
    MalformedIdentifier(String),
    #[error("Failed to download {kind} for job {job_id}: {source}")]
    DownloadFailed {
        job_id: String,
        kind: ArtifactKind,
        #[source]
        source: AppError,
    },
}

/// "Save as file" collaborator. Saving is synchronous; the downloader runs it on the
/// blocking pool.
pub trait FileSaver: Send + Sync {
    fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> Result<(), AppError>;
}

/// Writes downloads into a directory, using the suggested name.
#[derive(Debug, Clone)]
pub struct FsFileSaver {
    dir: PathBuf,
}

impl FsFileSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `suggested_name` ends up; path separators are flattened.
    pub fn target_path(&self, suggested_name: &str) -> PathBuf {
        self.dir.join(suggested_name.replace(['/', '\\'], "_"))
    }
}

impl FileSaver for FsFileSaver {
    fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.target_path(suggested_name);
        std::fs::write(&path, bytes)?;
        info!(path = %path.display(), mime_type, bytes = bytes.len(), "artifact saved");
        Ok(())
    }
}

/// MIME type handed to the file saver, per artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMimeTypes {
    pub transcript: String,
    pub summary: String,
    pub sentiment: String,
}

impl ArtifactMimeTypes {
    /// Follows the stored object's extension under `codec`'s scheme.
    pub fn for_codec(codec: &KeyCodec) -> Self {
        let mime = |kind: ArtifactKind| {
            match codec.extension(kind) {
                "txt" => "text/plain; charset=utf-8",
                "html" => "text/html; charset=utf-8",
                "md" => "text/markdown; charset=utf-8",
                "json" => "application/json",
                "tar.gz" => "application/gzip",
                _ => "application/octet-stream",
            }
            .to_string()
        };
        Self {
            transcript: mime(ArtifactKind::Transcript),
            summary: mime(ArtifactKind::Summary),
            sentiment: mime(ArtifactKind::Sentiment),
        }
    }

    /// Codec defaults with the deployment's overrides applied.
    pub fn from_config(config: &AppConfig, codec: &KeyCodec) -> Self {
        let defaults = Self::for_codec(codec);
        Self {
            transcript: config
                .transcript_mime
                .clone()
                .unwrap_or(defaults.transcript),
            summary: config.summary_mime.clone().unwrap_or(defaults.summary),
            sentiment: config.sentiment_mime.clone().unwrap_or(defaults.sentiment),
        }
    }

    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Transcript => &self.transcript,
            ArtifactKind::Summary => &self.summary,
            ArtifactKind::Sentiment => &self.sentiment,
        }
    }
}

/// Fetches pipeline outputs by job identifier and hands them to a [`FileSaver`].
///
/// No retries happen here; those belong to the artifact store.
#[derive(Clone)]
pub struct ArtifactDownloader {
    codec: KeyCodec,
    store: Arc<dyn ArtifactStore>,
    saver: Arc<dyn FileSaver>,
    mime_types: ArtifactMimeTypes,
}

impl ArtifactDownloader {
    pub fn new(
        codec: KeyCodec,
        store: Arc<dyn ArtifactStore>,
        saver: Arc<dyn FileSaver>,
        mime_types: ArtifactMimeTypes,
    ) -> Self {
        Self {
            codec,
            store,
            saver,
            mime_types,
        }
    }

    pub fn mime_types(&self) -> &ArtifactMimeTypes {
        &self.mime_types
    }

    pub fn artifact_key(&self, job_id: &str, kind: ArtifactKind) -> Result<String, DownloadError> {
        self.codec
            .derive_output_key(job_id, kind)
            .ok_or_else(|| DownloadError::MalformedIdentifier(job_id.to_string()))
    }

    /// `<base>_<kind>.<ext>`, where `<base>` is the embedded file name, else `file_stem`,
    /// else the clean identifier.
    pub fn suggested_file_name(
        &self,
        job_id: &str,
        kind: ArtifactKind,
        file_stem: Option<&str>,
    ) -> String {
        let base = extract_embedded_file_name(job_id)
            .or(file_stem.filter(|stem| !stem.is_empty()))
            .or_else(|| canonicalize(job_id))
            .unwrap_or(job_id);
        format!("{base}_{}.{}", kind.as_str(), self.codec.extension(kind))
    }

    /// Raw artifact bytes, without saving.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, job_id: &str, kind: ArtifactKind) -> Result<Bytes, DownloadError> {
        let key = self.artifact_key(job_id, kind)?;
        self.store.get(&key).await.map_err(|source| {
            warn!(job_id, %kind, key, error = %source, "artifact download failed");
            DownloadError::DownloadFailed {
                job_id: job_id.to_string(),
                kind,
                source,
            }
        })
    }

    /// Fetches the artifact and saves it unchanged under its suggested name and MIME type.
    pub async fn download(&self, job_id: &str, kind: ArtifactKind) -> Result<Bytes, DownloadError> {
        self.download_named(job_id, kind, None).await
    }

    /// Like [`Self::download`], falling back to the record's file name for the suggested name.
    pub async fn download_for_record(
        &self,
        record: &JobRecord,
        kind: ArtifactKind,
    ) -> Result<Bytes, DownloadError> {
        self.download_named(&record.job_id, kind, record.file_stem())
            .await
    }

    async fn download_named(
        &self,
        job_id: &str,
        kind: ArtifactKind,
        file_stem: Option<&str>,
    ) -> Result<Bytes, DownloadError> {
        let bytes = self.fetch(job_id, kind).await?;
        let name = self.suggested_file_name(job_id, kind, file_stem);

        // Savers are synchronous and may touch the filesystem.
        let saver = Arc::clone(&self.saver);
        let payload = bytes.clone();
        let save_name = name.clone();
        let mime_type = self.mime_types.get(kind).to_string();
        tokio::task::spawn_blocking(move || saver.save(&payload, &save_name, &mime_type))
            .await
            .map_err(|err| AppError::Io(std::io::Error::other(err)))
            .and_then(|saved| saved)
            .map_err(|source| DownloadError::DownloadFailed {
                job_id: job_id.to_string(),
                kind,
                source,
            })?;
        info!(job_id, %kind, name, "artifact downloaded");
        Ok(bytes)
    }

    pub async fn transcript(&self, job_id: &str) -> Result<String, DownloadError> {
        let bytes = self.fetch(job_id, ArtifactKind::Transcript).await?;
        results::transcript_text(&bytes).map_err(|source| DownloadError::DownloadFailed {
            job_id: job_id.to_string(),
            kind: ArtifactKind::Transcript,
            source,
        })
    }

    pub async fn sentiment(&self, job_id: &str) -> Result<SentimentResult, DownloadError> {
        let bytes = self.fetch(job_id, ArtifactKind::Sentiment).await?;
        results::sentiment_scores(&bytes).map_err(|source| DownloadError::DownloadFailed {
            job_id: job_id.to_string(),
            kind: ArtifactKind::Sentiment,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use common::{
        storage::store::{testing::memory_storage, StorageManager},
        utils::config::{KeyScheme, SummaryFormat},
    };

    const JOB_ID: &str = "job_1718000000000_k3j9x2abc_standup";

    type Saved = (Vec<u8>, String, String);

    #[derive(Default)]
    struct RecordingSaver {
        saved: Mutex<Vec<Saved>>,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl RecordingSaver {
        fn saved(&self) -> Vec<Saved> {
            self.saved.lock().expect("saver lock").clone()
        }
    }

    impl FileSaver for RecordingSaver {
        fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> Result<(), AppError> {
            self.threads
                .lock()
                .expect("saver lock")
                .push(std::thread::current().id());
            self.saved.lock().expect("saver lock").push((
                bytes.to_vec(),
                suggested_name.to_string(),
                mime_type.to_string(),
            ));
            Ok(())
        }
    }

    fn downloader(
        codec: KeyCodec,
        storage: StorageManager,
    ) -> (ArtifactDownloader, Arc<RecordingSaver>) {
        let saver = Arc::new(RecordingSaver::default());
        let downloader = ArtifactDownloader::new(
            codec,
            Arc::new(storage),
            Arc::clone(&saver) as Arc<dyn FileSaver>,
            ArtifactMimeTypes::for_codec(&codec),
        );
        (downloader, saver)
    }

    async fn put(storage: &StorageManager, key: &str, body: &'static [u8]) {
        storage
            .put(key, Bytes::from_static(body), "", None)
            .await
            .expect("seed artifact");
    }

    #[tokio::test]
    async fn download_hands_bytes_unchanged_to_saver() {
        let storage = memory_storage();
        put(
            &storage,
            "output-transcribe/transcribe_job_1718000000000_k3j9x2abc.txt",
            b"Good morning.",
        )
        .await;
        let (downloader, saver) = downloader(KeyCodec::default(), storage);

        let bytes = downloader
            .download(JOB_ID, ArtifactKind::Transcript)
            .await
            .expect("download");

        assert_eq!(bytes.as_ref(), b"Good morning.");
        assert_eq!(
            saver.saved(),
            vec![(
                b"Good morning.".to_vec(),
                "standup_transcript.txt".to_string(),
                "text/plain; charset=utf-8".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn saving_runs_off_the_runtime_thread() {
        let storage = memory_storage();
        put(
            &storage,
            "output-bedrock/summary_job_1718000000000_k3j9x2abc.html",
            b"<h1>Summary</h1>",
        )
        .await;
        let (downloader, saver) = downloader(KeyCodec::default(), storage);

        downloader
            .download(JOB_ID, ArtifactKind::Summary)
            .await
            .expect("download");

        let threads = saver.threads.lock().expect("saver lock").clone();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn missing_artifact_is_download_failed() {
        let (downloader, saver) = downloader(KeyCodec::default(), memory_storage());

        let err = downloader
            .download(JOB_ID, ArtifactKind::Summary)
            .await
            .expect_err("missing summary");

        match err {
            DownloadError::DownloadFailed { job_id, kind, source } => {
                assert_eq!(job_id, JOB_ID);
                assert_eq!(kind, ArtifactKind::Summary);
                assert!(matches!(source, AppError::NotFound(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(saver.saved().is_empty());
    }

    #[tokio::test]
    async fn malformed_identifier_is_refused() {
        let (downloader, saver) = downloader(KeyCodec::default(), memory_storage());

        let err = downloader
            .download("standup.mp4", ArtifactKind::Transcript)
            .await
            .expect_err("malformed");

        assert!(matches!(err, DownloadError::MalformedIdentifier(_)));
        assert!(saver.saved().is_empty());
    }

    #[tokio::test]
    async fn basename_scheme_reads_markdown_summary() {
        let storage = memory_storage();
        put(
            &storage,
            "output-bedrock/job_1718000000000_k3j9x2abc_standup.md",
            b"# Summary",
        )
        .await;
        let codec = KeyCodec::new(KeyScheme::Basename, SummaryFormat::Markdown);
        let (downloader, saver) = downloader(codec, storage);

        downloader
            .download(JOB_ID, ArtifactKind::Summary)
            .await
            .expect("download");

        let saved = saver.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1, "standup_summary.md");
        assert_eq!(saved[0].2, "text/markdown; charset=utf-8");
    }

    #[test]
    fn mime_types_follow_scheme_and_overrides() {
        let embedded = ArtifactMimeTypes::for_codec(&KeyCodec::default());
        assert_eq!(embedded.summary, "text/html; charset=utf-8");
        assert_eq!(embedded.sentiment, "application/gzip");

        let basename = ArtifactMimeTypes::for_codec(&KeyCodec::new(
            KeyScheme::Basename,
            SummaryFormat::Markdown,
        ));
        assert_eq!(basename.transcript, "application/json");
        assert_eq!(basename.sentiment, "application/json");

        let config = AppConfig {
            summary_mime: Some("text/plain; charset=utf-8".into()),
            ..Default::default()
        };
        let configured = ArtifactMimeTypes::from_config(&config, &KeyCodec::from_config(&config));
        assert_eq!(configured.get(ArtifactKind::Summary), "text/plain; charset=utf-8");
        assert_eq!(configured.get(ArtifactKind::Sentiment), "application/gzip");
    }

    #[test]
    fn suggested_names_fall_back_to_record_then_identifier() {
        let (downloader, _) = downloader(KeyCodec::default(), memory_storage());
        let clean = "job_1718000000000_k3j9x2abc";

        assert_eq!(
            downloader.suggested_file_name(JOB_ID, ArtifactKind::Sentiment, Some("other")),
            "standup_sentiment.tar.gz"
        );
        assert_eq!(
            downloader.suggested_file_name(clean, ArtifactKind::Summary, Some("weekly sync")),
            "weekly sync_summary.html"
        );
        assert_eq!(
            downloader.suggested_file_name(clean, ArtifactKind::Transcript, None),
            "job_1718000000000_k3j9x2abc_transcript.txt"
        );
    }

    #[tokio::test]
    async fn transcript_and_sentiment_are_parsed() {
        let storage = memory_storage();
        let codec = KeyCodec::new(KeyScheme::Basename, SummaryFormat::Markdown);
        put(
            &storage,
            "output-transcribe/job_1718000000000_k3j9x2abc_standup.json",
            br#"{"results": {"transcripts": [{"transcript": "Hello team."}]}}"#,
        )
        .await;
        put(
            &storage,
            "output-comprehend/job_1718000000000_k3j9x2abc_standup.json",
            br#"{"SentimentScore": {"Positive": 0.5, "Negative": 0.25, "Neutral": 0.25, "Mixed": 0.0}}"#,
        )
        .await;
        let (downloader, _) = downloader(codec, storage);

        assert_eq!(
            downloader.transcript(JOB_ID).await.expect("transcript"),
            "Hello team."
        );
        let sentiment = downloader.sentiment(JOB_ID).await.expect("sentiment");
        assert_eq!(sentiment.percentages()[0].1, "50.0%");
    }

    #[tokio::test]
    async fn unparseable_content_is_download_failed() {
        let storage = memory_storage();
        put(
            &storage,
            "output-comprehend/comprehend_job_1718000000000_k3j9x2abc.tar.gz",
            b"\x1f\x8b\x08\x00",
        )
        .await;
        let (downloader, _) = downloader(KeyCodec::default(), storage);

        let err = downloader.sentiment(JOB_ID).await.expect_err("archive is not JSON");
        assert!(matches!(
            err,
            DownloadError::DownloadFailed {
                source: AppError::Malformed(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn record_download_uses_record_file_name() {
        let storage = memory_storage();
        put(
            &storage,
            "output-bedrock/summary_job_1718000000000_k3j9x2abc.html",
            b"<h1>Summary</h1>",
        )
        .await;
        let (downloader, saver) = downloader(KeyCodec::default(), storage);
        let record = JobRecord::new_uploaded(
            "job_1718000000000_k3j9x2abc".into(),
            "user123".into(),
            "retro.mp3".into(),
            1,
            "audio/mpeg".into(),
            "input-data/job_1718000000000_k3j9x2abc_retro.mp3".into(),
        );

        downloader
            .download_for_record(&record, ArtifactKind::Summary)
            .await
            .expect("download");

        assert_eq!(saver.saved()[0].1, "retro_summary.html");
    }

    #[test]
    fn fs_saver_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let saver = FsFileSaver::new(dir.path().join("downloads"));

        saver
            .save(b"hello", "a/b_transcript.txt", "text/plain")
            .expect("save");

        let written = std::fs::read(dir.path().join("downloads").join("a_b_transcript.txt"))
            .expect("saved file");
        assert_eq!(written, b"hello");
    }
}
