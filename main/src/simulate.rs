use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        job_store::JobRecordStore,
        store::ArtifactStore,
        types::{
            artifact::ArtifactKind,
            job_record::{JobRecordPatch, JobStatus},
        },
    },
};
use job_monitor::KeyCodec;
use tracing::info;

/// Stands in for the external pipeline against a local, in-memory job table: walks the
/// record through every stage and writes placeholder artifacts at the derived keys.
pub struct PipelineSimulator {
    records: Arc<dyn JobRecordStore>,
    store: Arc<dyn ArtifactStore>,
    codec: KeyCodec,
    step: Duration,
}

impl PipelineSimulator {
    pub fn new(
        records: Arc<dyn JobRecordStore>,
        store: Arc<dyn ArtifactStore>,
        codec: KeyCodec,
        step: Duration,
    ) -> Self {
        Self {
            records,
            store,
            codec,
            step,
        }
    }

    pub async fn run(&self, job_id: &str) -> Result<(), AppError> {
        let stages = [
            (JobStatus::Transcribing, None),
            (JobStatus::Summarizing, Some(ArtifactKind::Transcript)),
            (JobStatus::Analyzing, Some(ArtifactKind::Summary)),
            (JobStatus::Completed, Some(ArtifactKind::Sentiment)),
        ];

        for (status, produced) in stages {
            tokio::time::sleep(self.step).await;
            let mut patch = JobRecordPatch::default();
            if let Some(kind) = produced {
                let key = self.write_artifact(job_id, kind).await?;
                patch = patch.with_artifact_key(kind, key);
            }
            self.records
                .update(job_id, status, patch)
                .await?
                .ok_or_else(|| AppError::NotFound(job_id.to_string()))?;
            info!(job_id, %status, "simulated pipeline step");
        }
        Ok(())
    }

    async fn write_artifact(&self, job_id: &str, kind: ArtifactKind) -> Result<String, AppError> {
        let key = self
            .codec
            .derive_output_key(job_id, kind)
            .ok_or_else(|| AppError::Validation(format!("Malformed job identifier: {job_id}")))?;
        let (body, content_type) = placeholder(job_id, kind, self.codec.extension(kind));
        self.store
            .put(&key, body, content_type, None)
            .await
    }
}

/// A gzip stream with no content.
const EMPTY_GZIP: [u8; 20] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x03, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Placeholder content shaped like what the pipeline writes under `extension`.
fn placeholder(job_id: &str, kind: ArtifactKind, extension: &str) -> (Bytes, &'static str) {
    match (kind, extension) {
        (ArtifactKind::Transcript, "txt") => (
            Bytes::from_static(b"This is a simulated transcript."),
            "text/plain; charset=utf-8",
        ),
        (ArtifactKind::Transcript, _) => (
            Bytes::from(
                serde_json::json!({
                    "jobName": job_id,
                    "results": {"transcripts": [{"transcript": "This is a simulated transcript."}]}
                })
                .to_string(),
            ),
            "application/json",
        ),
        (ArtifactKind::Summary, "html") => (
            Bytes::from_static(
                b"<h1>Summary</h1>\n<ul><li>Simulated meeting summary.</li></ul>\n",
            ),
            "text/html; charset=utf-8",
        ),
        (ArtifactKind::Summary, _) => (
            Bytes::from_static(b"# Summary\n\n- Simulated meeting summary.\n"),
            "text/markdown; charset=utf-8",
        ),
        (ArtifactKind::Sentiment, "tar.gz") => {
            (Bytes::from_static(&EMPTY_GZIP), "application/gzip")
        }
        (ArtifactKind::Sentiment, _) => (
            Bytes::from(
                serde_json::json!({
                    "Sentiment": "NEUTRAL",
                    "SentimentScore": {"Positive": 0.2, "Negative": 0.1, "Neutral": 0.65, "Mixed": 0.05}
                })
                .to_string(),
            ),
            "application/json",
        ),
    }
}
