use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use common::{
    storage::{
        db::SurrealDbClient,
        job_store::{JobRecordStore, SurrealJobStore},
        store::{ArtifactStore, ProgressFn, StorageManager},
        types::job_record::JobRecord,
    },
    utils::config::AppConfig,
};
use job_monitor::{
    results, ArtifactDownloader, ArtifactMimeTypes, ChannelProgressSink, FsFileSaver, KeyCodec,
    PollingScheduler, ProgressEvent, ProgressReconciler, Session, StaticSession, UploadService,
};
use tracing::{info, warn};

use crate::{args::Command, render, simulate::PipelineSimulator};

/// Delay between simulated pipeline steps.
const SIMULATION_STEP: Duration = Duration::from_secs(2);

pub struct App {
    config: Arc<AppConfig>,
    codec: KeyCodec,
    records: Arc<dyn JobRecordStore>,
    storage: Arc<StorageManager>,
    session: Arc<StaticSession>,
}

impl App {
    pub async fn new(config: AppConfig, user: Option<String>) -> anyhow::Result<Self> {
        let db = SurrealDbClient::from_config(&config)
            .await
            .context("failed to connect to the job table")?;
        db.build_indexes(&config.job_table).await?;
        let records: Arc<dyn JobRecordStore> =
            Arc::new(SurrealJobStore::new(Arc::new(db), config.job_table.clone()));
        let storage = Arc::new(StorageManager::new(&config).await?);
        let session = Arc::new(StaticSession::new(user.or_else(|| config.user_id.clone())));

        Ok(Self {
            codec: KeyCodec::from_config(&config),
            config: Arc::new(config),
            records,
            storage,
            session,
        })
    }

    pub async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Upload {
                path,
                watch,
                simulate,
            } => self.upload(&path, watch, simulate).await,
            Command::Watch { job_id } => self.watch(&job_id).await,
            Command::Status { job_id } => self.status(&job_id).await,
            Command::Download { job_id, kind, out } => {
                let downloader = self.downloader(&out);
                let bytes = match self.records.get(&job_id).await? {
                    Some(record) => downloader.download_for_record(&record, kind).await?,
                    None => downloader.download(&job_id, kind).await?,
                };
                println!("Saved {kind} ({} bytes) to {}", bytes.len(), out.display());
                Ok(())
            }
            Command::Transcript { job_id, markdown } => {
                let text = self.downloader(Path::new(".")).transcript(&job_id).await?;
                if markdown {
                    let record = self.records.get(&job_id).await?;
                    println!(
                        "{}",
                        results::transcript_markdown(
                            &text,
                            record.as_ref().map(|r| r.file_name.as_str()),
                            chrono::Utc::now(),
                        )
                    );
                } else {
                    println!("{text}");
                }
                Ok(())
            }
            Command::Sentiment { job_id } => {
                let result = self.downloader(Path::new(".")).sentiment(&job_id).await?;
                for line in render::sentiment_lines(&result) {
                    println!("{line}");
                }
                Ok(())
            }
            Command::List => {
                let user = self.require_user()?;
                for record in self.records.list(&user).await? {
                    println!("{}", render::record_line(&record));
                }
                Ok(())
            }
            Command::Delete { job_id } => match self.records.delete(&job_id).await? {
                Some(record) => {
                    println!("Deleted {}", record.job_id);
                    Ok(())
                }
                None => bail!("No job record for {job_id}"),
            },
        }
    }

    fn require_user(&self) -> anyhow::Result<String> {
        self.session
            .current_user()
            .ok_or_else(|| anyhow!("Not logged in; pass --user or set user_id"))
    }

    fn downloader(&self, out: &Path) -> ArtifactDownloader {
        ArtifactDownloader::new(
            self.codec,
            Arc::clone(&self.storage) as Arc<dyn ArtifactStore>,
            Arc::new(FsFileSaver::new(out)),
            ArtifactMimeTypes::from_config(&self.config, &self.codec),
        )
    }

    async fn upload(&self, path: &Path, watch: bool, simulate: bool) -> anyhow::Result<()> {
        if simulate && !self.config.is_development() {
            bail!("--simulate needs the in-memory job table (surrealdb_address = mem://)");
        }
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let service = UploadService::new(
            self.codec,
            Arc::clone(&self.config),
            Arc::clone(&self.storage) as Arc<dyn ArtifactStore>,
            Arc::clone(&self.records),
            Arc::clone(&self.session) as Arc<dyn Session>,
        );
        let report: &ProgressFn<'_> = &|sent, total| info!(sent, total, "upload progress");
        let record = service
            .upload(file_name, Bytes::from(data), Some(report))
            .await?;
        println!("Uploaded {} as {}", record.file_name, record.job_id);

        if simulate {
            self.spawn_simulation(&record);
        }
        if watch || simulate {
            self.watch(&record.job_id).await?;
        }
        Ok(())
    }

    fn spawn_simulation(&self, record: &JobRecord) {
        let simulator = PipelineSimulator::new(
            Arc::clone(&self.records),
            Arc::clone(&self.storage) as Arc<dyn ArtifactStore>,
            self.codec,
            SIMULATION_STEP,
        );
        let job_id = record.job_id.clone();
        tokio::spawn(async move {
            if let Err(err) = simulator.run(&job_id).await {
                warn!(%job_id, error = %err, "pipeline simulation failed");
            }
        });
    }

    async fn status(&self, job_id: &str) -> anyhow::Result<()> {
        let record = self
            .records
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow!("No job record for {job_id} (it may not be visible yet)"))?;
        let snapshot = ProgressReconciler::from_config(&self.config).reconcile(&record);
        println!("{}", render::snapshot_line(&snapshot));
        Ok(())
    }

    async fn watch(&self, job_id: &str) -> anyhow::Result<()> {
        let (sink, mut events) = ChannelProgressSink::new();
        let scheduler = PollingScheduler::new(
            Arc::clone(&self.records),
            ProgressReconciler::from_config(&self.config),
            Arc::new(sink),
            Arc::clone(&self.session) as Arc<dyn Session>,
            Duration::from_millis(self.config.poll_interval_ms),
        );
        scheduler.start_monitoring(job_id)?;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ProgressEvent::Progress(snapshot)) => {
                        println!("{}", render::snapshot_line(&snapshot));
                        if snapshot.terminal && !snapshot.succeeded {
                            bail!(
                                "Job {} failed: {}",
                                snapshot.job_id,
                                snapshot.error_message.as_deref().unwrap_or("unknown error")
                            );
                        }
                    }
                    Some(ProgressEvent::Completed { job_id }) => {
                        println!("Job {job_id} completed; artifacts are ready to download");
                        return Ok(());
                    }
                    None => return Ok(()),
                },
                _ = tokio::signal::ctrl_c() => {
                    scheduler.stop_monitoring();
                    return Ok(());
                }
            }
        }
    }
}
