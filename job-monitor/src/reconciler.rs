use common::{
    storage::types::{
        artifact::ArtifactKind,
        job_record::{JobRecord, JobStatus},
        stage::{Stage, StageStatusTable},
    },
    utils::config::AppConfig,
};
use serde::Serialize;

/// Display state of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Waiting,
    Processing,
    Completed,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            StageState::Waiting => "waiting",
            StageState::Processing => "processing",
            StageState::Completed => "completed",
        }
    }
}

/// What the UI needs to render for one poll of a job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub transcribe: StageState,
    pub summarize: StageState,
    pub analyze: StageState,
    pub terminal: bool,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl ProgressSnapshot {
    pub fn stage(&self, stage: Stage) -> StageState {
        match stage {
            Stage::Transcribe => self.transcribe,
            Stage::Summarize => self.summarize,
            Stage::Analyze => self.analyze,
        }
    }

    /// An artifact can be downloaded once its stage has completed.
    pub fn artifact_available(&self, kind: ArtifactKind) -> bool {
        self.stage(kind.into()) == StageState::Completed
    }

    pub fn stages(&self) -> impl Iterator<Item = (Stage, StageState)> + '_ {
        Stage::ALL.into_iter().map(|stage| (stage, self.stage(stage)))
    }
}

/// Maps a job record onto per-stage display states.
///
/// Output-key presence is the ground truth for completion and always wins over the status
/// field, which may lag behind the object being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressReconciler {
    table: StageStatusTable,
}

impl ProgressReconciler {
    pub fn new(table: StageStatusTable) -> Self {
        Self { table }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.stage_mapping.into())
    }

    pub fn table(&self) -> &StageStatusTable {
        &self.table
    }

    pub fn reconcile(&self, record: &JobRecord) -> ProgressSnapshot {
        let table = record.stage_statuses.as_ref().unwrap_or(&self.table);
        let state = |stage: Stage| {
            if record.artifact_key(stage.artifact()).is_some() {
                StageState::Completed
            } else if table.statuses_for(stage).contains(&record.status) {
                StageState::Processing
            } else {
                StageState::Waiting
            }
        };

        ProgressSnapshot {
            job_id: record.job_id.clone(),
            status: record.status,
            transcribe: state(Stage::Transcribe),
            summarize: state(Stage::Summarize),
            analyze: state(Stage::Analyze),
            terminal: record.status.is_terminal(),
            succeeded: record.status == JobStatus::Completed,
            error_message: record.error_message.clone(),
        }
    }
}
