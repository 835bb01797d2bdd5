use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;

use crate::error::AppError;

use super::{artifact::ArtifactKind, stage::StageStatusTable};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Uploaded,
    Transcribing,
    Summarizing,
    Analyzing,
    Completed,
    Error,
    /// Any status string this client does not know about.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploaded => "UPLOADED",
            JobStatus::Transcribing => "TRANSCRIBING",
            JobStatus::Summarizing => "SUMMARIZING",
            JobStatus::Analyzing => "ANALYZING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Error => "ERROR",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    BeginTranscription,
    BeginSummary,
    BeginAnalysis,
    Complete,
    Fail,
}

impl JobTransition {
    fn as_str(self) -> &'static str {
        match self {
            JobTransition::BeginTranscription => "begin_transcription",
            JobTransition::BeginSummary => "begin_summary",
            JobTransition::BeginAnalysis => "begin_analysis",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
        }
    }

    fn towards(target: JobStatus) -> Option<Self> {
        match target {
            JobStatus::Transcribing => Some(JobTransition::BeginTranscription),
            JobStatus::Summarizing => Some(JobTransition::BeginSummary),
            JobStatus::Analyzing => Some(JobTransition::BeginAnalysis),
            JobStatus::Completed => Some(JobTransition::Complete),
            JobStatus::Error => Some(JobTransition::Fail),
            JobStatus::Uploaded | JobStatus::Unknown => None,
        }
    }
}

mod lifecycle {
    use super::{invalid_transition, state_machine, AppError, JobStatus};

    state_machine! {
        name: JobLifecycleMachine,
        initial: Uploaded,
        states: [Uploaded, Transcribing, Summarizing, Analyzing, Completed, Failed],
        events {
            begin_transcription {
                transition: { from: Uploaded, to: Transcribing }
            }
            begin_summary {
                transition: { from: Transcribing, to: Summarizing }
            }
            begin_analysis {
                transition: { from: Transcribing, to: Analyzing }
                transition: { from: Summarizing, to: Analyzing }
            }
            complete {
                transition: { from: Analyzing, to: Completed }
            }
            fail {
                transition: { from: Uploaded, to: Failed }
                transition: { from: Transcribing, to: Failed }
                transition: { from: Summarizing, to: Failed }
                transition: { from: Analyzing, to: Failed }
            }
        }
    }

    pub(super) fn uploaded() -> JobLifecycleMachine<(), Uploaded> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn transcribing() -> Result<JobLifecycleMachine<(), Transcribing>, AppError> {
        uploaded()
            .begin_transcription()
            .map_err(|_| invalid_transition(JobStatus::Uploaded, JobStatus::Transcribing))
    }

    pub(super) fn summarizing() -> Result<JobLifecycleMachine<(), Summarizing>, AppError> {
        transcribing()?
            .begin_summary()
            .map_err(|_| invalid_transition(JobStatus::Transcribing, JobStatus::Summarizing))
    }

    pub(super) fn analyzing() -> Result<JobLifecycleMachine<(), Analyzing>, AppError> {
        summarizing()?
            .begin_analysis()
            .map_err(|_| invalid_transition(JobStatus::Summarizing, JobStatus::Analyzing))
    }
}

fn invalid_transition(status: JobStatus, target: JobStatus) -> AppError {
    let event = JobTransition::towards(target).map_or("none", JobTransition::as_str);
    AppError::Validation(format!(
        "Invalid job transition: {} -> {} ({event})",
        status.as_str(),
        target.as_str(),
    ))
}

/// Validates a status overwrite against the pipeline lifecycle.
///
/// Writing the current status again is always accepted and changes nothing.
pub fn compute_next_status(status: JobStatus, target: JobStatus) -> Result<JobStatus, AppError> {
    use lifecycle::*;
    if status == target {
        return Ok(status);
    }
    let Some(event) = JobTransition::towards(target) else {
        return Err(invalid_transition(status, target));
    };
    match (status, event) {
        (JobStatus::Uploaded, JobTransition::BeginTranscription) => uploaded()
            .begin_transcription()
            .map(|_| JobStatus::Transcribing)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Transcribing, JobTransition::BeginSummary) => transcribing()?
            .begin_summary()
            .map(|_| JobStatus::Summarizing)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Transcribing, JobTransition::BeginAnalysis) => transcribing()?
            .begin_analysis()
            .map(|_| JobStatus::Analyzing)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Summarizing, JobTransition::BeginAnalysis) => summarizing()?
            .begin_analysis()
            .map(|_| JobStatus::Analyzing)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Analyzing, JobTransition::Complete) => analyzing()?
            .complete()
            .map(|_| JobStatus::Completed)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Uploaded, JobTransition::Fail) => uploaded()
            .fail()
            .map(|_| JobStatus::Error)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Transcribing, JobTransition::Fail) => transcribing()?
            .fail()
            .map(|_| JobStatus::Error)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Summarizing, JobTransition::Fail) => summarizing()?
            .fail()
            .map(|_| JobStatus::Error)
            .map_err(|_| invalid_transition(status, target)),
        (JobStatus::Analyzing, JobTransition::Fail) => analyzing()?
            .fail()
            .map(|_| JobStatus::Error)
            .map_err(|_| invalid_transition(status, target)),
        _ => Err(invalid_transition(status, target)),
    }
}

/// Extra fields written alongside a status update. `None` leaves a field untouched, so an
/// artifact key can never be cleared once the pipeline has set it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecordPatch {
    pub fn with_artifact_key(mut self, kind: ArtifactKind, key: impl Into<String>) -> Self {
        let key = Some(key.into());
        match kind {
            ArtifactKind::Transcript => self.transcript_s3_key = key,
            ArtifactKind::Summary => self.summary_s3_key = key,
            ArtifactKind::Sentiment => self.sentiment_s3_key = key,
        }
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Status record for one pass of an uploaded file through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub s3_upload_key: String,
    #[serde(default)]
    pub transcript_s3_key: Option<String>,
    #[serde(default)]
    pub summary_s3_key: Option<String>,
    #[serde(default)]
    pub sentiment_s3_key: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Stage/status table declared by the producer of this record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_statuses: Option<StageStatusTable>,
}

impl JobRecord {
    pub fn new_uploaded(
        job_id: String,
        user_id: String,
        file_name: String,
        file_size: u64,
        file_type: String,
        s3_upload_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            user_id,
            file_name,
            file_size,
            file_type,
            status: JobStatus::Uploaded,
            created_at: now,
            updated_at: now,
            s3_upload_key,
            transcript_s3_key: None,
            summary_s3_key: None,
            sentiment_s3_key: None,
            error_message: None,
            stage_statuses: None,
        }
    }

    /// Storage key of a produced artifact. Empty strings count as absent.
    pub fn artifact_key(&self, kind: ArtifactKind) -> Option<&str> {
        let key = match kind {
            ArtifactKind::Transcript => self.transcript_s3_key.as_deref(),
            ArtifactKind::Summary => self.summary_s3_key.as_deref(),
            ArtifactKind::Sentiment => self.sentiment_s3_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }

    /// Original file name without its extension.
    pub fn file_stem(&self) -> Option<&str> {
        let name = self.file_name.trim();
        if name.is_empty() {
            return None;
        }
        match name.rfind('.') {
            Some(idx) if idx > 0 => name.get(..idx),
            _ => Some(name),
        }
    }

    /// Applies a status overwrite plus extra fields, refreshing `updated_at`.
    pub fn apply_update(
        &mut self,
        status: JobStatus,
        patch: JobRecordPatch,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.status = compute_next_status(self.status, status)?;
        if let Some(key) = patch.transcript_s3_key {
            self.transcript_s3_key = Some(key);
        }
        if let Some(key) = patch.summary_s3_key {
            self.summary_s3_key = Some(key);
        }
        if let Some(key) = patch.sentiment_s3_key {
            self.sentiment_s3_key = Some(key);
        }
        if let Some(message) = patch.error_message {
            self.error_message = Some(message);
        }
        self.updated_at = now;
        Ok(())
    }
}
