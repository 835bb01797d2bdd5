use serde::{Deserialize, Serialize};

use crate::utils::config::StageMapping;

use super::{artifact::ArtifactKind, job_record::JobStatus};

/// A step of the external pipeline, each producing exactly one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transcribe,
    Summarize,
    Analyze,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Transcribe, Stage::Summarize, Stage::Analyze];

    pub fn artifact(self) -> ArtifactKind {
        match self {
            Stage::Transcribe => ArtifactKind::Transcript,
            Stage::Summarize => ArtifactKind::Summary,
            Stage::Analyze => ArtifactKind::Sentiment,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Transcribe => "transcribe",
            Stage::Summarize => "summarize",
            Stage::Analyze => "analyze",
        }
    }
}

impl From<ArtifactKind> for Stage {
    fn from(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Transcript => Stage::Transcribe,
            ArtifactKind::Summary => Stage::Summarize,
            ArtifactKind::Sentiment => Stage::Analyze,
        }
    }
}

/// Declarative table of which lifecycle statuses mean a stage is in flight.
///
/// A status may appear under more than one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatusTable {
    #[serde(default)]
    pub transcribe: Vec<JobStatus>,
    #[serde(default)]
    pub summarize: Vec<JobStatus>,
    #[serde(default)]
    pub analyze: Vec<JobStatus>,
}

impl StageStatusTable {
    /// Each stage has its own in-flight status.
    pub fn sequential() -> Self {
        Self {
            transcribe: vec![JobStatus::Transcribing],
            summarize: vec![JobStatus::Summarizing],
            analyze: vec![JobStatus::Analyzing],
        }
    }

    /// `ANALYZING` drives both the summary and the sentiment displays.
    pub fn combined() -> Self {
        Self {
            transcribe: vec![JobStatus::Transcribing],
            summarize: vec![JobStatus::Summarizing, JobStatus::Analyzing],
            analyze: vec![JobStatus::Analyzing],
        }
    }

    pub fn statuses_for(&self, stage: Stage) -> &[JobStatus] {
        match stage {
            Stage::Transcribe => &self.transcribe,
            Stage::Summarize => &self.summarize,
            Stage::Analyze => &self.analyze,
        }
    }
}

impl From<StageMapping> for StageStatusTable {
    fn from(mapping: StageMapping) -> Self {
        match mapping {
            StageMapping::Sequential => Self::sequential(),
            StageMapping::Combined => Self::combined(),
        }
    }
}

impl Default for StageStatusTable {
    fn default() -> Self {
        StageMapping::default().into()
    }
}
