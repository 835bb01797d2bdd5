use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One of the three output artifacts the external pipeline produces for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Transcript,
    Summary,
    Sentiment,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Transcript,
        ArtifactKind::Summary,
        ArtifactKind::Sentiment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Summary => "summary",
            ArtifactKind::Sentiment => "sentiment",
        }
    }

    /// Storage location prefix the pipeline writes this artifact under.
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "output-transcribe",
            ArtifactKind::Summary => "output-bedrock",
            ArtifactKind::Sentiment => "output-comprehend",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcript" => Ok(ArtifactKind::Transcript),
            "summary" => Ok(ArtifactKind::Summary),
            "sentiment" => Ok(ArtifactKind::Sentiment),
            other => Err(AppError::Validation(format!(
                "Unknown artifact kind '{other}', expected transcript, summary or sentiment"
            ))),
        }
    }
}
