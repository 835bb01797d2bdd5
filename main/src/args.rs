use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::{error::AppError, storage::types::artifact::ArtifactKind};

#[derive(Parser, Debug)]
#[command(
    name = "minutes",
    author,
    version,
    about = "Upload meeting recordings and follow them through transcription, summary and sentiment analysis",
    long_about = None
)]
pub struct Cli {
    /// Acting user, overrides `user_id` from configuration
    #[arg(long, global = true, env = "MINUTES_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a recording or transcript and register its job
    Upload {
        path: PathBuf,

        /// Keep polling the new job until it finishes
        #[arg(long)]
        watch: bool,

        /// Drive the job through the pipeline locally (in-memory job table only)
        #[arg(long)]
        simulate: bool,
    },
    /// Poll a job until it completes or fails
    Watch { job_id: String },
    /// Show a job's progress once
    Status { job_id: String },
    /// Save an artifact to disk
    Download {
        job_id: String,

        /// transcript, summary or sentiment
        #[arg(value_parser = parse_kind)]
        kind: ArtifactKind,

        /// Directory to save into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print a job's transcript
    Transcript {
        job_id: String,

        /// Wrap the transcript in a markdown document
        #[arg(long)]
        markdown: bool,
    },
    /// Print a job's sentiment scores
    Sentiment { job_id: String },
    /// List the current user's jobs, newest first
    List,
    /// Delete a job record
    Delete { job_id: String },
}

fn parse_kind(value: &str) -> Result<ArtifactKind, String> {
    value.parse().map_err(|err: AppError| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_command() {
        let cli = Cli::try_parse_from([
            "minutes",
            "--user",
            "user123",
            "download",
            "job_1_abc",
            "summary",
            "--out",
            "/tmp/minutes",
        ])
        .expect("valid args");

        assert_eq!(cli.user.as_deref(), Some("user123"));
        match cli.command {
            Command::Download { job_id, kind, out } => {
                assert_eq!(job_id, "job_1_abc");
                assert_eq!(kind, ArtifactKind::Summary);
                assert_eq!(out, PathBuf::from("/tmp/minutes"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_artifact_kind() {
        let result = Cli::try_parse_from(["minutes", "download", "job_1_abc", "slides"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
