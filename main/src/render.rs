use common::storage::types::{artifact::ArtifactKind, job_record::JobRecord};
use job_monitor::{results::SentimentResult, ProgressSnapshot};

pub fn snapshot_line(snapshot: &ProgressSnapshot) -> String {
    let stages = snapshot
        .stages()
        .map(|(stage, state)| format!("{}={}", stage.as_str(), state.as_str()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = format!("{} [{}] {stages}", snapshot.job_id, snapshot.status);

    let ready: Vec<&str> = ArtifactKind::ALL
        .iter()
        .filter(|kind| snapshot.artifact_available(**kind))
        .map(|kind| kind.as_str())
        .collect();
    if !ready.is_empty() {
        line.push_str(&format!(" ready: {}", ready.join(", ")));
    }
    if let Some(message) = snapshot.error_message.as_deref() {
        line.push_str(&format!(" error: {message}"));
    }
    line
}

pub fn record_line(record: &JobRecord) -> String {
    format!(
        "{}  {:<12}  {}  {} ({} bytes)",
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.status.as_str(),
        record.job_id,
        record.file_name,
        record.file_size
    )
}

pub fn sentiment_lines(result: &SentimentResult) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(label) = result.sentiment.as_deref() {
        lines.push(format!("Overall: {label}"));
    }
    lines.extend(
        result
            .percentages()
            .iter()
            .map(|(label, value)| format!("{label:<9}{value:>7}")),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::job_record::JobStatus;
    use job_monitor::results::SentimentScore;
    use job_monitor::StageState;

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: "job_1_abc".into(),
            status: JobStatus::Summarizing,
            transcribe: StageState::Completed,
            summarize: StageState::Processing,
            analyze: StageState::Waiting,
            terminal: false,
            succeeded: false,
            error_message: None,
        }
    }

    #[test]
    fn snapshot_line_lists_stages_and_ready_artifacts() {
        assert_eq!(
            snapshot_line(&snapshot()),
            "job_1_abc [SUMMARIZING] transcribe=completed summarize=processing analyze=waiting ready: transcript"
        );
    }

    #[test]
    fn snapshot_line_includes_error() {
        let failed = ProgressSnapshot {
            status: JobStatus::Error,
            transcribe: StageState::Waiting,
            summarize: StageState::Waiting,
            terminal: true,
            error_message: Some("boom".into()),
            ..snapshot()
        };

        assert!(snapshot_line(&failed).ends_with("analyze=waiting error: boom"));
    }

    #[test]
    fn sentiment_lines_render_percentages() {
        let result = SentimentResult {
            sentiment: Some("NEUTRAL".into()),
            sentiment_score: SentimentScore {
                positive: 0.25,
                negative: 0.125,
                neutral: 0.5,
                mixed: 0.125,
            },
        };

        let lines = sentiment_lines(&result);
        assert_eq!(lines[0], "Overall: NEUTRAL");
        assert_eq!(lines[1], "Positive   25.0%");
        assert_eq!(lines.len(), 5);
    }
}
