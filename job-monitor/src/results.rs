//! Parsers for the artifacts the pipeline writes.

use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct TranscriptDocument {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    #[serde(default)]
    transcripts: Vec<TranscriptEntry>,
}

#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    transcript: String,
}

/// Transcript text from either a plain-text object or a transcription JSON document
/// (`results.transcripts[0].transcript`).
pub fn transcript_text(bytes: &[u8]) -> Result<String, AppError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| AppError::Malformed(format!("transcript is not valid UTF-8: {err}")))?;

    if !text.trim_start().starts_with('{') {
        return Ok(text.to_string());
    }

    let document: TranscriptDocument = serde_json::from_str(text)
        .map_err(|err| AppError::Malformed(format!("invalid transcript JSON: {err}")))?;
    document
        .results
        .transcripts
        .into_iter()
        .next()
        .map(|entry| entry.transcript)
        .ok_or_else(|| AppError::Malformed("transcript JSON holds no transcripts".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentimentScore {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub mixed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentimentResult {
    #[serde(default)]
    pub sentiment: Option<String>,
    pub sentiment_score: SentimentScore,
}

impl SentimentResult {
    /// `(label, "12.3%")` rows in a fixed order.
    pub fn percentages(&self) -> [(&'static str, String); 4] {
        let score = &self.sentiment_score;
        [
            ("Positive", as_percentage(score.positive)),
            ("Negative", as_percentage(score.negative)),
            ("Neutral", as_percentage(score.neutral)),
            ("Mixed", as_percentage(score.mixed)),
        ]
    }
}

pub fn sentiment_scores(bytes: &[u8]) -> Result<SentimentResult, AppError> {
    serde_json::from_slice(bytes)
        .map_err(|err| AppError::Malformed(format!("invalid sentiment JSON: {err}")))
}

/// A fractional score rendered with one decimal, e.g. `0.8766` -> `87.7%`.
pub fn as_percentage(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Markdown export of a transcript with a small header.
pub fn transcript_markdown(
    transcript: &str,
    file_name: Option<&str>,
    exported_at: DateTime<Utc>,
) -> String {
    format!(
        "# Transcript\n\n**File name**: {}\n**Exported at**: {}\n\n## Content\n\n{transcript}\n",
        file_name.unwrap_or("Unknown"),
        exported_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plain_text_transcript_passes_through() {
        let text = transcript_text("Good morning everyone.".as_bytes()).expect("text");
        assert_eq!(text, "Good morning everyone.");
    }

    #[test]
    fn json_transcript_uses_first_entry() {
        let json = serde_json::json!({
            "jobName": "job_1_abc",
            "results": {
                "transcripts": [{"transcript": "Let's begin."}, {"transcript": "ignored"}],
                "items": []
            }
        });
        let text = transcript_text(json.to_string().as_bytes()).expect("text");

        assert_eq!(text, "Let's begin.");
    }

    #[test]
    fn json_transcript_without_entries_is_malformed() {
        let err = transcript_text(br#"{"results": {"transcripts": []}}"#).expect_err("empty");
        assert!(matches!(err, AppError::Malformed(_)));

        let err = transcript_text(b"{not json").expect_err("broken");
        assert!(matches!(err, AppError::Malformed(_)));

        let err = transcript_text(&[0xff, 0xfe]).expect_err("binary");
        assert!(matches!(err, AppError::Malformed(_)));
    }

    #[test]
    fn sentiment_scores_render_as_percentages() {
        let json = br#"{
            "Sentiment": "POSITIVE",
            "SentimentScore": {"Positive": 0.8766, "Negative": 0.01, "Neutral": 0.1134, "Mixed": 0.0}
        }"#;
        let result = sentiment_scores(json).expect("scores");

        assert_eq!(result.sentiment.as_deref(), Some("POSITIVE"));
        assert_eq!(
            result.percentages(),
            [
                ("Positive", "87.7%".to_string()),
                ("Negative", "1.0%".to_string()),
                ("Neutral", "11.3%".to_string()),
                ("Mixed", "0.0%".to_string()),
            ]
        );
    }

    #[test]
    fn sentiment_without_scores_is_malformed() {
        let err = sentiment_scores(br#"{"Sentiment": "NEUTRAL"}"#).expect_err("missing scores");
        assert!(matches!(err, AppError::Malformed(_)));
    }

    #[test]
    fn markdown_export_has_header_and_body() {
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).single().expect("date");
        let markdown = transcript_markdown("Hello.", Some("standup.mp4"), at);

        assert!(markdown.starts_with("# Transcript\n"));
        assert!(markdown.contains("**File name**: standup.mp4"));
        assert!(markdown.contains("**Exported at**: 2024-06-10 09:30:00 UTC"));
        assert!(markdown.ends_with("## Content\n\nHello.\n"));
    }
}
