use chrono::Utc;
use common::{
    storage::types::artifact::ArtifactKind,
    utils::config::{AppConfig, KeyScheme, SummaryFormat},
};
use uuid::Uuid;

/// Leading segment of every job identifier.
pub const JOB_MARKER: &str = "job";
/// Storage prefix for uploaded input files.
pub const INPUT_PREFIX: &str = "input-data";

const TOKEN_LEN: usize = 9;

/// Splits `job_<ts>_<rand>[_<name>]` into the clean identifier and the optional remainder.
///
/// Segment boundaries are positional: the first three underscore-delimited segments are
/// always the identifier, whatever they contain.
fn split_identifier(job_id: &str) -> Option<(&str, Option<&str>)> {
    let mut parts = job_id.splitn(4, '_');
    let marker = parts.next()?;
    let timestamp = parts.next()?;
    let token = parts.next()?;
    if marker != JOB_MARKER || timestamp.is_empty() || token.is_empty() {
        return None;
    }
    let clean_len = marker.len() + timestamp.len() + token.len() + 2;
    let clean = job_id.get(..clean_len)?;
    Some((clean, parts.next()))
}

/// The canonical three-segment identifier, or `None` for malformed input.
pub fn canonicalize(job_id: &str) -> Option<&str> {
    split_identifier(job_id).map(|(clean, _)| clean)
}

/// The file base name embedded after the third segment, re-joined with underscores.
pub fn extract_embedded_file_name(job_id: &str) -> Option<&str> {
    split_identifier(job_id)
        .and_then(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}

/// Strips the last extension, keeping dot-files intact.
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.get(..idx).unwrap_or(file_name),
        _ => file_name,
    }
}

/// Derives job identifiers and storage keys for one deployment's key scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCodec {
    scheme: KeyScheme,
    summary_format: SummaryFormat,
}

impl KeyCodec {
    pub fn new(scheme: KeyScheme, summary_format: SummaryFormat) -> Self {
        Self {
            scheme,
            summary_format,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.key_scheme, config.summary_format)
    }

    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    pub fn summary_format(&self) -> SummaryFormat {
        self.summary_format
    }

    /// `job_<unix-millis>_<9-char token>`, with the file stem appended under the basename
    /// scheme.
    pub fn generate_job_id(&self, file_name: &str) -> String {
        let token: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(TOKEN_LEN)
            .collect();
        let clean = format!("{JOB_MARKER}_{}_{token}", Utc::now().timestamp_millis());
        match self.scheme {
            KeyScheme::Embedded => clean,
            KeyScheme::Basename => {
                let stem = file_stem(file_name.trim());
                if stem.is_empty() {
                    clean
                } else {
                    format!("{clean}_{stem}")
                }
            }
        }
    }

    pub fn derive_input_key(&self, job_id: &str, original_file_name: &str) -> Option<String> {
        canonicalize(job_id)?;
        let key = match self.scheme {
            KeyScheme::Embedded if !original_file_name.is_empty() => {
                format!("{INPUT_PREFIX}/{job_id}_{original_file_name}")
            }
            KeyScheme::Embedded | KeyScheme::Basename => format!("{INPUT_PREFIX}/{job_id}"),
        };
        Some(key)
    }

    pub fn derive_output_key(&self, job_id: &str, kind: ArtifactKind) -> Option<String> {
        let clean = canonicalize(job_id)?;
        let prefix = kind.prefix();
        let extension = self.extension(kind);
        let key = match self.scheme {
            KeyScheme::Embedded => {
                let label = match kind {
                    ArtifactKind::Transcript => "transcribe",
                    ArtifactKind::Summary => "summary",
                    ArtifactKind::Sentiment => "comprehend",
                };
                format!("{prefix}/{label}_{clean}.{extension}")
            }
            KeyScheme::Basename => format!("{prefix}/{job_id}.{extension}"),
        };
        Some(key)
    }

    /// File extension of `kind`'s stored object under this scheme.
    pub fn extension(&self, kind: ArtifactKind) -> &'static str {
        match (self.scheme, kind) {
            (KeyScheme::Embedded, ArtifactKind::Transcript) => "txt",
            (KeyScheme::Embedded, ArtifactKind::Summary) => match self.summary_format {
                SummaryFormat::Html => "html",
                SummaryFormat::Markdown => "md",
            },
            (KeyScheme::Embedded, ArtifactKind::Sentiment) => "tar.gz",
            (KeyScheme::Basename, ArtifactKind::Summary) => "md",
            (KeyScheme::Basename, ArtifactKind::Transcript | ArtifactKind::Sentiment) => "json",
        }
    }
}
