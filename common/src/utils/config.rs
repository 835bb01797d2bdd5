use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
    S3,
}

/// How job identifiers map onto storage keys.
///
/// `Embedded` identifiers are `job_<ts>_<rand>` with the original file name appended by the
/// uploader; output artifacts are keyed by the clean three-segment identifier. `Basename`
/// identifiers are used verbatim as the storage basename for every artifact.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    #[default]
    Embedded,
    Basename,
}

/// Which stage/status table the reconciler uses when a record does not carry its own.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageMapping {
    Sequential,
    #[default]
    Combined,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Html,
    Markdown,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_name")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_name")]
    pub surrealdb_database: String,
    #[serde(default = "default_job_table")]
    pub job_table: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
    #[serde(default)]
    pub key_scheme: KeyScheme,
    #[serde(default)]
    pub stage_mapping: StageMapping,
    #[serde(default)]
    pub summary_format: SummaryFormat,
    #[serde(default)]
    pub transcript_mime: Option<String>,
    #[serde(default)]
    pub summary_mime: Option<String>,
    #[serde(default)]
    pub sentiment_mime: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_name() -> String {
    "minutes".to_string()
}

fn default_job_table() -> String {
    "job_records".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_aws_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [".mp3", ".mp4", ".txt", ".vtt"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_retry_max_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    8000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_credential(),
            surrealdb_password: default_surrealdb_credential(),
            surrealdb_namespace: default_surrealdb_name(),
            surrealdb_database: default_surrealdb_name(),
            job_table: default_job_table(),
            storage: default_storage_kind(),
            data_dir: default_data_dir(),
            s3_bucket: None,
            aws_region: default_aws_region(),
            key_scheme: KeyScheme::default(),
            stage_mapping: StageMapping::default(),
            summary_format: SummaryFormat::default(),
            transcript_mime: None,
            summary_mime: None,
            sentiment_mime: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            user_id: None,
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl AppConfig {
    /// True when job records live in an embedded, process-local table.
    pub fn is_development(&self) -> bool {
        self.surrealdb_address.starts_with("mem://")
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_extensions"),
        )
        .build()?;

    config.try_deserialize()
}
