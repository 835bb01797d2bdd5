#![allow(clippy::missing_docs_in_private_items)]

pub mod downloader;
pub mod key_codec;
pub mod reconciler;
pub mod results;
pub mod scheduler;
pub mod session;
pub mod upload;

pub use downloader::{ArtifactDownloader, ArtifactMimeTypes, DownloadError, FileSaver, FsFileSaver};
pub use key_codec::KeyCodec;
pub use reconciler::{ProgressReconciler, ProgressSnapshot, StageState};
pub use scheduler::{
    ChannelProgressSink, MonitorError, MonitorState, PollingScheduler, ProgressEvent,
    ProgressSink,
};
pub use session::{Session, StaticSession};
pub use upload::{UploadError, UploadService};
