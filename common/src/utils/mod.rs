pub mod config;
pub mod retry;
pub mod upload_limits;
