use thiserror::Error;

use super::config::AppConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadValidationError {
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    UnsupportedType(String),
}

/// Checks a candidate upload against the configured extension allow-list and size cap.
///
/// Runs before any storage call; a rejected file never reaches the network.
pub fn validate_upload(
    config: &AppConfig,
    file_name: &str,
    file_size: u64,
) -> Result<(), UploadValidationError> {
    let lowered = file_name.to_lowercase();
    let accepted = config
        .allowed_extensions
        .iter()
        .any(|ext| lowered.ends_with(&ext.to_lowercase()));

    if !accepted {
        return Err(UploadValidationError::UnsupportedType(format!(
            "Unsupported file type. Allowed extensions are {}",
            config.allowed_extensions.join(", ")
        )));
    }

    if file_size > config.max_upload_bytes {
        return Err(UploadValidationError::PayloadTooLarge(format!(
            "File is too large. Maximum allowed is {} bytes",
            config.max_upload_bytes
        )));
    }

    Ok(())
}
