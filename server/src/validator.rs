use kernel::{file_extension, VideoFormat};

use crate::error::UploadError;

/// Accepts an upload only if both its declared extension and declared content
/// type belong to the allow-set. Runs before any byte of the body is read.
pub fn validate(file_name: &str, content_type: Option<&str>) -> Result<VideoFormat, UploadError> {
    let by_extension = file_extension(file_name).and_then(VideoFormat::from_extension);
    let mime_accepted = content_type.is_some_and(VideoFormat::matches_mime);

    match by_extension {
        Some(format) if mime_accepted => Ok(format),
        _ => Err(UploadError::NotAVideo),
    }
}
