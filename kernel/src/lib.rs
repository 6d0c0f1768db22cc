#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod format;

pub use format::{file_extension, VideoFormat};

/// Reply of the main upload endpoint (`POST /upload`).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    /// Human readable confirmation
    pub message: String,
    /// Name the video was stored under
    pub filename: String,
    /// File name as the client declared it
    pub original_name: String,
    /// Number of bytes written to disk
    pub size: u64,
    /// Location of the stored file on the server
    pub path: String,
    /// Location relative to the storage root, e.g. `videos/clip-17000000001234.mp4`
    pub saved_to: String,
    /// Outcome of the git mirror step. Absent when mirroring is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_to_git: Option<bool>,
}

/// Reply of the API upload endpoint (`POST /api/upload`).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiUploadReply {
    /// Always `true` for a successful upload
    pub success: bool,
    /// Human readable confirmation
    pub message: String,
    pub data: UploadData,
}

/// Details of a stored upload as reported by `POST /api/upload`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub saved_to: String,
    /// ISO-8601 timestamp assigned by the server
    pub uploaded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_to_git: Option<bool>,
}

/// Stored videos as returned by `GET /videos`.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VideoList {
    /// File names inside the videos directory
    pub videos: Vec<String>,
}

/// Error body of `POST /upload` and `GET /videos`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorReply {
    pub error: String,
}

/// Error body of `POST /api/upload`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorReply {
    /// Always `false`
    pub success: bool,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_reply_uses_camel_case_and_skips_absent_mirror() {
        // Arrange
        let reply = UploadReply {
            message: "Video uploaded successfully!".to_owned(),
            filename: "a-1.mp4".to_owned(),
            original_name: "a.mp4".to_owned(),
            size: 3,
            path: "/srv/videos/a-1.mp4".to_owned(),
            saved_to: "videos/a-1.mp4".to_owned(),
            pushed_to_git: None,
        };

        // Act
        let json = serde_json::to_value(&reply).unwrap();

        // Assert
        assert_eq!(json["originalName"], "a.mp4");
        assert_eq!(json["savedTo"], "videos/a-1.mp4");
        assert!(json.get("pushedToGit").is_none());
    }

    #[test]
    fn api_reply_reports_mirror_outcome() {
        // Arrange
        let reply = ApiUploadReply {
            success: true,
            message: "Video uploaded successfully!".to_owned(),
            data: UploadData {
                filename: "a.mp4".to_owned(),
                original_name: "a.mp4".to_owned(),
                size: 3,
                saved_to: "videos/a.mp4".to_owned(),
                uploaded_at: "2024-01-01T00:00:00.000Z".to_owned(),
                pushed_to_git: Some(false),
            },
        };

        // Act
        let json = serde_json::to_value(&reply).unwrap();

        // Assert
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["uploadedAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["data"]["pushedToGit"], false);
    }
}
