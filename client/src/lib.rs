use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use endpoint::Endpoint;
use kernel::{ApiUploadReply, UploadData, UploadReply, VideoFormat, VideoList};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub mod endpoint;

/// Multipart field the server reads the video from.
const VIDEO_FIELD: &str = "video";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URI: {0}")]
    InvalidUri(String),

    #[error("{0} is not a video file")]
    NotAVideo(String),

    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

pub struct UploadParams {
    pub uri: String,
    pub file: PathBuf,
    /// Use `POST /upload` instead of `POST /api/upload`.
    pub legacy: bool,
}

/// Reply of whichever upload endpoint was called.
#[derive(Debug)]
pub enum Uploaded {
    Legacy(UploadReply),
    Api(UploadData),
}

impl Uploaded {
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Uploaded::Legacy(r) => &r.filename,
            Uploaded::Api(d) => &d.filename,
        }
    }
}

/// Streams a local video file to the server.
///
/// Files whose extension is not a supported video format are refused before
/// any connection is made.
pub async fn upload_video(params: &UploadParams) -> Result<Uploaded, ClientError> {
    let file_name = params
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = VideoFormat::from_file_name(&file_name)
        .ok_or_else(|| ClientError::NotAVideo(params.file.display().to_string()))?;

    let route = if params.legacy { "upload" } else { "api/upload" };
    let endpoint = endpoint(&params.uri)?.join(route);

    let part = file_part(&params.file)
        .await?
        .file_name(file_name)
        .mime_str(format.mime_type())?;
    let form = Form::new().part(VIDEO_FIELD, part);

    let response = Client::new()
        .post(endpoint.to_string())
        .multipart(form)
        .send()
        .await?;
    let response = ensure_success(response).await?;

    if params.legacy {
        Ok(Uploaded::Legacy(response.json().await?))
    } else {
        let reply: ApiUploadReply = response.json().await?;
        Ok(Uploaded::Api(reply.data))
    }
}

pub async fn list_videos(uri: &str) -> Result<VideoList, ClientError> {
    let endpoint = endpoint(uri)?.join("videos");
    let response = Client::new().get(endpoint.to_string()).send().await?;
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

#[must_use]
pub fn videos_table(list: &VideoList) -> Table {
    let mut table = new_table(vec!["#", "Video"]);
    for (i, name) in list.videos.iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(name)]);
    }
    table
}

#[must_use]
pub fn upload_table(uploaded: &Uploaded) -> Table {
    let mut table = new_table(vec!["Property", "Value"]);
    let (original, size, saved_to, pushed, uploaded_at) = match uploaded {
        Uploaded::Legacy(r) => (&r.original_name, r.size, &r.saved_to, r.pushed_to_git, None),
        Uploaded::Api(d) => (
            &d.original_name,
            d.size,
            &d.saved_to,
            d.pushed_to_git,
            Some(&d.uploaded_at),
        ),
    };
    table.add_row(vec![Cell::new("Stored as"), Cell::new(uploaded.filename())]);
    table.add_row(vec![Cell::new("Original name"), Cell::new(original)]);
    table.add_row(vec![Cell::new("Size (bytes)"), Cell::new(size)]);
    table.add_row(vec![Cell::new("Saved to"), Cell::new(saved_to)]);
    if let Some(at) = uploaded_at {
        table.add_row(vec![Cell::new("Uploaded at"), Cell::new(at)]);
    }
    if let Some(pushed) = pushed {
        let pushed = if pushed { "yes" } else { "no" };
        table.add_row(vec![Cell::new("Pushed to git"), Cell::new(pushed)]);
    }
    table
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

fn endpoint(uri: &str) -> Result<Endpoint, ClientError> {
    Endpoint::new(uri).ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))
}

async fn file_part(path: &Path) -> Result<Part, ClientError> {
    let io_error = |source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).await.map_err(io_error)?;
    let length = file.metadata().await.map_err(io_error)?.len();
    let body = Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, length))
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message: rejection_message(&body),
    })
}

/// Both `{error}` and `{success, error}` bodies carry the reason in `error`.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"error":"Only video files are allowed!"}"#, "Only video files are allowed!")]
    #[case(r#"{"success":false,"error":"No video file uploaded"}"#, "No video file uploaded")]
    #[case("length limit exceeded\n", "length limit exceeded")]
    #[case(r#"{"message":"x"}"#, r#"{"message":"x"}"#)]
    #[trace]
    fn rejection_message_tests(#[case] body: &str, #[case] expected: &str) {
        // Act
        let message = rejection_message(body);

        // Assert
        assert_eq!(message, expected);
    }

    #[tokio::test]
    async fn non_video_is_refused_locally() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"hello").unwrap();
        let params = UploadParams {
            uri: "http://127.0.0.1:9".to_owned(),
            file,
            legacy: false,
        };

        // Act
        let result = upload_video(&params).await;

        // Assert
        assert!(matches!(result, Err(ClientError::NotAVideo(_))));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let params = UploadParams {
            uri: "http://127.0.0.1:9".to_owned(),
            file: dir.path().join("absent.mp4"),
            legacy: true,
        };

        // Act
        let result = upload_video(&params).await;

        // Assert
        assert!(matches!(result, Err(ClientError::Io { .. })));
    }

    #[tokio::test]
    async fn invalid_uri_is_reported() {
        // Act
        let result = list_videos("localhost:3000").await;

        // Assert
        assert!(matches!(result, Err(ClientError::InvalidUri(_))));
    }

    #[test]
    fn upload_table_shows_mirror_state() {
        // Arrange
        let uploaded = Uploaded::Api(UploadData {
            filename: "clip-1.mp4".to_owned(),
            original_name: "clip.mp4".to_owned(),
            size: 42,
            saved_to: "videos/clip-1.mp4".to_owned(),
            uploaded_at: "2024-01-01T00:00:00.000Z".to_owned(),
            pushed_to_git: Some(false),
        });

        // Act
        let rendered = upload_table(&uploaded).to_string();

        // Assert
        assert!(rendered.contains("clip-1.mp4"));
        assert!(rendered.contains("Pushed to git"));
        assert!(rendered.contains("no"));
    }

    #[test]
    fn videos_table_numbers_rows() {
        // Arrange
        let list = VideoList {
            videos: vec!["a.mp4".to_owned(), "b.webm".to_owned()],
        };

        // Act
        let rendered = videos_table(&list).to_string();

        // Assert
        assert!(rendered.contains("a.mp4"));
        assert!(rendered.contains("b.webm"));
    }
}
