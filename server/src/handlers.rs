#![allow(clippy::unused_async)]
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use kernel::{ApiErrorReply, ApiUploadReply, ErrorReply, UploadData, UploadReply, VideoList};
use utoipa::{OpenApi, ToSchema};

use crate::domain::{MirrorOutcome, StoredVideo};
use crate::error::{ApiError, JsonError, UploadError};
use crate::naming::{self, Uniqueness};
use crate::storage::StreamFault;
use crate::validator::validate;
use crate::{ApiDoc, AppState};

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

/// Multipart body accepted by both upload endpoints. Only documents the request.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct VideoForm {
    /// The video file. Any other form field is ignored.
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
}

const UPLOADED: &str = "Video uploaded successfully!";
const MIB: f64 = 1024.0 * 1024.0;

/// Stores a video sent as multipart field `video`.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "videos",
    request_body(content = VideoForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video stored", body = UploadReply),
        (status = 400, description = "No file, not a video or too large", body = ErrorReply),
        (status = 500, description = "Server error", body = ErrorReply)
    ),
)]
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReply>, JsonError> {
    let ingested = ingest(&state, multipart).await?;
    let video = &ingested.video;

    tracing::info!(
        "Video uploaded: {} ({:.2} MB)",
        video.stored_filename,
        video.size_bytes as f64 / MIB
    );

    Ok(Json(UploadReply {
        message: UPLOADED.to_owned(),
        filename: video.stored_filename.clone(),
        original_name: video.original_filename.clone(),
        size: video.size_bytes,
        path: video.storage_path.display().to_string(),
        saved_to: state.saved_to(&video.stored_filename),
        pushed_to_git: ingested.pushed_to_git(),
    }))
}

/// Same as `/upload` with the reply wrapped in a `success` envelope.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "videos",
    request_body(content = VideoForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video stored", body = ApiUploadReply),
        (status = 400, description = "No file, not a video or too large", body = ApiErrorReply),
        (status = 500, description = "Server error", body = ApiErrorReply)
    ),
)]
pub async fn api_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiUploadReply>, ApiError> {
    let ingested = ingest(&state, multipart).await?;
    let video = &ingested.video;

    tracing::info!(
        "API Upload: {} ({} bytes)",
        video.stored_filename,
        video.size_bytes
    );

    Ok(Json(ApiUploadReply {
        success: true,
        message: UPLOADED.to_owned(),
        data: UploadData {
            filename: video.stored_filename.clone(),
            original_name: video.original_filename.clone(),
            size: video.size_bytes,
            saved_to: state.saved_to(&video.stored_filename),
            uploaded_at: video
                .uploaded_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            pushed_to_git: ingested.pushed_to_git(),
        },
    }))
}

/// Lists stored videos
#[utoipa::path(
    get,
    path = "/videos",
    tag = "videos",
    responses(
        (status = 200, description = "Stored video names", body = VideoList),
        (status = 500, description = "Videos directory unreadable", body = ErrorReply)
    ),
)]
pub async fn list_videos(State(state): State<AppState>) -> Result<Json<VideoList>, JsonError> {
    match state.store.list().await {
        Ok(videos) => Ok(Json(VideoList { videos })),
        Err(e) => {
            tracing::error!(
                "videos directory {} not read. Error: {}",
                state.store.dir().display(),
                e
            );
            Err(JsonError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unable to read videos directory",
            ))
        }
    }
}

/// OpenAPI description of this service.
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

impl StreamFault for MultipartError {
    fn exceeds_limit(&self) -> bool {
        self.status() == StatusCode::PAYLOAD_TOO_LARGE
    }
}

struct Ingested {
    video: StoredVideo,
    mirror: Option<MirrorOutcome>,
}

impl Ingested {
    fn pushed_to_git(&self) -> Option<bool> {
        self.mirror.as_ref().map(|m| m.succeeded)
    }
}

/// Receiving → Validating → Writing → Mirroring. Rejection happens before the
/// body of the video part is read; a mirror failure only degrades the outcome.
async fn ingest(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Ingested, UploadError> {
    let mut multipart = multipart.map_err(|e| UploadError::Malformed(e.body_text()))?;
    let limit = state.store.max_file_size();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.exceeds_limit() {
            UploadError::TooLarge { limit }
        } else {
            UploadError::Malformed(e.body_text())
        }
    })? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        let original = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_owned(),
            // a plain text field named `video` is not a file
            _ => continue,
        };
        let content_type = field.content_type().map(str::to_owned);

        let format = match validate(&original, content_type.as_deref()) {
            Ok(format) => format,
            Err(e) => {
                tracing::warn!(
                    "file '{}' ({}) rejected",
                    original,
                    content_type.as_deref().unwrap_or("no content type")
                );
                return Err(e);
            }
        };

        let stored_filename =
            naming::stored_name(state.naming, &original, format, Uniqueness::now());
        let stored = state.store.write(&stored_filename, field).await?;
        tracing::debug!("file: {} read: {}", stored_filename, stored.size);

        let video = StoredVideo {
            stored_filename,
            original_filename: original,
            size_bytes: stored.size,
            storage_path: stored.path,
            uploaded_at: Utc::now(),
        };

        let mirror = match &state.mirror {
            Some(mirror) => Some(Arc::clone(mirror).sync_detached(video.clone()).await),
            None => None,
        };

        return Ok(Ingested { video, mirror });
    }

    Err(UploadError::MissingFile)
}
