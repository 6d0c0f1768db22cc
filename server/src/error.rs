use std::any::Any;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kernel::{ApiErrorReply, ErrorReply};
use thiserror::Error;

use crate::storage::StoreError;

const MIB: u64 = 1024 * 1024;

/// Everything that can end an upload request without a stored video.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No video file uploaded")]
    MissingFile,

    #[error("Only video files are allowed!")]
    NotAVideo,

    #[error("File is too large. Max size is {}MB.", .limit / MIB)]
    TooLarge { limit: u64 },

    /// Unparsable multipart body or a client that went away mid-stream
    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Storage(String),
}

impl UploadError {
    /// Client input problems are 400, storage faults 500.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UploadError::MissingFile
            | UploadError::NotAVideo
            | UploadError::TooLarge { .. }
            | UploadError::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TooLarge { limit } => UploadError::TooLarge { limit },
            StoreError::Interrupted(message) => UploadError::Malformed(message),
            StoreError::InvalidName(_) | StoreError::Io(_) => UploadError::Storage(e.to_string()),
        }
    }
}

/// `{error}` body, used by `POST /upload` and `GET /videos`.
#[derive(Debug)]
pub struct JsonError {
    status: StatusCode,
    message: String,
}

impl JsonError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<UploadError> for JsonError {
    fn from(e: UploadError) -> Self {
        Self::new(e.status(), e.to_string())
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        log_failure(self.status, &self.message);
        let body = ErrorReply {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// `{success: false, error}` body, used by `POST /api/upload`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        Self {
            status: e.status(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log_failure(self.status, &self.message);
        let body = ApiErrorReply {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Body shape of an upload endpoint's error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{error}`
    Plain,
    /// `{success: false, error}`
    Api,
}

/// What an upload route answers when the request body cap rejects a request.
#[derive(Debug, Clone, Copy)]
pub struct OversizeReply {
    pub limit: u64,
    pub envelope: Envelope,
}

impl OversizeReply {
    fn render(self) -> Response {
        let e = UploadError::TooLarge { limit: self.limit };
        match self.envelope {
            Envelope::Plain => JsonError::from(e).into_response(),
            Envelope::Api => ApiError::from(e).into_response(),
        }
    }
}

/// Replaces the plain text `413` of the body cap with the size limit error of the route.
pub async fn oversize_as_json(
    State(reply): State<OversizeReply>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        reply.render()
    } else {
        response
    }
}

/// Last resort for a panicking handler: a JSON 500 carrying the panic message.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "Unknown error".to_owned()
    };
    JsonError::new(StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

fn log_failure(status: StatusCode, message: &str) {
    if status.is_server_error() {
        tracing::error!("Error: {message}");
    } else {
        tracing::warn!("Rejected: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io;

    #[rstest]
    #[case(UploadError::MissingFile, StatusCode::BAD_REQUEST)]
    #[case(UploadError::NotAVideo, StatusCode::BAD_REQUEST)]
    #[case(UploadError::TooLarge { limit: MIB }, StatusCode::BAD_REQUEST)]
    #[case(UploadError::Malformed("eof".to_owned()), StatusCode::BAD_REQUEST)]
    #[case(UploadError::Storage("disk full".to_owned()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[trace]
    fn status_by_kind(#[case] err: UploadError, #[case] expected: StatusCode) {
        // Act
        let status = err.status();

        // Assert
        assert_eq!(status, expected);
    }

    #[rstest]
    #[case(StoreError::TooLarge { limit: 500 * MIB }, StatusCode::BAD_REQUEST)]
    #[case(StoreError::Interrupted("reset".to_owned()), StatusCode::BAD_REQUEST)]
    #[case(StoreError::InvalidName("..".to_owned()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(StoreError::Io(io::Error::other("disk full")), StatusCode::INTERNAL_SERVER_ERROR)]
    #[trace]
    fn store_errors_keep_their_class(#[case] err: StoreError, #[case] expected: StatusCode) {
        // Act
        let upload: UploadError = err.into();

        // Assert
        assert_eq!(upload.status(), expected);
    }

    #[test]
    fn too_large_message() {
        // Act
        let message = UploadError::TooLarge { limit: 500 * MIB }.to_string();

        // Assert
        assert_eq!(message, "File is too large. Max size is 500MB.");
    }

    #[rstest]
    #[case(Envelope::Plain)]
    #[case(Envelope::Api)]
    #[trace]
    fn oversize_reply_is_client_error(#[case] envelope: Envelope) {
        // Arrange
        let reply = OversizeReply {
            limit: 500 * MIB,
            envelope,
        };

        // Act
        let response = reply.render();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn panic_payload_becomes_server_error() {
        // Act
        let response = handle_panic(Box::new("boom"));

        // Assert
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
