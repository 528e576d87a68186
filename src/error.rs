use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use http_body_util::LengthLimitError;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::ErrorResponse;

/// Failure of an external media tool (ffprobe / ffmpeg).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited unsuccessfully (code {code:?}): {stderr}")]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{tool} timed out after {seconds}s")]
    TimedOut { tool: &'static str, seconds: u64 },
    #[error("could not parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ffprobe reported no streams")]
    NoStreams,
    #[error("ffprobe reported a zero-height stream ({width}x0)")]
    ZeroHeight { width: u32 },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open object body for {key}: {message}")]
    Body { key: String, message: String },
    #[error("failed to put object {key} into bucket {bucket}: {message}")]
    Put {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Response category of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Auth,
    NotFound,
    Tool,
    Storage,
    Persistence,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid video id")]
    InvalidVideoId,
    #[error("invalid multipart request: {0}")]
    Multipart(String),
    #[error("no `{0}` file in request")]
    MissingFile(&'static str),
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    #[error("upload exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("missing bearer token")]
    MissingToken,
    #[error("couldn't validate JWT: {0}")]
    InvalidToken(String),
    #[error("not authorized to update this video")]
    NotOwner,

    #[error("video {0} not found")]
    VideoNotFound(Uuid),
    #[error("no thumbnail for video {0}")]
    ThumbnailNotFound(Uuid),

    #[error("failed to get video aspect ratio: {0}")]
    Inspect(#[source] ToolError),
    #[error("failed to process video for fast start: {0}")]
    Remux(#[source] ToolError),

    #[error("error uploading file to storage: {0}")]
    Storage(#[from] StorageError),

    #[error("couldn't update video: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidVideoId
            | AppError::Multipart(_)
            | AppError::MissingFile(_)
            | AppError::UnsupportedMediaType(_)
            | AppError::PayloadTooLarge { .. } => ErrorKind::Input,
            AppError::MissingToken | AppError::InvalidToken(_) | AppError::NotOwner => {
                ErrorKind::Auth
            }
            AppError::VideoNotFound(_) | AppError::ThumbnailNotFound(_) => ErrorKind::NotFound,
            AppError::Inspect(_) | AppError::Remux(_) => ErrorKind::Tool,
            AppError::Storage(_) => ErrorKind::Storage,
            AppError::Persistence(_) => ErrorKind::Persistence,
            AppError::Staging(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => match self.kind() {
                ErrorKind::Input => StatusCode::BAD_REQUEST,
                ErrorKind::Auth => StatusCode::UNAUTHORIZED,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Tool
                | ErrorKind::Storage
                | ErrorKind::Persistence
                | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Multipart read failure on a route whose files are capped at
    /// `max_file_size`. Every size overrun reports that cap, including the
    /// body limit layer tripping underneath multer.
    pub fn from_multipart(err: multer::Error, max_file_size: u64) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
                AppError::PayloadTooLarge {
                    limit: max_file_size,
                }
            }
            multer::Error::StreamReadFailed(source) if exceeds_body_limit(source.as_ref()) => {
                AppError::PayloadTooLarge {
                    limit: max_file_size,
                }
            }
            other => AppError::Multipart(other.to_string()),
        }
    }
}

fn exceeds_body_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = ?self.kind(), "{}", self);
        } else {
            warn!(kind = ?self.kind(), "{}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
