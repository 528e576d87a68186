use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use bytes::BytesMut;
use futures::TryStreamExt;
use multer::{Constraints, Field, Multipart, SizeLimit};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{AppState, CreateVideoRequest, Thumbnail, Video};
use crate::pipeline::VideoUpload;

/// Room for multipart boundaries and part headers on top of the file itself.
pub const MULTIPART_OVERHEAD: u64 = 1 << 20;

const THUMBNAIL_MEDIA_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidVideoId)
}

/// Streaming multipart reader over the request body.
fn multipart_from_request(
    request: Request<Body>,
    max_file_size: u64,
) -> Result<Multipart<'static>, AppError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Multipart("missing Content-Type header".to_string()))?;

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| AppError::from_multipart(e, max_file_size))?;

    Ok(Multipart::with_constraints(
        request.into_body().into_data_stream(),
        boundary,
        Constraints::new().size_limit(
            SizeLimit::new()
                .whole_stream(max_file_size + MULTIPART_OVERHEAD)
                .per_field(max_file_size),
        ),
    ))
}

/// Skip ahead to the part called `name`, draining anything before it.
async fn next_file_field(
    multipart: &mut Multipart<'static>,
    name: &'static str,
    max_file_size: u64,
) -> Result<Field<'static>, AppError> {
    let multipart_err = |e| AppError::from_multipart(e, max_file_size);
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() == Some(name) {
            return Ok(field);
        }
        while field.chunk().await.map_err(multipart_err)?.is_some() {
            // Drain the field
        }
    }
    Err(AppError::MissingFile(name))
}

/// Route middleware: a declared `Content-Length` beyond what a `max_file_size`
/// upload can need is refused before the body is touched.
pub async fn reject_oversized_body(
    State(max_file_size): State<u64>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(len) = declared {
        if len > max_file_size + MULTIPART_OVERHEAD {
            return Err(AppError::PayloadTooLarge {
                limit: max_file_size,
            });
        }
    }
    Ok(next.run(request).await)
}

/// Upload the video file for an existing video record
pub async fn upload_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    auth: AuthUser,
    request: Request<Body>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    info!("[POST /api/video_upload] video {} by user {}", video_id, auth.user_id);

    let video = state.pipeline.authorize(video_id, auth.user_id).await?;

    let max_size = state.config.max_upload_size;
    let mut multipart = multipart_from_request(request, max_size)?;
    let field = next_file_field(&mut multipart, "video", max_size).await?;
    let upload = VideoUpload {
        content_type: field.content_type().map(|m| m.to_string()),
        body: field.map_err(move |e| AppError::from_multipart(e, max_size)),
    };

    let video = state.pipeline.process(video, upload).await?;
    Ok(Json(video))
}

/// Upload a thumbnail image, kept in memory and served back by [`get_thumbnail_handler`]
pub async fn upload_thumbnail_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    auth: AuthUser,
    request: Request<Body>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    info!("[POST /api/thumbnail_upload] video {} by user {}", video_id, auth.user_id);

    let video = state.pipeline.authorize(video_id, auth.user_id).await?;

    let max_size = state.config.max_thumbnail_size;
    let mut multipart = multipart_from_request(request, max_size)?;
    let mut field = next_file_field(&mut multipart, "thumbnail", max_size).await?;

    let media_type = field
        .content_type()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_default();
    if !THUMBNAIL_MEDIA_TYPES.contains(&media_type.as_str()) {
        return Err(AppError::UnsupportedMediaType(media_type));
    }

    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::from_multipart(e, max_size))?
    {
        if (data.len() + chunk.len()) as u64 > max_size {
            return Err(AppError::PayloadTooLarge { limit: max_size });
        }
        data.extend_from_slice(&chunk);
    }

    state.thumbnails.write().await.insert(
        video.id,
        Thumbnail {
            media_type,
            data: data.freeze(),
        },
    );

    let url = format!(
        "http://localhost:{}/api/thumbnails/{}",
        state.config.port, video.id
    );
    let video = state
        .videos
        .set_thumbnail_url(video.id, &url)
        .await
        .map_err(AppError::Persistence)?;

    Ok(Json(video))
}

pub async fn get_thumbnail_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Response, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let thumbnail = state
        .thumbnails
        .read()
        .await
        .get(&video_id)
        .cloned()
        .ok_or(AppError::ThumbnailNotFound(video_id))?;

    Ok(([(CONTENT_TYPE, thumbnail.media_type)], thumbnail.data).into_response())
}

/// Create a draft video record owned by the caller
pub async fn create_video_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<Video>), AppError> {
    let video = state
        .videos
        .create_video(Video::new(auth.user_id, request.title, request.description))
        .await
        .map_err(AppError::Persistence)?;

    info!("[POST /api/videos] created video {} for user {}", video.id, auth.user_id);
    Ok((StatusCode::CREATED, Json(video)))
}

pub async fn get_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let video = state
        .videos
        .get_video(video_id)
        .await
        .map_err(AppError::Persistence)?
        .ok_or(AppError::VideoNotFound(video_id))?;

    Ok(Json(video))
}
