use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod assets;
pub mod auth;
pub mod cleanup;
pub mod config;
pub mod database;
pub mod error;
pub mod ffmpeg;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod system_info;

use handlers::{
    create_video_handler, get_thumbnail_handler, get_video_handler, reject_oversized_body,
    upload_thumbnail_handler, upload_video_handler, MULTIPART_OVERHEAD,
};
use models::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_size;
    let max_thumbnail = state.config.max_thumbnail_size;
    let video_limit = (max_upload + MULTIPART_OVERHEAD) as usize;
    let thumbnail_limit = (max_thumbnail + MULTIPART_OVERHEAD) as usize;

    Router::new()
        .route("/api/videos", post(create_video_handler))
        .route("/api/videos/:video_id", get(get_video_handler))
        .route(
            "/api/video_upload/:video_id",
            post(upload_video_handler)
                .layer(RequestBodyLimitLayer::new(video_limit))
                .layer(middleware::from_fn_with_state(max_upload, reject_oversized_body)),
        )
        .route(
            "/api/thumbnail_upload/:video_id",
            post(upload_thumbnail_handler)
                .layer(RequestBodyLimitLayer::new(thumbnail_limit))
                .layer(middleware::from_fn_with_state(max_thumbnail, reject_oversized_body)),
        )
        .route("/api/thumbnails/:video_id", get(get_thumbnail_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
