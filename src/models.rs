use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::database::VideoRepository;
use crate::ffmpeg::MediaTools;
use crate::pipeline::UploadPipeline;
use crate::storage::ObjectStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub user_id: Uuid,
}

impl Video {
    pub fn new(user_id: Uuid, title: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title,
            description,
            thumbnail_url: None,
            video_url: None,
            user_id,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateVideoRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Thumbnail image kept in memory.
#[derive(Clone, Debug)]
pub struct Thumbnail {
    pub media_type: String,
    pub data: Bytes,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct AppState {
    pub config: Config,
    pub videos: Arc<dyn VideoRepository>,
    pub pipeline: UploadPipeline,
    pub thumbnails: RwLock<HashMap<Uuid, Thumbnail>>,
}

impl AppState {
    pub fn new(
        config: Config,
        videos: Arc<dyn VideoRepository>,
        tools: Arc<dyn MediaTools>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let pipeline = UploadPipeline::new(
            videos.clone(),
            tools,
            store,
            config.staging_dir.clone(),
            config.max_upload_size,
        );
        Self {
            config,
            videos,
            pipeline,
            thumbnails: RwLock::new(HashMap::new()),
        }
    }
}
