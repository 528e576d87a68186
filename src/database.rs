use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Video;

/// Video record persistence.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, video: Video) -> anyhow::Result<Video>;
    async fn get_video(&self, id: Uuid) -> anyhow::Result<Option<Video>>;
    /// Sets `video_url` and touches `updated_at`, leaving every other stored
    /// field as it is at the time of the write.
    async fn set_video_url(&self, id: Uuid, url: &str) -> anyhow::Result<Video>;
    /// Same as [`VideoRepository::set_video_url`], for `thumbnail_url`.
    async fn set_thumbnail_url(&self, id: Uuid, url: &str) -> anyhow::Result<Video>;
}

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<Uuid, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify(&self, id: Uuid, apply: impl FnOnce(&mut Video)) -> anyhow::Result<Video> {
        let mut videos = self.videos.write().await;
        let Some(existing) = videos.get_mut(&id) else {
            anyhow::bail!("video {} does not exist", id);
        };
        apply(existing);
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create_video(&self, video: Video) -> anyhow::Result<Video> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&video.id) {
            anyhow::bail!("video {} already exists", video.id);
        }
        videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> anyhow::Result<Option<Video>> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn set_video_url(&self, id: Uuid, url: &str) -> anyhow::Result<Video> {
        self.modify(id, |video| video.video_url = Some(url.to_string()))
            .await
    }

    async fn set_thumbnail_url(&self, id: Uuid, url: &str) -> anyhow::Result<Video> {
        self.modify(id, |video| video.thumbnail_url = Some(url.to_string()))
            .await
    }
}
