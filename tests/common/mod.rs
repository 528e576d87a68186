#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use tubely_backend::{
    config::{Config, LimitsConfig, ToolsConfig},
    database::{InMemoryVideoRepository, VideoRepository},
    error::{AppError, StorageError, ToolError},
    ffmpeg::MediaTools,
    models::{AppState, Video},
    storage::{s3_object_url, ObjectStore},
};

pub const BUCKET: &str = "tubely-test";
pub const REGION: &str = "us-east-2";
pub const JWT_SECRET: &str = "integration-test-secret";

/// Prefix the fake remuxer puts in front of the staged bytes.
pub const FAST_START_MARKER: &[u8] = b"moov-first:";

pub struct FakeTools {
    dimensions: Option<(u32, u32)>,
    remux_fails: bool,
    pub probe_calls: AtomicUsize,
    pub remux_calls: AtomicUsize,
}

impl FakeTools {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            dimensions: Some((width, height)),
            remux_fails: false,
            probe_calls: AtomicUsize::new(0),
            remux_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_probe() -> Self {
        Self {
            dimensions: None,
            ..Self::with_dimensions(0, 0)
        }
    }

    pub fn failing_remux() -> Self {
        Self {
            remux_fails: true,
            ..Self::with_dimensions(1920, 1080)
        }
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32), ToolError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        assert!(path.exists(), "probe must run against the staged file");
        self.dimensions.ok_or_else(|| ToolError::Failed {
            tool: "ffprobe",
            code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        })
    }

    async fn remux_fast_start(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.remux_calls.fetch_add(1, Ordering::SeqCst);
        let staged = tokio::fs::read(input).await.expect("staged file readable");
        let mut processed = FAST_START_MARKER.to_vec();
        processed.extend_from_slice(&staged);

        if self.remux_fails {
            // leave a partial file behind, like an interrupted ffmpeg run
            tokio::fs::write(output, &processed[..processed.len() / 2])
                .await
                .expect("partial output written");
            return Err(ToolError::Failed {
                tool: "ffmpeg",
                code: Some(1),
                stderr: "moov atom not found".to_string(),
            });
        }

        tokio::fs::write(output, processed)
            .await
            .expect("output written");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct FakeStore {
    fail: bool,
    pub objects: Mutex<HashMap<String, StoredObject>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn objects(&self) -> HashMap<String, StoredObject> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        mut body: File,
    ) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Put {
                bucket: BUCKET.to_string(),
                key: key.to_string(),
                message: "AccessDenied".to_string(),
            });
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        s3_object_url(BUCKET, REGION, key)
    }
}

/// Record store whose updates always fail.
#[derive(Default)]
pub struct ReadOnlyRepository {
    inner: InMemoryVideoRepository,
}

#[async_trait]
impl VideoRepository for ReadOnlyRepository {
    async fn create_video(&self, video: Video) -> anyhow::Result<Video> {
        self.inner.create_video(video).await
    }

    async fn get_video(&self, id: Uuid) -> anyhow::Result<Option<Video>> {
        self.inner.get_video(id).await
    }

    async fn set_video_url(&self, _id: Uuid, _url: &str) -> anyhow::Result<Video> {
        anyhow::bail!("database is read-only")
    }

    async fn set_thumbnail_url(&self, _id: Uuid, _url: &str) -> anyhow::Result<Video> {
        anyhow::bail!("database is read-only")
    }
}

pub fn test_config(staging_dir: &Path, max_upload_size: u64) -> Config {
    Config {
        port: 8091,
        staging_dir: staging_dir.to_path_buf(),
        max_upload_size,
        max_thumbnail_size: 1024,
        s3_bucket: BUCKET.to_string(),
        s3_region: REGION.to_string(),
        s3_endpoint: None,
        jwt_secret: JWT_SECRET.to_string(),
        tools: ToolsConfig::default(),
        limits: LimitsConfig::default(),
    }
}

pub struct Harness {
    pub staging: TempDir,
    pub videos: Arc<dyn VideoRepository>,
    pub tools: Arc<FakeTools>,
    pub store: Arc<FakeStore>,
    pub state: Arc<AppState>,
    pub owner: Uuid,
    pub video: Video,
}

impl Harness {
    pub async fn new(tools: FakeTools, store: FakeStore) -> Self {
        Self::build(tools, store, Arc::new(InMemoryVideoRepository::new()), 1 << 20).await
    }

    pub async fn build(
        tools: FakeTools,
        store: FakeStore,
        videos: Arc<dyn VideoRepository>,
        max_upload_size: u64,
    ) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let tools = Arc::new(tools);
        let store = Arc::new(store);
        let owner = Uuid::new_v4();
        let video = videos
            .create_video(Video::new(owner, "Boots".into(), "A pair of boots".into()))
            .await
            .unwrap();

        let state = Arc::new(AppState::new(
            test_config(staging.path(), max_upload_size),
            videos.clone(),
            tools.clone(),
            store.clone(),
        ));

        Self {
            staging,
            videos,
            tools,
            store,
            state,
            owner,
            video,
        }
    }

    /// Files currently in the staging directory.
    pub fn staged_count(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }

    pub async fn stored_video(&self) -> Video {
        self.videos.get_video(self.video.id).await.unwrap().unwrap()
    }
}

/// `data` split into `chunk_size` pieces, as a request body would arrive.
pub fn body_stream(
    data: &[u8],
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, AppError>> + Send {
    let chunks: Vec<Result<Bytes, AppError>> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks)
}

pub fn sample_mp4() -> Vec<u8> {
    let mut data = b"\x00\x00\x00\x18ftypmp42".to_vec();
    data.extend(std::iter::repeat(0xAB).take(4096));
    data
}
