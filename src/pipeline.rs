use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use mime_guess::mime::Mime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::assets::AssetKey;
use crate::database::VideoRepository;
use crate::error::AppError;
use crate::ffmpeg::{fast_start_output_path, video_aspect_ratio, MediaTools};
use crate::models::Video;
use crate::storage::ObjectStore;

/// The only media type the pipeline accepts.
pub const ACCEPTED_MEDIA_TYPE: &str = "video/mp4";

/// File name prefix of every staged upload.
pub const STAGING_PREFIX: &str = "tubely-upload-";

/// One uploaded file: its declared content type and its body.
pub struct VideoUpload<S> {
    pub content_type: Option<String>,
    pub body: S,
}

/// Upload payload on local disk, removed when dropped.
pub struct StagedFile {
    file: File,
    path: TempPath,
    len: u64,
}

impl StagedFile {
    fn create(dir: &Path) -> std::io::Result<Self> {
        let named = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".mp4")
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
            len: 0,
        })
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    async fn rewind(&mut self) -> std::io::Result<()> {
        self.file.flush().await?;
        self.file.rewind().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Fast-start output of a [`StagedFile`]. Removal is registered before the
/// remuxer writes anything, so partial output goes too.
pub struct ProcessedFile {
    path: TempPath,
}

impl ProcessedFile {
    fn reserve(staged: &Path) -> Self {
        Self {
            path: TempPath::from_path(fast_start_output_path(staged)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<File> {
        File::open(&self.path).await
    }
}

/// Essence of the declared content type, if it is exactly `video/mp4`.
pub fn validate_media_type(content_type: Option<&str>) -> Result<String, AppError> {
    let declared = content_type.ok_or_else(|| AppError::UnsupportedMediaType(String::new()))?;
    let mime: Mime = declared
        .parse()
        .map_err(|_| AppError::UnsupportedMediaType(declared.to_string()))?;

    if mime.essence_str() != ACCEPTED_MEDIA_TYPE {
        return Err(AppError::UnsupportedMediaType(declared.to_string()));
    }
    Ok(mime.essence_str().to_string())
}

/// Takes an authorized upload from the request body to a stored, linked object.
pub struct UploadPipeline {
    videos: Arc<dyn VideoRepository>,
    tools: Arc<dyn MediaTools>,
    store: Arc<dyn ObjectStore>,
    staging_dir: PathBuf,
    max_upload_size: u64,
}

impl UploadPipeline {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        tools: Arc<dyn MediaTools>,
        store: Arc<dyn ObjectStore>,
        staging_dir: PathBuf,
        max_upload_size: u64,
    ) -> Self {
        Self {
            videos,
            tools,
            store,
            staging_dir,
            max_upload_size,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Load the video and check that `user_id` owns it.
    pub async fn authorize(&self, video_id: Uuid, user_id: Uuid) -> Result<Video, AppError> {
        let video = self
            .videos
            .get_video(video_id)
            .await
            .map_err(AppError::Persistence)?
            .ok_or(AppError::VideoNotFound(video_id))?;

        if video.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        Ok(video)
    }

    /// Validate, stage, classify, remux, store and commit one upload.
    ///
    /// Temporary files live in guards scoped to this call and are removed on
    /// every return path, and when the future is dropped mid-flight.
    #[instrument(skip_all, fields(video_id = %video.id))]
    pub async fn process<S>(
        &self,
        video: Video,
        upload: VideoUpload<S>,
    ) -> Result<Video, AppError>
    where
        S: Stream<Item = Result<Bytes, AppError>> + Send,
    {
        let start = Instant::now();
        let declared = upload.content_type.clone().unwrap_or_default();
        let media_type = validate_media_type(upload.content_type.as_deref())?;

        let staged = self.stage(upload.body).await?;
        info!("[upload] staged {} bytes at {:?}", staged.len(), staged.path());

        let ratio = video_aspect_ratio(self.tools.as_ref(), staged.path())
            .await
            .map_err(AppError::Inspect)?;
        let key = AssetKey::new(ratio.key_prefix(), &media_type);
        info!("[upload] aspect ratio {} -> key {}", ratio.as_str(), key);

        let processed = ProcessedFile::reserve(staged.path());
        self.tools
            .remux_fast_start(staged.path(), processed.path())
            .await
            .map_err(AppError::Remux)?;
        let body = processed.open().await.map_err(AppError::Staging)?;

        self.store.put_object(key.as_str(), &declared, body).await?;

        let url = self.store.public_url(key.as_str());
        let video = self
            .videos
            .set_video_url(video.id, &url)
            .await
            .map_err(AppError::Persistence)?;

        info!(
            "[upload] ✅ stored {} in {:.2}s",
            key,
            start.elapsed().as_secs_f64()
        );
        Ok(video)
    }

    async fn stage<S>(&self, body: S) -> Result<StagedFile, AppError>
    where
        S: Stream<Item = Result<Bytes, AppError>> + Send,
    {
        let mut staged = StagedFile::create(&self.staging_dir).map_err(AppError::Staging)?;

        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if staged.len() + chunk.len() as u64 > self.max_upload_size {
                return Err(AppError::PayloadTooLarge {
                    limit: self.max_upload_size,
                });
            }
            staged.write_chunk(&chunk).await.map_err(AppError::Staging)?;
        }

        staged.rewind().await.map_err(AppError::Staging)?;
        Ok(staged)
    }
}
