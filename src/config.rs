use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 8091;
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 1 << 30;
pub const DEFAULT_MAX_THUMBNAIL_SIZE: u64 = 10 << 20;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub staging_dir: Option<String>,
    pub max_upload_size: Option<u64>,
    pub max_thumbnail_size: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    #[serde(default)]
    pub timeout_seconds: u64, // 0 = unbounded
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_seconds: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub stale_upload_max_age_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            stale_upload_max_age_seconds: 3600,
            cleanup_interval_seconds: 600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub tools: Option<ToolsConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub staging_dir: PathBuf,
    pub max_upload_size: u64,
    pub max_thumbnail_size: u64,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub jwt_secret: String,
    pub tools: ToolsConfig,
    pub limits: LimitsConfig,
}

impl Config {
    /// `config.toml` in the working directory, overridden by the environment.
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let config_path = base_dir.join("config.toml");
        let config_file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Some(toml::from_str::<ConfigFile>(&content)?)
        } else {
            None
        };

        Self::resolve(&base_dir, config_file, |key| std::env::var(key).ok())
    }

    /// Env vars win over the config file, which wins over defaults.
    pub fn resolve(
        base_dir: &Path,
        config_file: Option<ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file = config_file.unwrap_or_default();

        let port = env("PORT")
            .and_then(|p| p.parse().ok())
            .or(file.server.port)
            .unwrap_or(DEFAULT_PORT);

        let staging_dir = match env("STAGING_DIR").or_else(|| file.server.staging_dir.clone()) {
            Some(dir) if Path::new(&dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => base_dir.join(dir),
            None => std::env::temp_dir(),
        };

        let max_upload_size = env("MAX_UPLOAD_SIZE")
            .and_then(|v| v.parse().ok())
            .or(file.server.max_upload_size)
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);

        let max_thumbnail_size = env("MAX_THUMBNAIL_SIZE")
            .and_then(|v| v.parse().ok())
            .or(file.server.max_thumbnail_size)
            .unwrap_or(DEFAULT_MAX_THUMBNAIL_SIZE);

        let s3_bucket = env("S3_BUCKET")
            .or(file.storage.bucket)
            .ok_or_else(|| anyhow::anyhow!("S3_BUCKET must be set"))?;

        let s3_region = env("S3_REGION")
            .or(file.storage.region)
            .ok_or_else(|| anyhow::anyhow!("S3_REGION must be set"))?;

        let s3_endpoint = env("S3_ENDPOINT").or(file.storage.endpoint);

        let jwt_secret = env("JWT_SECRET")
            .or(file.auth.jwt_secret)
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let mut tools = file.tools.unwrap_or_default();
        if let Some(path) = env("FFPROBE_PATH") {
            tools.ffprobe_path = path;
        }
        if let Some(path) = env("FFMPEG_PATH") {
            tools.ffmpeg_path = path;
        }
        if let Some(seconds) = env("TOOL_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            tools.timeout_seconds = seconds;
        }

        let mut limits = file.limits.unwrap_or_default();
        if let Some(seconds) = env("STALE_UPLOAD_MAX_AGE_SECONDS").and_then(|v| v.parse().ok()) {
            limits.stale_upload_max_age_seconds = seconds;
        }
        if let Some(seconds) = env("CLEANUP_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            limits.cleanup_interval_seconds = seconds;
        }

        Ok(Self {
            port,
            staging_dir,
            max_upload_size,
            max_thumbnail_size,
            s3_bucket,
            s3_region,
            s3_endpoint,
            jwt_secret,
            tools,
            limits,
        })
    }
}
