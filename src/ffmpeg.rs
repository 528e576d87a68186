use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolsConfig;
use crate::error::ToolError;

/// Suffix appended to a staged file to name its fast-start output.
pub const PROCESSING_SUFFIX: &str = ".processing";

/// The external media tools the upload pipeline depends on.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Width and height of the first stream in `path`.
    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32), ToolError>;

    /// Copy every stream of `input` into `output` with the index moved to the front.
    async fn remux_fast_start(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Coarse orientation bucket of a video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AspectRatio {
    Landscape,
    Portrait,
    Other,
}

impl AspectRatio {
    /// Buckets by integer division of width by height, so every ratio in
    /// `[1, 2)` is landscape and everything from 2 upwards is other.
    pub fn classify(width: u32, height: u32) -> Option<Self> {
        if height == 0 {
            return None;
        }
        Some(match width / height {
            0 => AspectRatio::Portrait,
            1 => AspectRatio::Landscape,
            _ => AspectRatio::Other,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Other => "other",
        }
    }

    pub fn key_prefix(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
            AspectRatio::Other => "other",
        }
    }
}

/// Probe `path` and bucket its first stream.
pub async fn video_aspect_ratio(
    tools: &dyn MediaTools,
    path: &Path,
) -> Result<AspectRatio, ToolError> {
    let (width, height) = tools.probe_dimensions(path).await?;
    AspectRatio::classify(width, height).ok_or(ToolError::ZeroHeight { width })
}

/// `<input>.processing`, next to the input.
pub fn fast_start_output_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(PROCESSING_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Pull the first stream's geometry out of `ffprobe -print_format json -show_streams`.
pub fn parse_probe_output(stdout: &[u8]) -> Result<(u32, u32), ToolError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = output.streams.first().ok_or(ToolError::NoStreams)?;
    Ok((stream.width, stream.height))
}

/// ffprobe / ffmpeg invoked as subprocesses.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    ffprobe_path: String,
    ffmpeg_path: String,
    timeout: Option<Duration>,
}

impl Ffmpeg {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: (config.timeout_seconds > 0)
                .then(|| Duration::from_secs(config.timeout_seconds)),
        }
    }

    async fn run(&self, tool: &'static str, mut command: Command) -> Result<Output, ToolError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ToolError::TimedOut {
                    tool,
                    seconds: limit.as_secs(),
                })?,
            None => command.output().await,
        }
        .map_err(|source| ToolError::Spawn { tool, source })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaTools for Ffmpeg {
    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32), ToolError> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(path);

        let output = self.run("ffprobe", command).await?;
        let dimensions = parse_probe_output(&output.stdout)?;
        debug!("[ffprobe] {:?}: {}x{}", path, dimensions.0, dimensions.1);
        Ok(dimensions)
    }

    async fn remux_fast_start(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-v")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("faststart")
            .arg("-f")
            .arg("mp4")
            .arg(output);

        self.run("ffmpeg", command).await?;
        Ok(())
    }
}

/// First line of `<binary> -version`.
pub async fn tool_version(binary: &str) -> anyhow::Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!("{} not available", binary);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    Ok(version.lines().next().unwrap_or("unknown").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_landscape_and_other_buckets() {
        assert_eq!(AspectRatio::classify(1080, 1920), Some(AspectRatio::Portrait));
        assert_eq!(AspectRatio::classify(1920, 1080), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::classify(3840, 1080), Some(AspectRatio::Other));
    }

    #[test]
    fn integer_division_collapses_squares_into_landscape() {
        assert_eq!(AspectRatio::classify(1000, 1000), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::classify(1999, 1000), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::classify(2000, 1000), Some(AspectRatio::Other));
        assert_eq!(AspectRatio::classify(0, 720), Some(AspectRatio::Portrait));
        assert_eq!(AspectRatio::classify(1280, 0), None);
    }

    #[test]
    fn ratio_labels_and_prefixes() {
        assert_eq!(AspectRatio::Portrait.as_str(), "9:16");
        assert_eq!(AspectRatio::Portrait.key_prefix(), "portrait");
        assert_eq!(AspectRatio::Landscape.as_str(), "16:9");
        assert_eq!(AspectRatio::Landscape.key_prefix(), "landscape");
        assert_eq!(AspectRatio::Other.as_str(), "other");
        assert_eq!(AspectRatio::Other.key_prefix(), "other");
    }

    #[test]
    fn parses_first_stream_of_ffprobe_json() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 1080, "height": 1920},
                {"index": 1, "codec_type": "audio"}
            ]
        }"#;
        assert_eq!(parse_probe_output(json).unwrap(), (1080, 1920));
    }

    #[test]
    fn missing_or_empty_streams_are_errors() {
        assert!(matches!(
            parse_probe_output(br#"{"streams": []}"#),
            Err(ToolError::NoStreams)
        ));
        assert!(matches!(parse_probe_output(b"{}"), Err(ToolError::NoStreams)));
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(ToolError::Parse(_))
        ));
    }

    #[test]
    fn audio_first_stream_reads_as_zero_dimensions() {
        let json = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert_eq!(parse_probe_output(json).unwrap(), (0, 0));
    }

    #[test]
    fn fast_start_output_sits_next_to_input() {
        let output = fast_start_output_path(Path::new("/tmp/tubely-upload-abc.mp4"));
        assert_eq!(output, PathBuf::from("/tmp/tubely-upload-abc.mp4.processing"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let tools = Ffmpeg::new(&ToolsConfig {
            ffprobe_path: "/nonexistent/ffprobe".to_string(),
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            timeout_seconds: 0,
        });

        let err = tools
            .probe_dimensions(Path::new("/tmp/missing.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { tool: "ffprobe", .. }));

        let err = tools
            .remux_fast_start(Path::new("/tmp/a.mp4"), Path::new("/tmp/a.mp4.processing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { tool: "ffmpeg", .. }));
    }
}
