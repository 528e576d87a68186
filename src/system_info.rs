use serde::Serialize;
use sysinfo::System;
use tracing::{info, warn};

use crate::config::Config;
use crate::ffmpeg::tool_version;

#[derive(Serialize, Debug)]
pub struct SystemInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub cpu_model: String,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
    pub ffprobe: String,
    pub ffmpeg: String,
}

pub async fn get_system_info(config: &Config) -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu();

    let memory_total = system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0;
    let memory_free = system.available_memory() as f64 / 1024.0 / 1024.0 / 1024.0;

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let ffprobe = tool_version(&config.tools.ffprobe_path).await;
    let ffmpeg = tool_version(&config.tools.ffmpeg_path).await;

    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: system.cpus().len(),
        cpu_model,
        memory_total_gb: memory_total,
        memory_free_gb: memory_free,
        ffprobe: ffprobe.unwrap_or_else(|_| "not available".to_string()),
        ffmpeg: ffmpeg.unwrap_or_else(|_| "not available".to_string()),
    }
}

pub async fn log_startup_info(config: &Config) {
    let sys_info = get_system_info(config).await;

    info!("🚀 Tubely backend {} starting", sys_info.version);
    info!("  Platform: {} ({})", sys_info.platform, sys_info.arch);
    info!("  CPUs: {} ({})", sys_info.cpus, sys_info.cpu_model);
    info!(
        "  Memory: {:.2} GB total, {:.2} GB available",
        sys_info.memory_total_gb, sys_info.memory_free_gb
    );
    info!("  FFprobe: {}", sys_info.ffprobe);
    info!("  FFmpeg: {}", sys_info.ffmpeg);
    info!("  Staging Dir: {:?}", config.staging_dir);
    info!("  Bucket: {} ({})", config.s3_bucket, config.s3_region);
    info!("  Max Upload: {} MB", config.max_upload_size / 1024 / 1024);

    if sys_info.ffprobe == "not available" || sys_info.ffmpeg == "not available" {
        warn!("ffprobe/ffmpeg missing, every video upload will fail until they are installed");
    }
}
