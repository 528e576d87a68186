use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline::STAGING_PREFIX;

/// Remove staged uploads (and their fast-start outputs) older than `max_age`.
///
/// Requests clean up after themselves; this only catches what a killed
/// process left behind.
pub async fn sweep_stale_uploads(dir: &Path, max_age: Duration) -> anyhow::Result<usize> {
    if !fs::try_exists(dir).await? {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut deleted = 0;
    let mut freed = 0u64;
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_staged = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with(STAGING_PREFIX))
            .unwrap_or(false);
        if !is_staged {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("[cleanup] Failed to get metadata for {:?}: {}", path, e);
                continue;
            }
        };

        let age = match metadata.modified().map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            // unreadable or future mtime
            _ => continue,
        };

        if age > max_age {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    freed += metadata.len();
                    info!(
                        "[cleanup] Deleted stale upload {:?} (age: {:.1} min)",
                        path,
                        age.as_secs_f64() / 60.0
                    );
                }
                Err(e) => error!("[cleanup] Failed to delete {:?}: {}", path, e),
            }
        }
    }

    if deleted > 0 {
        info!(
            "[cleanup] ✅ {} stale uploads deleted, {:.2} MB freed",
            deleted,
            freed as f64 / 1024.0 / 1024.0
        );
    }

    Ok(deleted)
}

/// Start a background task that periodically sweeps the staging directory
pub fn start_cleanup_task(config: &Config) -> tokio::task::JoinHandle<()> {
    let dir: PathBuf = config.staging_dir.clone();
    let max_age = Duration::from_secs(config.limits.stale_upload_max_age_seconds);
    let cleanup_interval = Duration::from_secs(config.limits.cleanup_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[cleanup] 🧹 Sweeping {:?} every {:.1} min (max age: {:.1} min)",
            dir,
            cleanup_interval.as_secs_f64() / 60.0,
            max_age.as_secs_f64() / 60.0
        );

        loop {
            interval.tick().await;

            if let Err(e) = sweep_stale_uploads(&dir, max_age).await {
                error!("[cleanup] Periodic cleanup error: {}", e);
            }
        }
    })
}
