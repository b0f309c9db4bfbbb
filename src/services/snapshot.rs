//! HTML snapshots of the meeting page for post-mortem debugging.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::browser::MeetingPage;

pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes the page's current HTML to `<dir>/<timestamp>_<label>.html`.
/// Gives up after [`SNAPSHOT_TIMEOUT`].
pub async fn capture(page: Arc<dyn MeetingPage>, dir: &Path, label: &str) -> Result<PathBuf> {
    if page.is_closed() {
        anyhow::bail!("page already closed");
    }

    let html = tokio::time::timeout(SNAPSHOT_TIMEOUT, page.content())
        .await
        .context("Snapshot timed out")??;

    tokio::fs::create_dir_all(dir)
        .await
        .context("Failed to create snapshot directory")?;

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let path = dir.join(format!("{}_{}.html", stamp, label));
    tokio::fs::write(&path, html)
        .await
        .with_context(|| format!("Failed to write snapshot {:?}", path))?;

    debug!("Snapshot {} written to {:?}", label, path);
    Ok(path)
}

/// Fire-and-forget variant; failures are only logged.
pub fn spawn_capture(page: Arc<dyn MeetingPage>, dir: PathBuf, label: &'static str) {
    tokio::spawn(async move {
        if let Err(e) = capture(page, &dir, label).await {
            warn!("Snapshot {} failed: {}", label, e);
        }
    });
}
