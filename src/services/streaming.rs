//! Live audio telemetry from the meeting page.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::browser::MeetingPage;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait StreamingSession: Send + Sync {
    /// Latest observed sound level, 0-100. Zero while paused.
    fn sound_level(&self) -> f32;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Polls the page's audio level in the background.
pub struct PageAudioStream {
    level: Arc<AtomicU32>,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PageAudioStream {
    pub fn spawn(page: Arc<dyn MeetingPage>) -> Self {
        let level = Arc::new(AtomicU32::new(0f32.to_bits()));
        let paused = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task_level = level.clone();
        let task_paused = paused.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if task_paused.load(Ordering::SeqCst) || page.is_closed() {
                    continue;
                }
                match page.audio_level().await {
                    Ok(value) => task_level.store(value.clamp(0.0, 100.0).to_bits(), Ordering::SeqCst),
                    Err(e) => debug!("Audio level unavailable: {}", e),
                }
            }
            debug!("Audio level poller stopped");
        });

        Self {
            level,
            paused,
            cancel,
        }
    }
}

#[async_trait]
impl StreamingSession for PageAudioStream {
    fn sound_level(&self) -> f32 {
        if self.paused.load(Ordering::SeqCst) {
            return 0.0;
        }
        f32::from_bits(self.level.load(Ordering::SeqCst))
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        self.level.store(0f32.to_bits(), Ordering::SeqCst);
        info!("Audio streaming paused");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        info!("Audio streaming resumed");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

impl Drop for PageAudioStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
