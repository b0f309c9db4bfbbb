//! Background observers attached to the browser or the meeting page.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::browser::{BrowserSession, MeetingPage};
use crate::speakers::SpeakerData;

const SPEAKER_POLL: Duration = Duration::from_millis(500);
const DIALOG_POLL: Duration = Duration::from_secs(2);

pub type SpeakersCallback = Arc<dyn Fn(Vec<SpeakerData>) + Send + Sync>;

#[async_trait]
pub trait SpeakerObserver: Send + Sync {
    async fn start(&self, page: Arc<dyn MeetingPage>, on_update: SpeakersCallback) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Long-lived helper living inside the page (DOM cleanup, video layout).
#[async_trait]
pub trait PageObserver: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

pub trait DialogObserver: Send + Sync {
    fn start(&self, browser: Arc<dyn BrowserSession>);
    fn stop(&self);
}

fn replace_token(slot: &Mutex<Option<CancellationToken>>, token: Option<CancellationToken>) {
    let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(previous) = std::mem::replace(&mut *guard, token) {
        previous.cancel();
    }
}

/// Polls the page's participant list and reports every reading.
#[derive(Default)]
pub struct PageSpeakerObserver {
    token: Mutex<Option<CancellationToken>>,
}

impl PageSpeakerObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeakerObserver for PageSpeakerObserver {
    async fn start(&self, page: Arc<dyn MeetingPage>, on_update: SpeakersCallback) -> Result<()> {
        if page.is_closed() {
            bail!("Cannot observe speakers on a closed page");
        }
        let initial = page.speakers().await?;
        on_update(initial);

        let token = CancellationToken::new();
        replace_token(&self.token, Some(token.clone()));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SPEAKER_POLL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if page.is_closed() {
                    break;
                }
                match page.speakers().await {
                    Ok(speakers) => on_update(speakers),
                    Err(e) => debug!("Speaker poll failed: {}", e),
                }
            }
            debug!("Speaker observer stopped");
        });

        info!("Speaker observer started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        replace_token(&self.token, None);
        Ok(())
    }
}

impl Drop for PageSpeakerObserver {
    fn drop(&mut self) {
        replace_token(&self.token, None);
    }
}

/// Installs a named in-page script and removes it on stop.
pub struct PageScriptObserver {
    page: Arc<dyn MeetingPage>,
    script: &'static str,
    installed: AtomicBool,
}

impl PageScriptObserver {
    pub const DOM_CLEANER: &'static str = "dom-cleaner";
    pub const VIDEO_FIXER: &'static str = "video-fixer";

    pub fn new(page: Arc<dyn MeetingPage>, script: &'static str) -> Self {
        Self {
            page,
            script,
            installed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageObserver for PageScriptObserver {
    async fn start(&self) -> Result<()> {
        if self.installed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.page.install_script(self.script).await?;
        self.installed.store(true, Ordering::SeqCst);
        info!("Page script {} installed", self.script);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.installed.swap(false, Ordering::SeqCst) || self.page.is_closed() {
            return Ok(());
        }
        self.page.remove_script(self.script).await
    }
}

/// Dismisses native browser dialogs (permission prompts, beforeunload).
#[derive(Default)]
pub struct BrowserDialogObserver {
    token: Mutex<Option<CancellationToken>>,
}

impl BrowserDialogObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DialogObserver for BrowserDialogObserver {
    fn start(&self, browser: Arc<dyn BrowserSession>) {
        let token = CancellationToken::new();
        replace_token(&self.token, Some(token.clone()));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DIALOG_POLL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let dialogs = match browser.pending_dialogs().await {
                    Ok(dialogs) => dialogs,
                    Err(e) => {
                        debug!("Dialog poll failed: {}", e);
                        continue;
                    }
                };
                for dialog in dialogs {
                    match browser.dismiss_dialog(&dialog).await {
                        Ok(()) => info!("Dismissed dialog {}", dialog),
                        Err(e) => warn!("Failed to dismiss dialog {}: {}", dialog, e),
                    }
                }
            }
        });
        debug!("Dialog observer started");
    }

    fn stop(&self) {
        replace_token(&self.token, None);
    }
}
