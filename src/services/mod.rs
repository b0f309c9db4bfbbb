//! Long-lived collaborators the session starts and stops: browser, recorder,
//! audio telemetry, page observers and the branding generator.
//!
//! The session never constructs these directly; it asks a [`SessionServices`]
//! factory, so tests can substitute every one of them.

pub mod branding;
pub mod browser;
pub mod observers;
pub mod recorder;
pub mod snapshot;
pub mod streaming;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

pub use branding::{BrandingProcess, ScriptBranding};
pub use browser::{BrowserLauncher, BrowserSession, MeetingPage, RemoteBrowser};
pub use observers::{
    BrowserDialogObserver, DialogObserver, PageObserver, PageScriptObserver, PageSpeakerObserver,
    SpeakerObserver, SpeakersCallback,
};
pub use recorder::{FfmpegRecorder, Recorder, RecorderEvent};
pub use streaming::{PageAudioStream, StreamingSession};

pub trait SessionServices: Send + Sync {
    fn browser_launcher(&self) -> Arc<dyn BrowserLauncher>;
    fn start_branding(&self, source: &str, output_dir: PathBuf) -> Result<Box<dyn BrandingProcess>>;
    fn dialog_observer(&self) -> Arc<dyn DialogObserver>;
    fn recorder(&self) -> Arc<dyn Recorder>;
    fn streaming(&self, page: Arc<dyn MeetingPage>) -> Result<Arc<dyn StreamingSession>>;
    fn speaker_observer(&self) -> Arc<dyn SpeakerObserver>;
    fn dom_cleaner(&self, page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver>;
    fn video_fixer(&self, page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver>;
}

/// Production wiring: remote browser service, ffmpeg, page pollers.
pub struct DefaultServices {
    launcher: Arc<RemoteBrowser>,
    recorder: Arc<FfmpegRecorder>,
}

impl DefaultServices {
    pub fn new(config: &Config) -> Self {
        Self {
            launcher: Arc::new(RemoteBrowser::new(
                &config.browser.endpoint,
                config.browser.headless,
            )),
            recorder: Arc::new(FfmpegRecorder::new(config.recorder.clone())),
        }
    }
}

impl SessionServices for DefaultServices {
    fn browser_launcher(&self) -> Arc<dyn BrowserLauncher> {
        self.launcher.clone()
    }

    fn start_branding(&self, source: &str, output_dir: PathBuf) -> Result<Box<dyn BrandingProcess>> {
        Ok(Box::new(ScriptBranding::spawn(source, output_dir)?))
    }

    fn dialog_observer(&self) -> Arc<dyn DialogObserver> {
        Arc::new(BrowserDialogObserver::new())
    }

    fn recorder(&self) -> Arc<dyn Recorder> {
        self.recorder.clone()
    }

    fn streaming(&self, page: Arc<dyn MeetingPage>) -> Result<Arc<dyn StreamingSession>> {
        Ok(Arc::new(PageAudioStream::spawn(page)))
    }

    fn speaker_observer(&self) -> Arc<dyn SpeakerObserver> {
        Arc::new(PageSpeakerObserver::new())
    }

    fn dom_cleaner(&self, page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver> {
        Arc::new(PageScriptObserver::new(page, PageScriptObserver::DOM_CLEANER))
    }

    fn video_fixer(&self, page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver> {
        Arc::new(PageScriptObserver::new(page, PageScriptObserver::VIDEO_FIXER))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::browser::MeetingPage;
    use crate::speakers::SpeakerData;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Minimal in-memory page for unit tests. Visible text and the URL can be
    /// changed while a test runs.
    #[derive(Default)]
    pub struct StubPage {
        speakers: Vec<SpeakerData>,
        scripts: Mutex<Vec<String>>,
        texts: Mutex<Vec<String>>,
        url: Mutex<String>,
        clicked: Mutex<Vec<String>>,
        filled: Mutex<Vec<(String, String)>>,
        closed: AtomicBool,
    }

    impl StubPage {
        pub fn with_speakers(speakers: Vec<SpeakerData>) -> Self {
            Self {
                speakers,
                ..Self::default()
            }
        }

        pub fn at(url: &str) -> Self {
            let page = Self::default();
            page.set_url(url);
            page
        }

        pub fn set_url(&self, url: &str) {
            *self.url.lock().unwrap() = url.to_string();
        }

        pub fn show_text(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }

        pub fn hide_text(&self, text: &str) {
            self.texts.lock().unwrap().retain(|t| t != text);
        }

        pub fn scripts(&self) -> Vec<String> {
            self.scripts.lock().unwrap().clone()
        }

        pub fn clicked(&self) -> Vec<String> {
            self.clicked.lock().unwrap().clone()
        }

        pub fn filled(&self) -> Vec<(String, String)> {
            self.filled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MeetingPage for StubPage {
        async fn url(&self) -> Result<String> {
            Ok(self.url.lock().unwrap().clone())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        async fn content(&self) -> Result<String> {
            Ok("<html><body>stub</body></html>".to_string())
        }

        async fn has_text(&self, text: &str) -> Result<bool> {
            Ok(self.texts.lock().unwrap().iter().any(|t| t == text))
        }

        async fn click_text(&self, text: &str) -> Result<bool> {
            let visible = self.texts.lock().unwrap().iter().any(|t| t == text);
            if visible {
                self.clicked.lock().unwrap().push(text.to_string());
            }
            Ok(visible)
        }

        async fn fill(&self, label: &str, value: &str) -> Result<()> {
            self.filled
                .lock()
                .unwrap()
                .push((label.to_string(), value.to_string()));
            Ok(())
        }

        async fn speakers(&self) -> Result<Vec<SpeakerData>> {
            Ok(self.speakers.clone())
        }

        async fn audio_level(&self) -> Result<f32> {
            Ok(42.0)
        }

        async fn install_script(&self, name: &str) -> Result<()> {
            self.scripts.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn remove_script(&self, name: &str) -> Result<()> {
            self.scripts.lock().unwrap().retain(|s| s != name);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
