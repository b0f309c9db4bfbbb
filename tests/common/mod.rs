//! In-memory collaborators for driving whole sessions in tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use meetbot::config::Config;
use meetbot::notifier::{MemorySink, Notifier};
use meetbot::provider::{
    CancelCheck, JoinIdentity, MeetingProvider, MeetingReference, OnAdmitted, ProviderError,
    ProviderKind, ReferenceError,
};
use meetbot::services::{
    BrandingProcess, BrowserLauncher, BrowserSession, DialogObserver, MeetingPage, PageObserver,
    Recorder, RecorderEvent, SessionServices, SpeakerObserver, SpeakersCallback, StreamingSession,
};
use meetbot::session::{SessionContext, SessionControl, SessionMachine, SessionPhase};
use meetbot::speakers::SpeakerData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const BOT_NAME: &str = "Recorder Bot";

pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.bot.meeting_url = "https://meet.google.com/abc-defg-hij".to_string();
    config.bot.bot_id = "test-bot".to_string();
    config.bot.bot_name = BOT_NAME.to_string();
    config.bot.data_dir = Some(data_dir.to_string_lossy().into_owned());
    config.api.enabled = false;
    config
}

pub fn speaker(name: &str, speaking: bool) -> SpeakerData {
    SpeakerData {
        name: name.to_string(),
        id: None,
        is_speaking: speaking,
    }
}

/// Polls the control handle until the session reaches `phase`.
pub async fn wait_for_phase(control: &SessionControl, phase: SessionPhase) {
    for _ in 0..20_000 {
        if control.phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session never reached {}", phase);
}

pub struct Session {
    pub machine: SessionMachine,
    pub control: SessionControl,
    pub sink: MemorySink,
}

impl Session {
    pub fn new(config: Config, provider: Arc<FakeProvider>, services: Arc<FakeServices>) -> Self {
        let sink = MemorySink::new();
        let notifier = Notifier::spawn(Arc::new(sink.clone()));
        let context = SessionContext::new(Arc::new(config), provider, services, notifier);
        let machine = SessionMachine::new(context);
        let control = machine.control();
        Self {
            machine,
            control,
            sink,
        }
    }

    /// Event codes delivered so far, after draining the notifier queue.
    pub async fn codes(&self) -> Vec<&'static str> {
        self.machine
            .context()
            .notifier
            .flush(Duration::from_secs(5))
            .await;
        self.sink.codes()
    }

    pub fn visited(&self, phase: SessionPhase) -> bool {
        self.machine
            .transitions()
            .iter()
            .any(|(from, to)| *from == phase || *to == phase)
    }
}

pub enum JoinBehavior {
    /// Calls `on_admitted` after `after`, then returns after `linger` more.
    Admit { after: Duration, linger: Duration },
    Reject,
    /// Waits until cancelled.
    NeverAdmit,
    /// Never returns and ignores cancellation.
    Stall,
    Panic,
}

pub struct FakeProvider {
    pub behavior: JoinBehavior,
    pub ended: AtomicBool,
    pub closed: AtomicBool,
    pub admitted: AtomicBool,
}

impl FakeProvider {
    pub fn new(behavior: JoinBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ended: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            admitted: AtomicBool::new(false),
        })
    }

    pub fn admitting() -> Arc<Self> {
        Self::new(JoinBehavior::Admit {
            after: Duration::from_secs(1),
            linger: Duration::ZERO,
        })
    }
}

#[async_trait]
impl MeetingProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Meet
    }

    fn parse_reference(&self, raw: &str) -> Result<MeetingReference, ReferenceError> {
        if raw.trim().is_empty() {
            return Err(ReferenceError::Empty);
        }
        Ok(MeetingReference {
            id: raw.to_string(),
            password: None,
        })
    }

    fn build_join_link(&self, reference: &MeetingReference, _identity: &JoinIdentity) -> String {
        reference.id.clone()
    }

    async fn open_session_page(
        &self,
        browser: Arc<dyn BrowserSession>,
        link: &str,
        media_input: Option<&str>,
    ) -> Result<Arc<dyn MeetingPage>> {
        browser.new_page(link, media_input).await
    }

    async fn join(
        &self,
        _page: Arc<dyn MeetingPage>,
        cancel: CancelCheck<'_>,
        on_admitted: OnAdmitted<'_>,
    ) -> Result<(), ProviderError> {
        match &self.behavior {
            JoinBehavior::Admit { after, linger } => {
                tokio::time::sleep(*after).await;
                self.admitted.store(true, Ordering::SeqCst);
                on_admitted();
                tokio::time::sleep(*linger).await;
                Ok(())
            }
            JoinBehavior::Reject => Err(ProviderError::Rejected),
            JoinBehavior::NeverAdmit => loop {
                if cancel() {
                    return Err(ProviderError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            },
            JoinBehavior::Stall => std::future::pending().await,
            JoinBehavior::Panic => panic!("provider exploded"),
        }
    }

    async fn detect_session_ended(&self, _page: Arc<dyn MeetingPage>) -> Result<bool> {
        Ok(self.ended.load(Ordering::SeqCst))
    }

    async fn close(&self, _page: Arc<dyn MeetingPage>) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePage {
    closed: AtomicBool,
}

#[async_trait]
impl MeetingPage for FakePage {
    async fn url(&self) -> Result<String> {
        Ok("https://meet.google.com/abc-defg-hij".to_string())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn content(&self) -> Result<String> {
        Ok("<html><body>meeting</body></html>".to_string())
    }

    async fn has_text(&self, _text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn click_text(&self, _text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn fill(&self, _label: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn speakers(&self) -> Result<Vec<SpeakerData>> {
        Ok(Vec::new())
    }

    async fn audio_level(&self) -> Result<f32> {
        Ok(0.0)
    }

    async fn install_script(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_script(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    pub page: Arc<FakePage>,
    pub media_stopped: AtomicBool,
    pub closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    fn id(&self) -> &str {
        "fake-browser"
    }

    async fn new_page(&self, _url: &str, _media_input: Option<&str>) -> Result<Arc<dyn MeetingPage>> {
        Ok(self.page.clone())
    }

    async fn pending_dialogs(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn dismiss_dialog(&self, _dialog_id: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_media(&self) -> Result<()> {
        self.media_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    /// Leading attempts that never complete.
    pub hangs: u32,
    pub failures: u32,
    pub attempts: AtomicU32,
    pub browser: Arc<FakeBrowser>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.hangs {
            std::future::pending::<()>().await;
        }
        if attempt <= self.hangs + self.failures {
            bail!("browser crashed on attempt {}", attempt);
        }
        Ok(self.browser.clone())
    }
}

pub struct FakeRecorder {
    events: broadcast::Sender<RecorderEvent>,
    pub output: Mutex<Option<PathBuf>>,
    pub stop_calls: AtomicU32,
    pub fail_stop: bool,
}

impl FakeRecorder {
    pub fn new(fail_stop: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            output: Mutex::new(None),
            stop_calls: AtomicU32::new(0),
            fail_stop,
        }
    }

    pub fn emit(&self, event: RecorderEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn start(&self, output: &Path) -> Result<()> {
        *self.output.lock().unwrap() = Some(output.to_path_buf());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            bail!("recorder refused to stop");
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.output.lock().unwrap().is_some()
    }

    fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct FakeStreaming {
    pub hang_on_stop: bool,
    pub hang_on_resume: bool,
    pub fail_resume: bool,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
}

#[async_trait]
impl StreamingSession for FakeStreaming {
    fn sound_level(&self) -> f32 {
        0.0
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if self.hang_on_resume {
            std::future::pending::<()>().await;
        }
        if self.fail_resume {
            bail!("audio stream is gone");
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.hang_on_stop {
            std::future::pending::<()>().await;
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports a fixed participant list each time it starts.
#[derive(Default)]
pub struct FakeSpeakerObserver {
    pub speakers: Vec<SpeakerData>,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
}

#[async_trait]
impl SpeakerObserver for FakeSpeakerObserver {
    async fn start(&self, _page: Arc<dyn MeetingPage>, on_update: SpeakersCallback) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        on_update(self.speakers.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePageObserver {
    pub hang_on_start: bool,
    pub hang_on_stop: bool,
}

#[async_trait]
impl PageObserver for FakePageObserver {
    async fn start(&self) -> Result<()> {
        if self.hang_on_start {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.hang_on_stop {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub struct NoopDialogs;

impl DialogObserver for NoopDialogs {
    fn start(&self, _browser: Arc<dyn BrowserSession>) {}
    fn stop(&self) {}
}

pub struct FakeServices {
    pub launcher: Arc<FakeLauncher>,
    pub recorder: Arc<FakeRecorder>,
    pub streaming: Arc<FakeStreaming>,
    pub speakers: Arc<FakeSpeakerObserver>,
    pub hang_video_fixer: bool,
    pub hang_dom_cleaner_start: bool,
}

impl FakeServices {
    pub fn builder() -> FakeServicesBuilder {
        FakeServicesBuilder::default()
    }

    pub fn browser(&self) -> &FakeBrowser {
        &self.launcher.browser
    }
}

#[derive(Default)]
pub struct FakeServicesBuilder {
    launch_hangs: u32,
    launch_failures: u32,
    fail_recorder_stop: bool,
    hang_streaming_stop: bool,
    hang_video_fixer: bool,
    hang_resume: bool,
    fail_resume: bool,
    hang_dom_cleaner_start: bool,
    speakers: Vec<SpeakerData>,
}

impl FakeServicesBuilder {
    pub fn launch_failures(mut self, failures: u32) -> Self {
        self.launch_failures = failures;
        self
    }

    /// The first `hangs` launch attempts never return.
    pub fn hang_launch(mut self, hangs: u32) -> Self {
        self.launch_hangs = hangs;
        self
    }

    pub fn hang_resume(mut self) -> Self {
        self.hang_resume = true;
        self
    }

    pub fn fail_resume(mut self) -> Self {
        self.fail_resume = true;
        self
    }

    pub fn hang_dom_cleaner_start(mut self) -> Self {
        self.hang_dom_cleaner_start = true;
        self
    }

    pub fn fail_recorder_stop(mut self) -> Self {
        self.fail_recorder_stop = true;
        self
    }

    pub fn hang_streaming_stop(mut self) -> Self {
        self.hang_streaming_stop = true;
        self
    }

    pub fn hang_video_fixer(mut self) -> Self {
        self.hang_video_fixer = true;
        self
    }

    pub fn speakers(mut self, speakers: Vec<SpeakerData>) -> Self {
        self.speakers = speakers;
        self
    }

    pub fn build(self) -> Arc<FakeServices> {
        Arc::new(FakeServices {
            launcher: Arc::new(FakeLauncher {
                hangs: self.launch_hangs,
                failures: self.launch_failures,
                attempts: AtomicU32::new(0),
                browser: Arc::new(FakeBrowser::default()),
            }),
            recorder: Arc::new(FakeRecorder::new(self.fail_recorder_stop)),
            streaming: Arc::new(FakeStreaming {
                hang_on_stop: self.hang_streaming_stop,
                hang_on_resume: self.hang_resume,
                fail_resume: self.fail_resume,
                ..FakeStreaming::default()
            }),
            speakers: Arc::new(FakeSpeakerObserver {
                speakers: self.speakers,
                ..FakeSpeakerObserver::default()
            }),
            hang_video_fixer: self.hang_video_fixer,
            hang_dom_cleaner_start: self.hang_dom_cleaner_start,
        })
    }
}

impl SessionServices for FakeServices {
    fn browser_launcher(&self) -> Arc<dyn BrowserLauncher> {
        self.launcher.clone()
    }

    fn start_branding(&self, _source: &str, _output_dir: PathBuf) -> Result<Box<dyn BrandingProcess>> {
        bail!("branding is not available in tests")
    }

    fn dialog_observer(&self) -> Arc<dyn DialogObserver> {
        Arc::new(NoopDialogs)
    }

    fn recorder(&self) -> Arc<dyn Recorder> {
        self.recorder.clone()
    }

    fn streaming(&self, _page: Arc<dyn MeetingPage>) -> Result<Arc<dyn StreamingSession>> {
        Ok(self.streaming.clone())
    }

    fn speaker_observer(&self) -> Arc<dyn SpeakerObserver> {
        self.speakers.clone()
    }

    fn dom_cleaner(&self, _page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver> {
        Arc::new(FakePageObserver {
            hang_on_start: self.hang_dom_cleaner_start,
            ..FakePageObserver::default()
        })
    }

    fn video_fixer(&self, _page: Arc<dyn MeetingPage>) -> Arc<dyn PageObserver> {
        Arc::new(FakePageObserver {
            hang_on_stop: self.hang_video_fixer,
            ..FakePageObserver::default()
        })
    }
}
