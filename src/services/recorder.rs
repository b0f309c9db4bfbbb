//! Screen + audio recorder backed by an ffmpeg subprocess.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;

const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// The recording is lost or cannot continue.
    Error(String),
    /// Audio capture is degraded; the recording goes on.
    AudioWarning(String),
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start(&self, output: &Path) -> Result<()>;
    /// Safe to call when never started and more than once.
    async fn stop(&self) -> Result<()>;
    fn is_recording(&self) -> bool;
    fn subscribe(&self) -> broadcast::Receiver<RecorderEvent>;
}

pub struct FfmpegRecorder {
    config: RecorderConfig,
    child: Mutex<Option<Child>>,
    recording: Arc<AtomicBool>,
    events: broadcast::Sender<RecorderEvent>,
}

impl FfmpegRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            config,
            child: Mutex::new(None),
            recording: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.config.ffmpeg_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => which::which("ffmpeg").context("ffmpeg not found on PATH"),
        }
    }

    pub fn args(&self, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-f".to_string(),
            "x11grab".to_string(),
            "-framerate".to_string(),
            self.config.framerate.to_string(),
            "-i".to_string(),
            self.config.display.clone(),
            "-f".to_string(),
            "pulse".to_string(),
            "-i".to_string(),
            self.config.pulse_source.clone(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// Classifies one line of ffmpeg stderr.
fn classify_line(line: &str) -> Option<RecorderEvent> {
    let lower = line.to_ascii_lowercase();
    if lower.contains("pulse") || lower.contains("audio") || lower.contains("non-monotonous") {
        return Some(RecorderEvent::AudioWarning(line.trim().to_string()));
    }
    if lower.contains("no space left") || lower.contains("conversion failed") {
        return Some(RecorderEvent::Error(line.trim().to_string()));
    }
    None
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    async fn start(&self, output: &Path) -> Result<()> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            warn!("Recorder already running, ignoring start");
            return Ok(());
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create recordings directory")?;
        }

        let binary = self.binary()?;
        info!("Starting recorder: {:?} -> {:?}", binary, output);

        let mut child = Command::new(&binary)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", binary))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stderr not captured"))?;

        self.recording.store(true, Ordering::SeqCst);
        let recording = self.recording.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("ffmpeg: {}", line);
                if let Some(event) = classify_line(&line) {
                    let _ = events.send(event);
                }
            }
            // stderr closes when the process exits
            if recording.swap(false, Ordering::SeqCst) {
                error!("Recorder exited while still recording");
                let _ = events.send(RecorderEvent::Error(
                    "ffmpeg exited unexpectedly".to_string(),
                ));
            }
        });

        *slot = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            debug!("Recorder not running, nothing to stop");
            return Ok(());
        };

        self.recording.store(false, Ordering::SeqCst);

        if let Some(mut stdin) = child.stdin.take() {
            // ffmpeg finalizes the container on "q"
            let _ = stdin.write_all(b"q").await;
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!("Recorder stopped cleanly");
                Ok(())
            }
            Ok(Ok(status)) => Err(anyhow!("Recorder exited with status {}", status)),
            Ok(Err(e)) => Err(anyhow!("Failed to wait for recorder: {}", e)),
            Err(_) => {
                warn!("Recorder did not exit after {:?}, killing it", STOP_GRACE);
                child.kill().await.context("Failed to kill recorder")?;
                Err(anyhow!("Recorder had to be killed"))
            }
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_line() {
        assert!(matches!(
            classify_line("[pulse @ 0x1] Thread message queue blocking"),
            Some(RecorderEvent::AudioWarning(_))
        ));
        assert!(matches!(
            classify_line("av_interleaved_write_frame(): No space left on device"),
            Some(RecorderEvent::Error(_))
        ));
        assert_eq!(classify_line("frame= 100 fps=30"), None);
    }

    #[test]
    fn test_args_end_with_output() {
        let recorder = FfmpegRecorder::new(RecorderConfig::default());
        let args = recorder.args(Path::new("/tmp/out.mp4"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        assert!(args.contains(&":99".to_string()));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_ok() {
        let recorder = FfmpegRecorder::new(RecorderConfig::default());
        assert!(recorder.stop().await.is_ok());
        assert!(recorder.stop().await.is_ok());
        assert!(!recorder.is_recording());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_start() {
        let recorder = FfmpegRecorder::new(RecorderConfig {
            ffmpeg_path: Some("/nonexistent/ffmpeg".to_string()),
            ..RecorderConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("recordings");
        assert!(recorder.start(&nested.join("out.mp4")).await.is_err());
        assert!(!recorder.is_recording());
        assert!(nested.is_dir());
    }
}
