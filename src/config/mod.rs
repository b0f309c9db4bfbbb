use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub automatic_leave: AutomaticLeaveConfig,
    pub timeouts: TimeoutConfig,
    pub browser: BrowserConfig,
    pub recorder: RecorderConfig,
    pub webhook: WebhookConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Raw meeting reference as handed to us (usually a join URL).
    pub meeting_url: String,
    pub bot_id: String,
    pub bot_name: String,
    /// Chat message posted on entry, when the provider supports it.
    pub enter_message: Option<String>,
    /// "meet" or "teams". Detected from the meeting URL when absent.
    pub provider: Option<String>,
    /// Source image/video for the branding generator.
    pub custom_branding_path: Option<String>,
    /// Media input mode handed to the provider when opening the page.
    pub streaming_input: Option<String>,
    /// Overrides the per-user data directory for session output.
    pub data_dir: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            meeting_url: String::new(),
            bot_id: String::new(),
            bot_name: "Meeting Bot".to_string(),
            enter_message: None,
            provider: None,
            custom_branding_path: None,
            streaming_input: None,
            data_dir: None,
        }
    }
}

/// Automatic-leave policy, all values in seconds except the sound threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomaticLeaveConfig {
    pub waiting_room_timeout: u64,
    /// Grace period before an empty meeting is considered abandoned.
    pub noone_joined_timeout: u64,
    pub silence_timeout: u64,
    pub recording_timeout: u64,
    /// Sound level (0-100) above which the meeting counts as active.
    pub sound_activity_threshold: f32,
}

impl Default for AutomaticLeaveConfig {
    fn default() -> Self {
        Self {
            waiting_room_timeout: 600,
            noone_joined_timeout: 600,
            silence_timeout: 600,
            recording_timeout: 4 * 60 * 60,
            sound_activity_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub setup_seconds: u64,
    pub resume_seconds: u64,
    pub cleanup_step_seconds: u64,
    pub cleanup_seconds: u64,
    pub error_notification_seconds: u64,
    pub removal_check_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            setup_seconds: 60,
            resume_seconds: 20,
            cleanup_step_seconds: 3,
            cleanup_seconds: 60,
            error_notification_seconds: 15,
            removal_check_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Base URL of the remote browser service.
    pub endpoint: String,
    pub headless: bool,
    pub launch_attempts: u32,
    pub launch_timeout_seconds: u64,
    /// Backoff unit; attempt N waits N times this before retrying.
    pub launch_backoff_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9515".to_string(),
            headless: false,
            launch_attempts: 3,
            launch_timeout_seconds: 60,
            launch_backoff_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Explicit ffmpeg binary; looked up on PATH when empty.
    pub ffmpeg_path: Option<String>,
    /// X11 display captured by the recorder.
    pub display: String,
    pub pulse_source: String,
    pub framerate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            display: ":99".to_string(),
            pulse_source: "default".to_string(),
            framerate: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AutomaticLeaveConfig {
    pub fn waiting_room(&self) -> Duration {
        Duration::from_secs(self.waiting_room_timeout)
    }

    pub fn noone_joined(&self) -> Duration {
        Duration::from_secs(self.noone_joined_timeout)
    }

    pub fn silence(&self) -> Duration {
        Duration::from_secs(self.silence_timeout)
    }

    pub fn recording(&self) -> Duration {
        Duration::from_secs(self.recording_timeout)
    }
}

impl TimeoutConfig {
    pub fn setup(&self) -> Duration {
        Duration::from_secs(self.setup_seconds)
    }

    pub fn resume(&self) -> Duration {
        Duration::from_secs(self.resume_seconds)
    }

    pub fn cleanup_step(&self) -> Duration {
        Duration::from_secs(self.cleanup_step_seconds)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_seconds)
    }

    pub fn error_notification(&self) -> Duration {
        Duration::from_secs(self.error_notification_seconds)
    }

    pub fn removal_check(&self) -> Duration {
        Duration::from_secs(self.removal_check_seconds)
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_seconds)
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.launch_backoff_seconds * u64::from(attempt))
    }
}

impl Config {
    /// Loads the config file (explicit path, else the user config file when it
    /// exists, else defaults) and then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_path().ok().filter(|p| p.exists()),
        };

        let mut config = match config_path {
            Some(config_path) => {
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read config file {:?}", config_path))?;
                let config: Self =
                    toml::from_str(&content).context("Failed to parse config file")?;
                info!("Loaded config from {:?}", config_path);
                config
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.ensure_bot_id();
        Ok(config)
    }

    /// Sessions started without a bot id get a random one so their files and
    /// events can still be told apart.
    pub fn ensure_bot_id(&mut self) {
        if self.bot.bot_id.trim().is_empty() {
            self.bot.bot_id = uuid::Uuid::new_v4().to_string();
            info!("No bot id configured, using {}", self.bot.bot_id);
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Environment variables win over the file. Unparseable numbers are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("MEETING_URL") {
            self.bot.meeting_url = v;
        }
        if let Some(v) = text("BOT_ID") {
            self.bot.bot_id = v;
        }
        if let Some(v) = text("BOT_NAME") {
            self.bot.bot_name = v;
        }
        if let Some(v) = text("ENTER_MESSAGE") {
            self.bot.enter_message = Some(v);
        }
        if let Some(v) = text("MEETING_PROVIDER") {
            self.bot.provider = Some(v);
        }
        if let Some(v) = text("CUSTOM_BRANDING_PATH") {
            self.bot.custom_branding_path = Some(v);
        }
        if let Some(v) = text("STREAMING_INPUT") {
            self.bot.streaming_input = Some(v);
        }
        if let Some(v) = text("DATA_DIR") {
            self.bot.data_dir = Some(v);
        }
        if let Some(v) = text("BROWSER_URL") {
            self.browser.endpoint = v;
        }
        if let Some(v) = text("WEBHOOK_URL") {
            self.webhook.url = Some(v);
        }
        if let Some(v) = text("BOT_API_KEY") {
            self.webhook.api_key = Some(v);
        }

        let leave = &mut self.automatic_leave;
        parse_into(&text, "WAITING_ROOM_TIMEOUT", &mut leave.waiting_room_timeout);
        parse_into(&text, "NOONE_JOINED_TIMEOUT", &mut leave.noone_joined_timeout);
        parse_into(&text, "SILENCE_TIMEOUT", &mut leave.silence_timeout);
        parse_into(&text, "RECORDING_TIMEOUT", &mut leave.recording_timeout);
        parse_into(
            &text,
            "SOUND_ACTIVITY_THRESHOLD",
            &mut leave.sound_activity_threshold,
        );
        parse_into(&text, "API_PORT", &mut self.api.port);
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

fn parse_into<T, F>(text: &F, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = text(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring invalid value for {}: {:?}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.automatic_leave.waiting_room(), Duration::from_secs(600));
        assert_eq!(config.timeouts.cleanup_step(), Duration::from_secs(3));
        assert_eq!(config.timeouts.resume(), Duration::from_secs(20));
        assert_eq!(config.browser.launch_attempts, 3);
        assert_eq!(config.browser.launch_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_ensure_bot_id_keeps_configured_id() {
        let mut config = Config::default();
        config.ensure_bot_id();
        assert!(uuid::Uuid::parse_str(&config.bot.bot_id).is_ok());

        config.bot.bot_id = "bot-7".to_string();
        config.ensure_bot_id();
        assert_eq!(config.bot.bot_id, "bot-7");
    }

    #[test]
    fn test_backoff_is_linear() {
        let browser = BrowserConfig::default();
        assert_eq!(browser.backoff_for(1), Duration::from_secs(5));
        assert_eq!(browser.backoff_for(2), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("MEETING_URL", "https://meet.google.com/abc-defg-hij"),
            ("BOT_ID", "bot-1"),
            ("WAITING_ROOM_TIMEOUT", "30"),
            ("SOUND_ACTIVITY_THRESHOLD", "12.5"),
            ("WEBHOOK_URL", "https://hooks.example.com/bot"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned());

        assert_eq!(config.bot.meeting_url, "https://meet.google.com/abc-defg-hij");
        assert_eq!(config.bot.bot_id, "bot-1");
        assert_eq!(config.automatic_leave.waiting_room_timeout, 30);
        assert_eq!(config.automatic_leave.sound_activity_threshold, 12.5);
        assert_eq!(
            config.webhook.url.as_deref(),
            Some("https://hooks.example.com/bot")
        );
    }

    #[test]
    fn test_env_invalid_number_is_ignored() {
        let vars = env(&[("SILENCE_TIMEOUT", "soon"), ("BOT_NAME", "  ")]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned());

        assert_eq!(config.automatic_leave.silence_timeout, 600);
        assert_eq!(config.bot.bot_name, "Meeting Bot");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            meeting_url = "https://teams.live.com/meet/123?p=abc"

            [automatic_leave]
            silence_timeout = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.automatic_leave.silence_timeout, 120);
        assert_eq!(config.automatic_leave.waiting_room_timeout, 600);
        assert_eq!(config.bot.bot_name, "Meeting Bot");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.bot.bot_id = "saved-bot".to_string();
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.automatic_leave.recording_timeout, 4 * 60 * 60);
        assert!(!loaded.bot.bot_id.is_empty());
    }
}
