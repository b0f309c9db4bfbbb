use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "meetbot";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_DIR));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".local").join("share").join(APP_DIR));
    }
    Err(anyhow!("Unable to determine data directory"))
}

/// Root for everything one bot run writes: logs, recordings, snapshots.
pub fn session_dir(bot_id: &str) -> Result<PathBuf> {
    Ok(data_dir()?.join("sessions").join(sanitize(bot_id)))
}

/// Per-session directory layout. `root` comes from [`session_dir`] unless
/// the config overrides the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub root: PathBuf,
}

impl SessionPaths {
    pub fn resolve(data_dir_override: Option<&Path>, bot_id: &str) -> Result<Self> {
        let root = match data_dir_override {
            Some(dir) => dir.join("sessions").join(sanitize(bot_id)),
            None => session_dir(bot_id)?,
        };
        Ok(Self { root })
    }

    pub fn snapshots(&self) -> PathBuf {
        self.root.join("html_snapshots")
    }

    pub fn recordings(&self) -> PathBuf {
        self.root.join("recordings")
    }

    pub fn recording_file(&self) -> PathBuf {
        self.recordings().join("output.mp4")
    }

    pub fn branding(&self) -> PathBuf {
        self.root.join("branding")
    }
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
