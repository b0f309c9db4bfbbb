//! Meeting platforms the bot can join.
//!
//! A provider is chosen once, from config or the meeting URL, and the session
//! only ever talks to it through [`MeetingProvider`].

pub mod meet;
pub mod teams;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::services::{BrowserSession, MeetingPage};

pub use meet::MeetProvider;
pub use teams::TeamsProvider;

/// Interval between page checks while joining.
pub const JOIN_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("meeting reference is empty")]
    Empty,
    #[error("unrecognized meeting reference: {0}")]
    Unrecognized(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
    #[error("the bot was denied access to the meeting")]
    Rejected,
    #[error("the bot was removed before the meeting started")]
    RemovedTooEarly,
    #[error("the meeting requires signing in")]
    LoginRequired,
    #[error("join cancelled")]
    Cancelled,
    #[error(transparent)]
    Page(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingReference {
    pub id: String,
    pub password: Option<String>,
}

/// Who the bot presents itself as.
#[derive(Debug, Clone, Default)]
pub struct JoinIdentity {
    pub display_name: String,
    pub enter_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Meet,
    Teams,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meet => "meet",
            Self::Teams => "teams",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "meet" | "google" | "google_meet" | "googlemeet" => Some(Self::Meet),
            "teams" | "microsoft_teams" | "msteams" => Some(Self::Teams),
            _ => None,
        }
    }
}

pub fn detect_provider(url: &str) -> Option<ProviderKind> {
    let lower = url.to_ascii_lowercase();
    if lower.contains("meet.google.com") {
        Some(ProviderKind::Meet)
    } else if lower.contains("teams.microsoft.com") || lower.contains("teams.live.com") {
        Some(ProviderKind::Teams)
    } else {
        None
    }
}

/// Cancellation predicate polled while joining.
pub type CancelCheck<'a> = &'a (dyn Fn() -> bool + Send + Sync);
/// Invoked once, the moment admission is confirmed.
pub type OnAdmitted<'a> = &'a (dyn Fn() + Send + Sync);

#[async_trait]
pub trait MeetingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn parse_reference(&self, raw: &str) -> Result<MeetingReference, ReferenceError>;

    fn build_join_link(&self, reference: &MeetingReference, identity: &JoinIdentity) -> String;

    async fn open_session_page(
        &self,
        browser: Arc<dyn BrowserSession>,
        link: &str,
        media_input: Option<&str>,
    ) -> Result<Arc<dyn MeetingPage>>;

    /// Returns once admitted (after calling `on_admitted`), rejected or
    /// cancelled.
    async fn join(
        &self,
        page: Arc<dyn MeetingPage>,
        cancel: CancelCheck<'_>,
        on_admitted: OnAdmitted<'_>,
    ) -> Result<(), ProviderError>;

    async fn detect_session_ended(&self, page: Arc<dyn MeetingPage>) -> Result<bool>;

    async fn close(&self, page: Arc<dyn MeetingPage>) -> Result<()>;
}

/// Builds the provider named in config, falling back to the meeting URL.
pub fn for_config(config: &Config) -> Result<Arc<dyn MeetingProvider>> {
    let kind = match config.bot.provider.as_deref() {
        Some(name) => ProviderKind::parse(name)
            .ok_or_else(|| anyhow!("Unknown meeting provider: {}", name))?,
        None => detect_provider(&config.bot.meeting_url).ok_or_else(|| {
            anyhow!(
                "Cannot detect meeting provider from {:?}; set MEETING_PROVIDER",
                config.bot.meeting_url
            )
        })?,
    };

    let provider: Arc<dyn MeetingProvider> = match kind {
        ProviderKind::Meet => Arc::new(MeetProvider::new(&config.bot.bot_name)?),
        ProviderKind::Teams => Arc::new(TeamsProvider::new(&config.bot.bot_name)),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_provider() {
        assert_eq!(
            detect_provider("https://meet.google.com/abc-defg-hij"),
            Some(ProviderKind::Meet)
        );
        assert_eq!(
            detect_provider("https://teams.live.com/meet/9312?p=abc"),
            Some(ProviderKind::Teams)
        );
        assert_eq!(detect_provider("https://zoom.us/j/1"), None);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(ProviderKind::parse(" Teams "), Some(ProviderKind::Teams));
        assert_eq!(ProviderKind::parse("google_meet"), Some(ProviderKind::Meet));
        assert_eq!(ProviderKind::parse("zoom"), None);
    }

    #[test]
    fn test_for_config_prefers_explicit_provider() {
        let mut config = Config::default();
        config.bot.meeting_url = "https://meet.google.com/abc-defg-hij".to_string();
        config.bot.provider = Some("teams".to_string());

        let provider = for_config(&config).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Teams);
    }

    #[test]
    fn test_for_config_rejects_unknown_url() {
        let mut config = Config::default();
        config.bot.meeting_url = "https://example.com/room".to_string();
        assert!(for_config(&config).is_err());
    }
}
