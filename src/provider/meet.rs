use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    CancelCheck, JoinIdentity, MeetingProvider, MeetingReference, OnAdmitted, ProviderError,
    ProviderKind, ReferenceError, JOIN_POLL,
};
use crate::services::{BrowserSession, MeetingPage};

const ADMITTED_MARKER: &str = "Leave call";
const JOIN_BUTTONS: [&str; 2] = ["Ask to join", "Join now"];
const NAME_FIELD: &str = "Your name";
const REJECTED_TEXTS: [&str; 2] = [
    "You can't join this call",
    "Someone in the call denied your request to join",
];
const REMOVED_TEXTS: [&str; 2] = [
    "You've been removed from the meeting",
    "The call ended",
];

pub struct MeetProvider {
    bot_name: String,
    code_pattern: Regex,
}

impl MeetProvider {
    pub fn new(bot_name: &str) -> Result<Self> {
        Ok(Self {
            bot_name: bot_name.to_string(),
            code_pattern: Regex::new(r"(?:^|/)([a-z]{3}-[a-z]{4}-[a-z]{3})(?:$|[/?#])")?,
        })
    }

    async fn any_text(page: &dyn MeetingPage, texts: &[&str]) -> Result<bool> {
        for text in texts {
            if page.has_text(text).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl MeetingProvider for MeetProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Meet
    }

    fn parse_reference(&self, raw: &str) -> Result<MeetingReference, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let lower = raw.to_ascii_lowercase();
        self.code_pattern
            .captures(&lower)
            .and_then(|caps| caps.get(1))
            .map(|code| MeetingReference {
                id: code.as_str().to_string(),
                password: None,
            })
            .ok_or_else(|| ReferenceError::Unrecognized(raw.to_string()))
    }

    fn build_join_link(&self, reference: &MeetingReference, _identity: &JoinIdentity) -> String {
        format!("https://meet.google.com/{}", reference.id)
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
        page: Arc<dyn MeetingPage>,
        cancel: CancelCheck<'_>,
        on_admitted: OnAdmitted<'_>,
    ) -> Result<(), ProviderError> {
        let mut asked = false;

        loop {
            if cancel() {
                return Err(ProviderError::Cancelled);
            }

            if page.has_text(ADMITTED_MARKER).await? {
                info!("Admitted to the Meet call");
                on_admitted();
                return Ok(());
            }
            if Self::any_text(page.as_ref(), &REJECTED_TEXTS).await? {
                return Err(ProviderError::Rejected);
            }
            if Self::any_text(page.as_ref(), &REMOVED_TEXTS).await? {
                return Err(ProviderError::RemovedTooEarly);
            }

            if !asked {
                if let Err(e) = page.fill(NAME_FIELD, &self.bot_name).await {
                    debug!("Name field not available yet: {}", e);
                }
                for button in JOIN_BUTTONS {
                    if page.click_text(button).await? {
                        info!("Clicked {:?}, waiting for admission", button);
                        asked = true;
                        break;
                    }
                }
            }

            tokio::time::sleep(JOIN_POLL).await;
        }
    }

    async fn detect_session_ended(&self, page: Arc<dyn MeetingPage>) -> Result<bool> {
        if page.is_closed() {
            return Ok(true);
        }
        if Self::any_text(page.as_ref(), &REMOVED_TEXTS).await? {
            return Ok(true);
        }
        Ok(!page.has_text(ADMITTED_MARKER).await?)
    }

    async fn close(&self, page: Arc<dyn MeetingPage>) -> Result<()> {
        if page.is_closed() {
            return Ok(());
        }
        if !page.click_text(ADMITTED_MARKER).await? {
            warn!("Leave button not found, closing the page directly");
        }
        page.close().await
    }
}
