use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    CancelCheck, JoinIdentity, MeetingProvider, MeetingReference, OnAdmitted, ProviderError,
    ProviderKind, ReferenceError, JOIN_POLL,
};
use crate::services::{BrowserSession, MeetingPage};

const LIGHT_RETRIES: u32 = 3;
const LIGHT_RETRY_DELAY: Duration = Duration::from_millis(500);
const LOGIN_HOST: &str = "login.microsoft";
const DENIED_TEXT: &str = "Sorry, but you were denied access to the meeting.";
const REMOVED_TEXT: &str = "You have been removed from this meeting";
const IN_MEETING_MARKERS: [&str; 2] = ["Raise", "Leave"];
const NAME_FIELD: &str = "Type your name";
const SKIP_DEVICES: &str = "Continue without audio or video";
const JOIN_BUTTON: &str = "Join now";

pub struct TeamsProvider {
    bot_name: String,
}

impl TeamsProvider {
    pub fn new(bot_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
        }
    }

    fn is_light_interface(url: &str) -> bool {
        url.contains("light")
    }

    async fn on_login_page(page: &dyn MeetingPage) -> Result<bool> {
        Ok(page.url().await?.contains(LOGIN_HOST))
    }

    async fn in_meeting(page: &dyn MeetingPage) -> Result<bool> {
        for marker in IN_MEETING_MARKERS {
            if page.has_text(marker).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl MeetingProvider for TeamsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Teams
    }

    fn parse_reference(&self, raw: &str) -> Result<MeetingReference, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        // Enterprise links are opaque; the whole link is the reference.
        if raw.contains("meetup-join") {
            return Ok(MeetingReference {
                id: raw.to_string(),
                password: None,
            });
        }

        let url = Url::parse(raw).map_err(|_| ReferenceError::Unrecognized(raw.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            ["meet", id] => Ok(MeetingReference {
                id: id.to_string(),
                password: url
                    .query_pairs()
                    .find(|(key, _)| key == "p")
                    .map(|(_, value)| value.into_owned()),
            }),
            _ => Err(ReferenceError::Unrecognized(raw.to_string())),
        }
    }

    fn build_join_link(&self, reference: &MeetingReference, _identity: &JoinIdentity) -> String {
        if reference.id.starts_with("http") {
            return reference.id.clone();
        }
        match &reference.password {
            Some(password) => format!(
                "https://teams.live.com/meet/{}?p={}",
                reference.id, password
            ),
            None => format!("https://teams.live.com/meet/{}", reference.id),
        }
    }

    async fn open_session_page(
        &self,
        browser: Arc<dyn BrowserSession>,
        link: &str,
        media_input: Option<&str>,
    ) -> Result<Arc<dyn MeetingPage>> {
        let mut attempt = 0;
        loop {
            let page = browser.new_page(link, media_input).await?;
            let current = page.url().await.unwrap_or_default();

            if !Self::is_light_interface(&current) {
                return Ok(page);
            }
            if attempt >= LIGHT_RETRIES {
                warn!(
                    "Light interface persists after {} retries, continuing anyway",
                    LIGHT_RETRIES
                );
                return Ok(page);
            }

            attempt += 1;
            info!("Light interface detected, retry {}/{}", attempt, LIGHT_RETRIES);
            if let Err(e) = page.close().await {
                debug!("Failed to close light page: {}", e);
            }
            tokio::time::sleep(LIGHT_RETRY_DELAY).await;
        }
    }

    async fn join(
        &self,
        page: Arc<dyn MeetingPage>,
        cancel: CancelCheck<'_>,
        on_admitted: OnAdmitted<'_>,
    ) -> Result<(), ProviderError> {
        let mut name_typed = false;
        let mut join_clicked = false;

        loop {
            if cancel() {
                return Err(ProviderError::Cancelled);
            }
            if Self::on_login_page(page.as_ref()).await? {
                return Err(ProviderError::LoginRequired);
            }
            if page.has_text(DENIED_TEXT).await? {
                return Err(ProviderError::Rejected);
            }
            if page.has_text(REMOVED_TEXT).await? {
                return Err(ProviderError::RemovedTooEarly);
            }

            if join_clicked && Self::in_meeting(page.as_ref()).await? {
                info!("Admitted to the Teams meeting");
                on_admitted();
                return Ok(());
            }

            if !join_clicked {
                page.click_text(SKIP_DEVICES).await?;
                if !name_typed {
                    match page.fill(NAME_FIELD, &self.bot_name).await {
                        Ok(()) => name_typed = true,
                        Err(e) => debug!("Name field not ready: {}", e),
                    }
                }
                if page.click_text(JOIN_BUTTON).await? {
                    info!("Clicked {:?}, waiting in the lobby", JOIN_BUTTON);
                    join_clicked = true;
                }
            }

            tokio::time::sleep(JOIN_POLL).await;
        }
    }

    async fn detect_session_ended(&self, page: Arc<dyn MeetingPage>) -> Result<bool> {
        if page.is_closed() || Self::on_login_page(page.as_ref()).await? {
            return Ok(true);
        }
        if page.has_text(REMOVED_TEXT).await? {
            return Ok(true);
        }
        Ok(!page.has_text("Raise").await?)
    }

    async fn close(&self, page: Arc<dyn MeetingPage>) -> Result<()> {
        if page.is_closed() {
            return Ok(());
        }
        if !page.click_text("Leave").await? {
            warn!("Leave button not found, closing the page directly");
        }
        page.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StubPage;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn provider() -> TeamsProvider {
        TeamsProvider::new("Recorder")
    }

    #[test]
    fn test_parse_live_link_with_password() {
        let reference = provider()
            .parse_reference("https://teams.live.com/meet/9387654?p=AbCd12")
            .unwrap();
        assert_eq!(reference.id, "9387654");
        assert_eq!(reference.password.as_deref(), Some("AbCd12"));
    }

    #[test]
    fn test_parse_meetup_join_keeps_whole_link() {
        let raw = "https://teams.microsoft.com/l/meetup-join/19%3ameeting_x%40thread.v2/0?context=%7b%7d";
        let p = provider();
        let reference = p.parse_reference(raw).unwrap();
        assert_eq!(reference.id, raw);
        assert_eq!(p.build_join_link(&reference, &JoinIdentity::default()), raw);
    }

    #[test]
    fn test_parse_rejects_other_links() {
        let p = provider();
        assert!(p.parse_reference("not a url").is_err());
        assert!(p.parse_reference("https://teams.live.com/v2/").is_err());
    }

    #[test]
    fn test_build_link_from_id() {
        let reference = MeetingReference {
            id: "123".to_string(),
            password: Some("pw".to_string()),
        };
        assert_eq!(
            provider().build_join_link(&reference, &JoinIdentity::default()),
            "https://teams.live.com/meet/123?p=pw"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_redirect_is_reported() {
        let page = Arc::new(StubPage::at("https://login.microsoftonline.com/common"));
        let result = provider().join(page, &|| false, &|| {}).await;
        assert!(matches!(result, Err(ProviderError::LoginRequired)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_is_rejection() {
        let page = Arc::new(StubPage::at("https://teams.live.com/meet/1"));
        page.show_text(DENIED_TEXT);
        let result = provider().join(page, &|| false, &|| {}).await;
        assert!(matches!(result, Err(ProviderError::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_then_admitted() {
        let page = Arc::new(StubPage::at("https://teams.live.com/meet/1"));
        page.show_text(JOIN_BUTTON);
        page.show_text("Raise");
        let admitted = AtomicBool::new(false);
        let on_admitted = || admitted.store(true, Ordering::SeqCst);

        let result = provider().join(page.clone(), &|| false, &on_admitted).await;
        assert!(result.is_ok());
        assert!(admitted.load(Ordering::SeqCst));
        assert!(page.clicked().contains(&JOIN_BUTTON.to_string()));
    }

    #[tokio::test]
    async fn test_removed_when_raise_button_is_gone() {
        let page = Arc::new(StubPage::at("https://teams.live.com/meet/1"));
        page.show_text("Raise");
        let p = provider();
        assert!(!p.detect_session_ended(page.clone()).await.unwrap());

        page.hide_text("Raise");
        assert!(p.detect_session_ended(page).await.unwrap());
    }
}
