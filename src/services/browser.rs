//! Remote browser control.
//!
//! The bot drives a browser that lives in a separate service (it owns the
//! display, the fake media devices and the page automation). This module is
//! the HTTP client for it plus the traits the rest of the crate codes against.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::speakers::SpeakerData;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn id(&self) -> &str;
    async fn new_page(&self, url: &str, media_input: Option<&str>) -> Result<Arc<dyn MeetingPage>>;
    /// Ids of native dialogs currently blocking the browser.
    async fn pending_dialogs(&self) -> Result<Vec<String>>;
    async fn dismiss_dialog(&self, dialog_id: &str) -> Result<()>;
    /// Stops the fake camera/microphone feeds.
    async fn stop_media(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MeetingPage: Send + Sync {
    async fn url(&self) -> Result<String>;
    fn is_closed(&self) -> bool;
    async fn content(&self) -> Result<String>;
    async fn has_text(&self, text: &str) -> Result<bool>;
    /// Clicks the first element showing `text`. Returns false when none is found.
    async fn click_text(&self, text: &str) -> Result<bool>;
    async fn fill(&self, label: &str, value: &str) -> Result<()>;
    async fn speakers(&self) -> Result<Vec<SpeakerData>>;
    /// Current output level of the meeting audio, 0-100.
    async fn audio_level(&self) -> Result<f32>;
    async fn install_script(&self, name: &str) -> Result<()>;
    async fn remove_script(&self, name: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DialogsResponse {
    dialogs: Vec<DialogEntry>,
}

#[derive(Debug, Deserialize)]
struct DialogEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    html: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct FoundResponse {
    found: bool,
}

#[derive(Debug, Deserialize)]
struct AudioLevelResponse {
    level: f32,
}

#[derive(Debug, Serialize)]
struct NewSessionRequest<'a> {
    headless: bool,
    user_agent: &'a str,
}

/// Shared plumbing for the three resource kinds.
#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed ({}): {}", what, status, body));
        }
        Ok(response)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach browser service for {}", what))?;
        Self::check(response, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
        what: &str,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach browser service for {}", what))?;
        Self::check(response, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    async fn post(&self, path: &str, body: serde_json::Value, what: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach browser service for {}", what))?;
        Self::check(response, what).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, what: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach browser service for {}", what))?;
        Self::check(response, what).await?;
        Ok(())
    }
}

/// Launches sessions on the remote browser service.
pub struct RemoteBrowser {
    endpoint: Endpoint,
    headless: bool,
}

impl RemoteBrowser {
    pub fn new(base_url: &str, headless: bool) -> Self {
        Self {
            endpoint: Endpoint {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            headless,
        }
    }
}

#[async_trait]
impl BrowserLauncher for RemoteBrowser {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        let body = serde_json::to_value(NewSessionRequest {
            headless: self.headless,
            user_agent: concat!("meetbot/", env!("CARGO_PKG_VERSION")),
        })?;
        let session: SessionResponse = self
            .endpoint
            .post_json("/sessions", body, "launch browser")
            .await?;

        info!("Browser session {} launched", session.id);
        Ok(Arc::new(RemoteSession {
            endpoint: self.endpoint.clone(),
            id: session.id,
        }))
    }
}

pub struct RemoteSession {
    endpoint: Endpoint,
    id: String,
}

#[async_trait]
impl BrowserSession for RemoteSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self, url: &str, media_input: Option<&str>) -> Result<Arc<dyn MeetingPage>> {
        let page: PageResponse = self
            .endpoint
            .post_json(
                &format!("/sessions/{}/pages", self.id),
                json!({ "url": url, "media_input": media_input }),
                "open page",
            )
            .await?;

        debug!("Page {} opened on {}", page.id, url);
        Ok(Arc::new(RemotePage {
            endpoint: self.endpoint.clone(),
            id: page.id,
            closed: AtomicBool::new(false),
        }))
    }

    async fn pending_dialogs(&self) -> Result<Vec<String>> {
        let response: DialogsResponse = self
            .endpoint
            .get_json(&format!("/sessions/{}/dialogs", self.id), "list dialogs")
            .await?;
        Ok(response.dialogs.into_iter().map(|d| d.id).collect())
    }

    async fn dismiss_dialog(&self, dialog_id: &str) -> Result<()> {
        self.endpoint
            .post(
                &format!("/sessions/{}/dialogs/{}/dismiss", self.id, dialog_id),
                json!({}),
                "dismiss dialog",
            )
            .await
    }

    async fn stop_media(&self) -> Result<()> {
        self.endpoint
            .delete(&format!("/sessions/{}/media", self.id), "stop media")
            .await
    }

    async fn close(&self) -> Result<()> {
        self.endpoint
            .delete(&format!("/sessions/{}", self.id), "close browser")
            .await
    }
}

pub struct RemotePage {
    endpoint: Endpoint,
    id: String,
    closed: AtomicBool,
}

impl RemotePage {
    fn path(&self, suffix: &str) -> String {
        format!("/pages/{}{}", self.id, suffix)
    }
}

#[async_trait]
impl MeetingPage for RemotePage {
    async fn url(&self) -> Result<String> {
        let content: ContentResponse = self
            .endpoint
            .get_json(&self.path("/content"), "page url")
            .await?;
        Ok(content.url)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn content(&self) -> Result<String> {
        let content: ContentResponse = self
            .endpoint
            .get_json(&self.path("/content"), "page content")
            .await?;
        Ok(content.html)
    }

    async fn has_text(&self, text: &str) -> Result<bool> {
        let found: FoundResponse = self
            .endpoint
            .post_json(&self.path("/find"), json!({ "text": text }), "find text")
            .await?;
        Ok(found.found)
    }

    async fn click_text(&self, text: &str) -> Result<bool> {
        let found: FoundResponse = self
            .endpoint
            .post_json(&self.path("/click"), json!({ "text": text }), "click")
            .await?;
        Ok(found.found)
    }

    async fn fill(&self, label: &str, value: &str) -> Result<()> {
        self.endpoint
            .post(
                &self.path("/type"),
                json!({ "label": label, "value": value }),
                "type text",
            )
            .await
    }

    async fn speakers(&self) -> Result<Vec<SpeakerData>> {
        self.endpoint
            .get_json(&self.path("/speakers"), "list speakers")
            .await
    }

    async fn audio_level(&self) -> Result<f32> {
        let level: AudioLevelResponse = self
            .endpoint
            .get_json(&self.path("/audio-level"), "audio level")
            .await?;
        Ok(level.level)
    }

    async fn install_script(&self, name: &str) -> Result<()> {
        self.endpoint
            .post(&self.path(&format!("/scripts/{}", name)), json!({}), "install script")
            .await
    }

    async fn remove_script(&self, name: &str) -> Result<()> {
        self.endpoint
            .delete(&self.path(&format!("/scripts/{}", name)), "remove script")
            .await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.endpoint.delete(&self.path(""), "close page").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let browser = RemoteBrowser::new("http://127.0.0.1:9515/", false);
        assert_eq!(
            browser.endpoint.url("/sessions"),
            "http://127.0.0.1:9515/sessions"
        );
    }

    #[test]
    fn test_page_paths() {
        let page = RemotePage {
            endpoint: Endpoint {
                client: reqwest::Client::new(),
                base_url: "http://browser".to_string(),
            },
            id: "p1".to_string(),
            closed: AtomicBool::new(false),
        };
        assert_eq!(page.path("/speakers"), "/pages/p1/speakers");
        assert_eq!(page.path(""), "/pages/p1");
        assert!(!page.is_closed());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let browser = RemoteBrowser::new("http://127.0.0.1:1", true);
        let err = browser.launch().await.err().unwrap();
        assert!(err.to_string().contains("launch browser"));
    }
}
