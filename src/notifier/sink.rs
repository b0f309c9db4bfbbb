//! Where lifecycle events end up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::BotEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &BotEvent) -> Result<()>;
}

/// POSTs each event to the configured webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    bot_id: String,
}

impl WebhookSink {
    pub fn new(url: &str, api_key: Option<String>, bot_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key,
            bot_id,
        }
    }

    pub fn payload(&self, event: &BotEvent) -> Value {
        let mut data = Map::new();
        data.insert("bot_id".to_string(), json!(self.bot_id));
        data.insert(
            "status".to_string(),
            json!({
                "code": event.code.as_str(),
                "created_at": event.created_at.to_rfc3339(),
            }),
        );
        if let Value::Object(extra) = &event.extra {
            for (key, value) in extra {
                data.insert(key.clone(), value.clone());
            }
        }

        json!({
            "event": event.event_type,
            "data": Value::Object(data),
        })
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn deliver(&self, event: &BotEvent) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("User-Agent", concat!("meetbot/", env!("CARGO_PKG_VERSION")))
            .json(&self.payload(event));

        if let Some(key) = &self.api_key {
            request = request.header("x-bot-api-key", key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Webhook rejected ({}): {}", status, body));
        }

        info!(
            "Event {} delivered to {} ({})",
            event.code.as_str(),
            self.url,
            event.event_type
        );
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: &BotEvent) -> Result<()> {
        info!(
            code = event.code.as_str(),
            event_type = %event.event_type,
            extra = %event.extra,
            "Lifecycle event"
        );
        Ok(())
    }
}

/// Keeps every delivered event in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<BotEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BotEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.code.as_str()).collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn deliver(&self, event: &BotEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
