use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::StateHandler;
use crate::global::SessionPaths;
use crate::services::BrowserSession;
use crate::session::context::SessionContext;
use crate::session::end_reason::EndReason;
use crate::session::phase::SessionPhase;
use crate::session::within;

pub struct InitializationState;

#[async_trait]
impl StateHandler for InitializationState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        if ctx.config.bot.meeting_url.trim().is_empty() {
            error!("No meeting URL configured");
            ctx.end_reason
                .set_error(EndReason::InvalidMeetingUrl, Some("Meeting URL is required".to_string()));
            return Ok(SessionPhase::Error);
        }

        match setup(ctx).await {
            Ok(()) => Ok(SessionPhase::WaitingRoom),
            Err(e) => {
                error!("Initialization failed: {:#}", e);
                ctx.record_fault(format!("{:#}", e));
                Ok(SessionPhase::Error)
            }
        }
    }
}

async fn setup(ctx: &mut SessionContext) -> Result<()> {
    let data_dir = ctx.config.bot.data_dir.as_deref().map(Path::new);
    let paths = SessionPaths::resolve(data_dir, &ctx.config.bot.bot_id)?;
    tokio::fs::create_dir_all(paths.recordings())
        .await
        .with_context(|| format!("Failed to create session directory {:?}", paths.root))?;
    info!("Session directory: {:?}", paths.root);

    if let Some(source) = ctx.config.bot.custom_branding_path.clone() {
        generate_branding(ctx, &source, &paths).await;
    }
    ctx.paths = Some(paths);

    let browser = launch_browser(ctx).await?;
    ctx.handles.browser = Some(browser);
    Ok(())
}

/// Branding is cosmetic: any failure is logged and the session goes on.
async fn generate_branding(ctx: &mut SessionContext, source: &str, paths: &SessionPaths) {
    let mut process = match ctx.services.start_branding(source, paths.branding()) {
        Ok(process) => process,
        Err(e) => {
            warn!("Branding unavailable, continuing without it: {:#}", e);
            return;
        }
    };

    match within("branding", ctx.config.timeouts.setup(), process.wait()).await {
        Ok(Ok(())) => info!("Custom branding ready"),
        Ok(Err(e)) => warn!("Branding failed, continuing without it: {:#}", e),
        Err(_) => warn!("Branding took too long, continuing without it"),
    }
    ctx.handles.branding = Some(process);
}

async fn launch_browser(ctx: &SessionContext) -> Result<Arc<dyn BrowserSession>> {
    let settings = &ctx.config.browser;
    let attempts = settings.launch_attempts.max(1);
    let launcher = ctx.services.browser_launcher();
    let mut failures = Vec::new();

    for attempt in 1..=attempts {
        info!("Launching browser (attempt {}/{})", attempt, attempts);
        match within("browser launch", settings.launch_timeout(), launcher.launch()).await {
            Ok(Ok(browser)) => {
                info!("Browser ready on attempt {}", attempt);
                return Ok(browser);
            }
            Ok(Err(e)) => {
                warn!("Browser launch attempt {} failed: {:#}", attempt, e);
                failures.push(format!("attempt {}: {:#}", attempt, e));
            }
            Err(timeout) => {
                failures.push(format!("attempt {}: {}", attempt, timeout));
            }
        }

        if attempt < attempts {
            let backoff = settings.backoff_for(attempt);
            info!("Retrying browser launch in {:?}", backoff);
            tokio::time::sleep(backoff).await;
        }
    }

    Err(anyhow!(
        "Browser launch failed after {} attempts: {}",
        attempts,
        failures.join("; ")
    ))
}
