//! Custom branding generation (bot avatar/video) as a subprocess.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

pub const BRANDING_SCRIPT: &str = "generate_custom_branding.sh";

#[async_trait]
pub trait BrandingProcess: Send + Sync {
    /// Waits for the generator to finish. Errors on a non-zero exit.
    async fn wait(&mut self) -> Result<()>;
    async fn kill(&mut self) -> Result<()>;
}

pub struct ScriptBranding {
    child: Option<Child>,
}

impl ScriptBranding {
    pub fn spawn(source: &str, output_dir: PathBuf) -> Result<Self> {
        let script = which::which(BRANDING_SCRIPT)
            .with_context(|| format!("{} not found on PATH", BRANDING_SCRIPT))?;

        std::fs::create_dir_all(&output_dir).context("Failed to create branding directory")?;

        info!("Generating branding from {}", source);
        let child = Command::new(script)
            .arg(source)
            .arg(&output_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start branding generator")?;

        Ok(Self { child: Some(child) })
    }
}

#[async_trait]
impl BrandingProcess for ScriptBranding {
    async fn wait(&mut self) -> Result<()> {
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for branding generator")?;

        if output.status.success() {
            info!("Branding generated");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(anyhow!(
                "Branding generator exited with status {}: {}",
                output.status,
                stderr.trim()
            ))
        }
    }

    async fn kill(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill branding generator: {}", e);
            }
        }
        Ok(())
    }
}
