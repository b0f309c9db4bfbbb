use crate::config::Config;
use anyhow::{anyhow, Result};
use std::path::Path;

mod args;

pub use args::{Cli, CliCommand};

pub fn handle_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };

    if target.exists() && !force {
        return Err(anyhow!(
            "Config file {:?} already exists (use --force to overwrite)",
            target
        ));
    }

    let written = Config::default().save(Some(&target))?;
    println!("Wrote default configuration to {}", written.display());
    Ok(())
}
