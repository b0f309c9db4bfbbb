use anyhow::Result;
use clap::Parser;
use meetbot::{
    app,
    cli::{handle_init_config, Cli, CliCommand},
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetbot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::InitConfig { force }) => {
            handle_init_config(cli.config.as_deref(), force)?;
            return Ok(());
        }
        Some(CliCommand::Run) | None => {}
    }

    let config = Config::load(cli.config.as_deref())?;
    let successful = app::run_bot(config).await?;
    std::process::exit(if successful { 0 } else { 1 });
}
