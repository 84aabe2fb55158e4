use anyhow::Result;
use clap::Parser;
use integrity_service::config::{normalize_legacy_args, Cli, DaemonConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_legacy_args(std::env::args_os()));
    let config = DaemonConfig::try_from(cli)?;
    let summary = integrity_service::daemon::run(config).await?;
    info!(cycles = summary.cycles, failed = summary.failed_cycles, "exiting");
    Ok(())
}
