use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use sshtun::config::{AppConfig, paths};
use sshtun::forward::LocalForward;
use sshtun::{Outbound, logging};

#[derive(Parser, Debug)]
#[command(name = "sshtun", version, about = "Tunnel local TCP ports through an SSH gateway")]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the rotating log file; overrides SSHTUN_LOG_DIR
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = match args.log_dir {
        Some(dir) => {
            paths::ensure_private_dir(&dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            Some(dir)
        }
        None => paths::ensure_log_dir().ok(),
    };
    let _guard = logging::init_logging(log_dir.clone());

    tracing::info!("Starting sshtun {}", env!("CARGO_PKG_VERSION"));
    if let Some(dir) = &log_dir {
        tracing::info!("Logging to {}", dir.display());
    }

    let config_path = match args.config {
        Some(path) => path,
        None => paths::default_config_file().context("could not determine config directory")?,
    };
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if config.forwards.is_empty() {
        anyhow::bail!("{} defines no [[forward]] entries", config_path.display());
    }

    let outbound = Arc::new(Outbound::from_app_config(&config).context("configuring outbound")?);
    let cancel = CancellationToken::new();

    let mut forwards = JoinSet::new();
    for forward in &config.forwards {
        let local = LocalForward::bind(forward)
            .await
            .with_context(|| format!("binding {}", forward.listen))?;
        forwards.spawn(local.run(outbound.clone(), cancel.clone()));
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");
    cancel.cancel();
    while forwards.join_next().await.is_some() {}

    outbound.close().await.context("closing gateway transport")?;
    Ok(())
}
