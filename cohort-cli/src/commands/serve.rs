//! Serve command for running the cohort HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cohort_server::{CohortServer, ServerConfig};
use tracing::info;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Path to the embedded database (overrides config)
    #[arg(long)]
    pub database: Option<PathBuf>,
}

/// Run the serve command in the foreground.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(database) = args.database {
        config.database = database;
    }

    info!(addr = %config.bind, database = %config.database.display(), "starting cohort server");
    let server = CohortServer::open(config).await?;
    server.serve().await.map_err(Into::into)
}
