mod config;
mod routes;
mod seed;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::seed::SeedData;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "calsync-server")]
#[command(about = "Sync external calendar feeds into appointments on request")]
struct Cli {
    /// Config file (defaults to ~/.config/calsync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:4096
    #[arg(short, long)]
    bind: Option<String>,

    /// TOML file with connections and customers
    #[arg(short, long)]
    data: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calsync_server=info,calsync_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(data) = cli.data {
        config.data_file = Some(data);
    }

    let seed = match config.data_path() {
        Some(path) => {
            let seed = SeedData::load(&path)?;
            tracing::info!(
                path = %path.display(),
                connections = seed.connections.len(),
                customers = seed.customers.len(),
                "loaded data file"
            );
            seed
        }
        None => {
            tracing::warn!("no data file configured, starting without connections");
            SeedData::default()
        }
    };

    let state = AppState::in_memory(seed, &config.sync)?;
    let app = routes::app(state);

    let addr = config.bind_addr()?;
    tracing::info!("calsync-server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
