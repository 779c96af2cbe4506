use anyhow::Result;
use clap::{Arg, Command};
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use game_scout_rust::api::ApiServer;
use game_scout_rust::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Game Scout API")
        .version("0.1.0")
        .about("HTTP upload endpoint for scouting reports")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("Address to listen on")
                .default_value("0.0.0.0:8000")
                .value_parser(clap::value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)"),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::from_env()
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!(
                    "game_scout_rust={},game_scout_api={},tower_http=info,warn",
                    config.logging.level, config.logging.level
                ))
            }),
        )
        .init();

    info!("{}", config.summary());

    let addr = matches
        .get_one::<SocketAddr>("bind")
        .copied()
        .ok_or_else(|| anyhow::anyhow!("--bind is required"))?;

    ApiServer::from_config(&config, addr).await?.start().await
}
