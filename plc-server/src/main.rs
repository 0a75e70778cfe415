mod config;
mod error;
mod importer;
mod routes;
mod server;
mod store;

#[cfg(test)]
mod tests;

use clap::{Parser, Subcommand};
use config::AppConfig;
use config::LogFormat;
use plc_common::DirectoryClient;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plc-server", about = "did:plc directory mirror", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one import pass against the upstream directory and exit
    Sync,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Sync) => {
            if let Err(e) = run_sync(cli.config).await {
                eprintln!("Sync error: {e}");
                std::process::exit(1);
            }
        }
        None => run_server(cli.config).await,
    }
}

async fn run_sync(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    init_tracing(&config);

    let store = store::Store::open(&config.store)?;
    let state = server::AppState::open(config, &store)?;

    let client = DirectoryClient::new(&state.config.upstream.url);
    let imported = importer::import_once(&client, &state).await?;
    let cursor = importer::cursor(&state).await?.unwrap_or_default();

    eprintln!("imported {imported} operations (cursor: {cursor})");
    Ok(())
}

async fn run_server(config_path: Option<PathBuf>) {
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("Create a config.toml or specify one:");
            eprintln!("  plc-server --config <path>");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    let store = store::Store::open(&config.store).expect("failed to open store");

    if let Err(e) = server::run(config, store).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
