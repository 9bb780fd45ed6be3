use clap::Parser;
use log::{error, info};
use server::catalog::Catalog;
use server::config::Config;
use server::network::{Server, ServerMessage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "7777")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "16")]
    max_clients: usize,
    /// Override catalog (JSON)
    #[clap(short, long)]
    catalog: Option<PathBuf>,
    /// Runtime configuration (JSON)
    #[clap(long)]
    config: Option<PathBuf>,
    /// Pass every projectile spawn through untouched
    #[clap(long)]
    disable_plugin: bool,
    #[clap(long)]
    disable_homing: bool,
}

/// Parses command-line arguments, loads the catalog and runs the server until
/// Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.disable_plugin {
        config.enable_plugin = false;
    }
    if args.disable_homing {
        config.enable_homing = false;
    }

    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path)?,
        None => {
            info!("No catalog given, every type passes through unmodified");
            Catalog::new()
        }
    };

    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        Arc::new(catalog),
        config,
    )
    .await?;

    let control = server.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if control.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    });

    server.run().await
}
