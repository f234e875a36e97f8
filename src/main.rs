//! CLI for ssehub
//!
//! Starts the broker and serves it over HTTP until Ctrl-C.

use clap::Parser;
use ssehub::broker::Broker;
use ssehub::config::{Settings, load_config_from};
use ssehub::transport::{AppState, serve};
use ssehub::utils::logging;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ssehub", about = "Publish/subscribe hub over HTTP event streams")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/default")]
    config: String,
    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    if let Err(e) = run_server(config).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (broker, broker_task) = Broker::start(config.broker.clone());
    let listener = TcpListener::bind(config.bind_addr()).await?;

    serve(listener, AppState::new(broker), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    broker_task.await?;
    info!("Exiting gracefully.");
    Ok(())
}
