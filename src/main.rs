//! CLI for the PubSub emulator
//!
//! Loads configuration (file, environment, `.env`), applies command-line
//! overrides and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use pubsub_emulator::broker::Broker;
use pubsub_emulator::config::{Settings, load_config};
use pubsub_emulator::transport::start_http_server;
use pubsub_emulator::utils::logging;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pubsub-emulator", about = "In-memory Pub/Sub emulator")]
struct Cli {
    /// Host to listen on (default: all interfaces)
    #[arg(short = 'H', long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        settings
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run_server(cli).await {
        // logging may not be initialized yet if config loading failed
        logging::init("info");
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = cli.apply(load_config()?);
    logging::init(&settings.logging.level);

    let broker = Arc::new(Broker::from_settings(&settings.broker));
    info!(
        ack_deadline_secs = settings.broker.ack_deadline_secs,
        strict_acknowledge = settings.broker.strict_acknowledge,
        "starting server"
    );

    start_http_server(&settings.bind_addr(), broker, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    })
    .await?;

    Ok(())
}
