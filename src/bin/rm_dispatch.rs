use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use rm_bridge::BridgeError;
use rm_bridge::config::Config;
use rm_bridge::dispatcher::{DispatchMode, Dispatcher, HttpTransport};

/// Send test payloads to a local RM, or through a running rm-bridge server.
#[derive(Parser, Debug)]
#[command(name = "rm-dispatch", version, about)]
struct Cli {
    /// Base URL of the rm-bridge server used for the proxy and server paths.
    #[arg(long, default_value = "http://localhost:8000")]
    server: Url,
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe the configured local ports and print the result.
    Detect,

    /// Dispatch one POST payload.
    Send {
        #[arg(long)]
        name: String,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        json: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// server, local or auto
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Ignore any previous detection result.
        #[arg(long, default_value_t = false)]
        redetect: bool,
    },
}

fn read_payload(json: Option<String>, file: Option<PathBuf>) -> Result<Value, BridgeError> {
    let raw = match (json, file) {
        (Some(raw), _) => raw,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(BridgeError::Validation(
                "either --json or --file is required".to_string(),
            ));
        }
    };
    serde_json::from_str(&raw).map_err(|e| BridgeError::invalid_json("payload", &e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = Config::load()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();

    let transport = HttpTransport::new(
        reqwest::Client::new(),
        cli.server.clone(),
        Duration::from_secs(cli.timeout_secs),
    );
    let dispatcher = Dispatcher::new(transport, cfg.detection.clone());

    match cli.command {
        Commands::Detect => {
            let result = dispatcher.detect().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Send {
            name,
            json,
            file,
            mode,
            redetect,
        } => {
            let mode: DispatchMode = mode.parse()?;
            let payload = read_payload(json, file)?;

            if redetect {
                dispatcher.redetect().await;
            } else if mode != DispatchMode::Server {
                dispatcher.detect().await;
            }

            let outcome = dispatcher.dispatch(&name, &payload, mode).await;
            let log = dispatcher.log_entries();
            let report = match &outcome {
                Ok(out) => json!({ "success": true, "outcome": out, "log": log.last() }),
                Err(e) => json!({ "success": false, "error": e.to_string(), "log": log.last() }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            outcome?;
        }
    }
    Ok(())
}
