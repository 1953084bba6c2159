//! Pilot bridge: drives the provider relay and RPC network detection from the command line

use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{eyre, WrapErr};
use serde_json::{json, Value};

use pilot_bridge_adapters::{
    Background, BridgeConfig, ChainProbe, HttpWalletProvider, MemoryWalletProvider,
    TracingErrorTracker,
};
use pilot_bridge_core::{RequestBody, RpcRequest, TabId, WalletProvider};

const CLI_ORIGIN: &str = "https://pilot.local";

#[derive(Parser)]
#[command(name = "pilot-bridge")]
#[command(about = "Wallet provider bridge and RPC network detection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the chain behind JSON-RPC endpoints
    Probe {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Run active network detection for endpoints used by a tab
    Detect {
        /// Tab the endpoints were seen in
        #[arg(long, default_value_t = 1)]
        tab: u32,

        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Run passive network detection on an intercepted request body
    Sniff {
        #[arg(long)]
        url: String,

        /// Raw JSON request body
        #[arg(long)]
        body: String,

        #[arg(long, default_value_t = 1)]
        tab: u32,
    },

    /// Send an EIP-1193 request from a page through the bridge to the wallet
    Request {
        /// JSON-RPC wallet endpoint, overrides PILOT_WALLET_RPC_URL
        #[arg(long)]
        wallet_rpc: Option<String>,

        /// Origin of the requesting page
        #[arg(long, default_value = CLI_ORIGIN)]
        origin: String,

        method: String,

        /// JSON params, e.g. '["0xabc", "latest"]'
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::from_env();

    match cli.command {
        Commands::Probe { urls } => {
            let probe = ChainProbe::new(Arc::new(TracingErrorTracker));
            for url in urls {
                let chain_id = probe.probe(&url).await;
                print_json(&json!({ "url": url, "chainId": chain_id }))?;
            }
        }

        Commands::Detect { tab, urls } => {
            let background = background(&config, None)?;
            let tab_id = TabId(tab);
            background.open_tab(tab_id, CLI_ORIGIN)?;
            let detector = background.detector();
            for url in urls {
                let result = detector.detect_network_of_rpc_url(&url, tab_id).await;
                print_json(&json!({
                    "url": url,
                    "newEndpoint": result.new_endpoint,
                    "chainId": detector.chain_id_of(&url),
                }))?;
            }
        }

        Commands::Sniff { url, body, tab } => {
            let background = background(&config, None)?;
            let detector = background.detector();
            let result = detector.parse_network_from_request_body(
                &RequestBody::from_json_text(&body),
                &url,
                TabId(tab),
            );
            print_json(&json!({
                "url": url,
                "newEndpoint": result.new_endpoint,
                "chainId": detector.chain_id_of(&url),
            }))?;
        }

        Commands::Request {
            wallet_rpc,
            origin,
            method,
            params,
        } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).wrap_err("params are not valid JSON")?,
                None => json!([]),
            };
            let background = background(&config, wallet_rpc)?;
            let tab_id = TabId(1);
            let tab = background.open_tab(tab_id, &origin)?;
            background.activate_tab(tab_id);

            tracing::info!(%method, origin = %origin, "sending provider request");
            match tab.provider.request(RpcRequest::new(method, params)).await {
                Ok(result) => print_json(&result)?,
                Err(e) => return Err(eyre!("wallet rejected the request: {e}")),
            }
        }
    }

    Ok(())
}

fn background(config: &BridgeConfig, wallet_rpc: Option<String>) -> eyre::Result<Background> {
    let mut config = config.clone();
    if wallet_rpc.is_some() {
        config.wallet_rpc_url = wallet_rpc;
    }
    let provider: Arc<dyn WalletProvider> = match HttpWalletProvider::from_config(&config)
        .wrap_err("failed to build wallet rpc client")?
    {
        Some(http) => {
            tracing::info!(url = http.url(), "using json-rpc wallet");
            Arc::new(http)
        }
        None => {
            tracing::info!("no wallet rpc configured, using in-memory wallet");
            Arc::new(MemoryWalletProvider::new())
        }
    };
    Background::new(config, provider, Arc::new(TracingErrorTracker))
        .wrap_err("failed to start the background context")
}

fn print_json(value: &Value) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
