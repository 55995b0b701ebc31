use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use multilab::{
    config::{DEFAULT_PORT, ProxyConfig},
    llm::{OPENROUTER_URL, OpenRouterClient},
    proxy::{self, ChatProxy},
    server::Server,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "multilab-server",
    about = "Chat-completion proxy in front of OpenRouter"
)]
struct Cli {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// OpenRouter credential; surrounding quotes and whitespace are ignored.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_URL", default_value = OPENROUTER_URL)]
    upstream_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = ProxyConfig::new(cli.api_key.as_deref());
    match config.api_key() {
        Some(key) => info!(key_len = key.len(), "OpenRouter API key loaded"),
        None => warn!("OPENROUTER_API_KEY is not set; /api/chat will answer 500"),
    }

    let upstream = Arc::new(OpenRouterClient::with_endpoint(cli.upstream_url));
    let chat = Arc::new(ChatProxy::new(config, upstream));

    let addr = format!("{}:{}", cli.host, cli.port);
    let server = Server::bind(&addr)
        .await
        .with_context(|| format!("starting proxy on {addr}"))?;
    info!(address = %server.local_addr(), "Multi-AI Lab proxy ready");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    server
        .run_until(proxy::app(chat).into_handler(), shutdown)
        .await
        .context("proxy server failed")
}
