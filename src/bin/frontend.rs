//! Secure HTTP Proxy Frontend
//!
//! Runs next to the browser:
//! - Performs the one-time Diffie-Hellman handshake with the backend
//! - Tunnels requests for the paired backend host, encrypted
//! - Forwards requests for any other host as plain HTTP

use anyhow::{Context, Result};
use clap::Parser;
use secure_http_proxy::{
    config::{generate_example_config, Config},
    crypto::TunnelCipher,
    proxy::{FrontendHandler, ProxyListener},
    transport::KeyExchange,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Secure HTTP Proxy Frontend - browser-side half of the proxy pair
#[derive(Parser, Debug)]
#[command(name = "proxy-frontend")]
#[command(about = "Browser-side proxy that tunnels requests for its paired backend")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults apply if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Paired backend host (overrides config)
    #[arg(long)]
    backend_host: Option<String>,

    /// Backend proxy port (overrides config)
    #[arg(long)]
    backend_port: Option<u16>,

    /// Backend handshake port (overrides config)
    #[arg(long)]
    handshake_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", toml::to_string_pretty(&generate_example_config())?);
        return Ok(());
    }

    let config = Config::load_or_default(&args.config).context("Failed to load configuration")?;
    config
        .logging
        .init(args.log_level.as_deref())
        .context("Failed to initialise logging")?;

    let mut frontend = config.frontend.clone().unwrap_or_default();
    if let Some(listen) = args.listen {
        frontend.listen = listen;
    }
    if let Some(host) = args.backend_host {
        frontend.backend_host = host;
    }
    if let Some(port) = args.backend_port {
        frontend.backend_port = port;
    }
    if let Some(port) = args.handshake_port {
        frontend.handshake_port = port;
    }

    let engine = frontend
        .cipher_engine()
        .context("Invalid cipher configuration")?;
    let params = frontend.dh_params().context("Invalid DH parameters")?;

    info!("Secure HTTP Proxy frontend v{}", secure_http_proxy::VERSION);
    info!("Paired backend: {} (tunnel {})", frontend.backend_host, frontend.tunnel_endpoint());
    info!("Cipher: {}", engine.config());

    let shutdown = CancellationToken::new();
    spawn_shutdown_signal(shutdown.clone());

    // No proxying without a secret
    let secret = KeyExchange::new(params)
        .with_timeout(config.timeouts.handshake())
        .with_cancellation(shutdown.clone())
        .initiate(&frontend.handshake_endpoint())
        .await
        .context("Handshake with backend failed")?;

    let cipher = Arc::new(TunnelCipher::new(engine, secret));
    let handler = Arc::new(FrontendHandler::new(
        frontend.settings(config.timeouts.transport()),
        cipher,
    ));

    let listener = ProxyListener::bind(&frontend.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", frontend.listen))?;
    listener.run(handler, shutdown).await?;

    Ok(())
}

fn spawn_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                token.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
