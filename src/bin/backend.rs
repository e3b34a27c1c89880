//! Secure HTTP Proxy Backend
//!
//! Runs next to the origin server:
//! - Answers exactly one Diffie-Hellman handshake, then closes that port
//! - Accepts tunnel connections, decrypts each request and forwards it to
//!   the origin, and returns the encrypted response

use anyhow::{Context, Result};
use clap::Parser;
use secure_http_proxy::{
    config::{generate_example_config, Config},
    crypto::{DhParams, HandshakeRole, TunnelCipher},
    proxy::{BackendHandler, ProxyListener},
    transport::KeyExchange,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Secure HTTP Proxy Backend - origin-side half of the proxy pair
#[derive(Parser, Debug)]
#[command(name = "proxy-backend")]
#[command(about = "Origin-side proxy that unwraps tunneled requests")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults apply if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Tunnel listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Handshake listen address (overrides config)
    #[arg(long)]
    handshake_listen: Option<String>,

    /// Origin server address (overrides config)
    #[arg(long)]
    origin: Option<String>,

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

    let mut backend = config.backend.clone().unwrap_or_default();
    if let Some(listen) = args.listen {
        backend.listen = listen;
    }
    if let Some(listen) = args.handshake_listen {
        backend.handshake_listen = listen;
    }
    if let Some(origin) = args.origin {
        backend.origin = origin;
    }

    let engine = backend
        .cipher_engine()
        .context("Invalid cipher configuration")?;

    info!("Secure HTTP Proxy backend v{}", secure_http_proxy::VERSION);
    info!("Origin server: {}", backend.origin);
    info!("Cipher: {}", engine.config());

    let shutdown = CancellationToken::new();
    spawn_shutdown_signal(shutdown.clone());

    // The group comes from the initiator's key; the params here only matter when initiating
    let secret = KeyExchange::new(DhParams::default())
        .with_timeout(config.timeouts.handshake())
        .with_cancellation(shutdown.clone())
        .perform(HandshakeRole::Responder, &backend.handshake_listen)
        .await
        .context("Handshake with frontend failed")?;

    let cipher = Arc::new(TunnelCipher::new(engine, secret));
    let handler = Arc::new(BackendHandler::new(
        backend.settings(config.timeouts.transport()),
        cipher,
    ));

    let listener = ProxyListener::bind(&backend.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", backend.listen))?;
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
